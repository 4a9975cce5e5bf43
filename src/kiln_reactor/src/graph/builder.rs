use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};
use thiserror::Error;

use kiln_model::bootstrap::{BuiltinSuperProvider, SuperDescriptorProvider};
use kiln_model::profiles::{self, ActivationContext};
use kiln_model::reader::DescriptorParser;
use kiln_model::{
    Coordinate, Dependency, Descriptor, Outcome, Problem, Severity, ValidationLevel,
    XmlDescriptorReader, inherit, interpolate, management, validate,
};

use crate::policy::BehaviorPolicy;
use crate::resolve::{ExternalResolver, ModelCache};
use crate::session::ReactorSession;

use super::{ProjectGraph, ProjectNode, Variant};

static BUILTIN_SUPER: BuiltinSuperProvider = BuiltinSuperProvider;

/// Conditions that terminate the whole traversal, as opposed to data errors
/// which accumulate in outcomes. They surface as a single fatal diagnostic.
#[derive(Debug, Error)]
pub enum BuildAbort {
    #[error("Project dependency cycle detected [{}]", format_cycle(.0))]
    Cycle(Vec<Coordinate>),
    #[error("internal reactor error: {0}")]
    Internal(String),
}

fn format_cycle(cycle: &[Coordinate]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Memoized build status of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Built {
    Ok(Variant),
    Failed,
}

/// Optional hook run during enablement, before dependency management is
/// injected. Absent by default, in which case the step is skipped.
pub trait LifecycleBindingsInjector {
    fn inject(&self, descriptor: &mut Descriptor);
}

/// The only mutable state of an invocation: completion memo (insertion
/// ordered, which is what makes the output topological) and the recursion
/// stack.
struct BuildState {
    completed: Vec<(Coordinate, Outcome<ProjectNode>)>,
    completed_idx: HashMap<Coordinate, usize>,
    building: Vec<Coordinate>,
}

impl BuildState {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            completed_idx: HashMap::new(),
            building: Vec::new(),
        }
    }
}

/// Drives the recursive per-coordinate pipeline and assembles the output
/// graph. One builder per invocation; it owns all mutable state.
pub struct GraphBuilder<'a> {
    session: &'a ReactorSession,
    policy: &'a BehaviorPolicy,
    resolver: &'a dyn ExternalResolver,
    super_provider: &'a dyn SuperDescriptorProvider,
    lifecycle: Option<&'a dyn LifecycleBindingsInjector>,
    state: BuildState,
    cache: ModelCache,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        session: &'a ReactorSession,
        policy: &'a BehaviorPolicy,
        resolver: &'a dyn ExternalResolver,
    ) -> Self {
        Self {
            session,
            policy,
            resolver,
            super_provider: &BUILTIN_SUPER,
            lifecycle: None,
            state: BuildState::new(),
            cache: ModelCache::new(),
        }
    }

    pub fn with_super_provider(mut self, provider: &'a dyn SuperDescriptorProvider) -> Self {
        self.super_provider = provider;
        self
    }

    pub fn with_lifecycle_injector(mut self, injector: &'a dyn LifecycleBindingsInjector) -> Self {
        self.lifecycle = Some(injector);
        self
    }

    /// Build every seed, then flatten the completion memo into the final
    /// graph. Any error yields the aggregated diagnostics and no graph.
    pub fn run(mut self) -> Outcome<ProjectGraph> {
        let seeds = self.policy.seed_coordinates();
        debug!("assembling reactor graph from {} seed(s)", seeds.len());
        for seed in &seeds {
            if let Err(abort) = self.build_by_coord(seed) {
                let mut problems: Vec<Problem> = self
                    .state
                    .completed
                    .drain(..)
                    .flat_map(|(_, outcome)| outcome.into_parts().1)
                    .collect();
                problems.push(Problem::fatal(abort.to_string()));
                return Outcome::failure(problems);
            }
        }
        let outcomes: Vec<Outcome<ProjectNode>> = self
            .state
            .completed
            .drain(..)
            .map(|(_, outcome)| outcome)
            .collect();
        let collected = Outcome::collect(outcomes);
        let failed = collected.is_error();
        let (nodes, problems) = collected.into_parts();
        if failed {
            Outcome::failure(problems)
        } else {
            Outcome::success_with(ProjectGraph::from_nodes(nodes.unwrap_or_default()), problems)
        }
    }

    /// Memoized recursive entry point. Re-entering a coordinate that is still
    /// on the recursion stack closes a cycle and aborts the build.
    pub(crate) fn build_by_coord(&mut self, coord: &Coordinate) -> Result<Built, BuildAbort> {
        if let Some(&i) = self.state.completed_idx.get(coord) {
            return Ok(status_of(&self.state.completed[i].1));
        }
        if self.state.building.contains(coord) {
            return Err(BuildAbort::Cycle(self.state.building.clone()));
        }
        self.state.building.push(coord.clone());
        let policy = self.policy;
        let result = policy.build(coord, self);
        self.state.building.pop();
        let outcome = result?;
        let built = status_of(&outcome);
        self.state
            .completed_idx
            .insert(coord.clone(), self.state.completed.len());
        self.state.completed.push((coord.clone(), outcome));
        Ok(built)
    }

    /// The six-step per-descriptor pipeline. Recursive coordinate
    /// resolutions all route back through `build_by_coord`, so memoization
    /// and cycle detection apply uniformly.
    pub(crate) fn build_by_variant(
        &mut self,
        is_source: bool,
        raw: Descriptor,
    ) -> Result<Outcome<ProjectNode>, BuildAbort> {
        let coord = raw.coordinate().ok_or_else(|| {
            BuildAbort::Internal(format!("descriptor {} has no identifier", raw.source_hint()))
        })?;
        let variant = if is_source {
            Variant::Source
        } else {
            Variant::Binary
        };
        trace!("building {} as {:?}", coord, variant);
        let hint = raw.source_hint();
        let mut problems: Vec<Problem> = Vec::new();

        // 1. Parent resolution: workspace parents become graph edges,
        // external parents are left to the inheritance stage.
        let mut parent_node = None;
        if let Some(parent) = &raw.parent {
            let parent_coord = parent.coordinate();
            if self.policy.is_project(&parent_coord) {
                match self.build_by_coord(&parent_coord)? {
                    Built::Ok(_) => parent_node = Some(parent_coord),
                    Built::Failed => {
                        problems.push(
                            Problem::fatal(format!(
                                "Parent project {} of {} could not be built",
                                parent_coord, coord
                            ))
                            .with_source(hint),
                        );
                        return Ok(Outcome::failure(problems));
                    }
                }
            }
        }

        // 2. Activation, in the context of this project's own base directory.
        let session = self.session;
        let base_dir = raw
            .base_dir()
            .unwrap_or_else(|| session.base_directory.as_path());
        let ctx = ActivationContext::new(
            &session.active_profile_ids,
            &session.inactive_profile_ids,
            &session.system_properties,
            &session.user_properties,
            Some(base_dir),
        );
        let mut activated = raw.clone();
        let pom_active = profiles::select_active(&raw.profiles, &ctx);
        profiles::inject(&mut activated, &pom_active);
        let external_active = profiles::select_active(&session.profiles, &ctx);
        profiles::inject(&mut activated, &external_active);

        // 3. Lineage traversal, inheritance assembly and interpolation.
        let Some(mut effective) = self.assemble_lineage(activated, &ctx, &mut problems) else {
            return Ok(Outcome::failure(problems));
        };
        problems.extend(interpolate::interpolate(
            &mut effective,
            &session.system_properties,
            &session.user_properties,
        ));

        // 4. Import resolution: every managed `pom`/`import` entry
        // contributes its dependency management, merged in source order.
        let imports: Vec<Dependency> = effective
            .dependency_management
            .iter()
            .filter(|d| d.is_import())
            .cloned()
            .collect();
        effective.dependency_management.retain(|d| !d.is_import());
        let mut import_refs: Vec<Coordinate> = Vec::new();
        for import in imports {
            let import_coord = import.coordinate();
            if self.policy.is_project(&import_coord) {
                if self.state.building.contains(&import_coord) {
                    problems.push(
                        Problem::error(format!(
                            "Dependency-management import cycle detected: {} is already being built while importing it into {}",
                            import_coord, coord
                        ))
                        .with_source(effective.source_hint()),
                    );
                    continue;
                }
                match self.build_by_coord(&import_coord)? {
                    Built::Ok(_) => {
                        let managed = self
                            .completed_node(&import_coord)?
                            .descriptor
                            .dependency_management
                            .clone();
                        management::merge_imported_management(&mut effective, &managed);
                        import_refs.push(import_coord);
                    }
                    Built::Failed => problems.push(
                        Problem::error(format!(
                            "Failure building dependency-management import {} of {}",
                            import_coord, coord
                        ))
                        .with_source(effective.source_hint()),
                    ),
                }
            } else {
                let mut stack = Vec::new();
                if let Some(managed) =
                    self.resolve_external_import(&import, &mut stack, &mut problems)
                {
                    management::merge_imported_management(&mut effective, &managed);
                }
            }
        }

        // 5. Enablement.
        if let Some(injector) = self.lifecycle {
            injector.inject(&mut effective);
        }
        management::inject_management(&mut effective);
        management::inject_defaults(&mut effective);
        management::expand_plugin_configuration(&mut effective);
        problems.extend(validate::validate_effective(
            &effective,
            session.validation_level,
        ));
        if problems.iter().any(|p| p.severity == Severity::Fatal) {
            return Ok(Outcome::failure_with(
                ProjectNode {
                    coordinate: coord,
                    descriptor: effective,
                    variant,
                    parent: parent_node,
                    imports: import_refs,
                    plugins: Vec::new(),
                    dependencies: Vec::new(),
                },
                problems,
            ));
        }

        // 6. Reference resolution over the effective descriptor.
        let mut dependency_refs: Vec<Coordinate> = Vec::new();
        for dep in effective.dependencies.clone() {
            let dep_coord = dep.coordinate();
            if !self.policy.is_project(&dep_coord) {
                continue;
            }
            match self.build_by_coord(&dep_coord)? {
                Built::Ok(_) => dependency_refs.push(dep_coord),
                Built::Failed => problems.push(
                    Problem::error(format!(
                        "Failure building dependency {} of {}",
                        dep_coord, coord
                    ))
                    .with_source(effective.source_hint()),
                ),
            }
        }
        let mut plugin_refs: Vec<Coordinate> = Vec::new();
        for plugin in effective.plugins.clone() {
            let plugin_coord = plugin.coordinate();
            if !self.policy.is_project(&plugin_coord) {
                continue;
            }
            match self.build_by_coord(&plugin_coord)? {
                Built::Ok(_) => plugin_refs.push(plugin_coord),
                Built::Failed => problems.push(
                    Problem::error(format!(
                        "Failure building plugin {} of {}",
                        plugin_coord, coord
                    ))
                    .with_source(effective.source_hint()),
                ),
            }
        }

        let node = ProjectNode {
            coordinate: coord,
            descriptor: effective,
            variant,
            parent: parent_node,
            imports: import_refs,
            plugins: plugin_refs,
            dependencies: dependency_refs,
        };
        Ok(Outcome::success_with(node, problems))
    }

    /// Walk the parent chain, activating each parent in the child's context,
    /// terminate on the super-descriptor and fold inheritance bottom-up.
    /// Returns `None` after recording a fatal problem.
    fn assemble_lineage(
        &mut self,
        child: Descriptor,
        ctx: &ActivationContext,
        problems: &mut Vec<Problem>,
    ) -> Option<Descriptor> {
        let hint = child.source_hint();
        let mut chain: Vec<Descriptor> = Vec::new();
        let mut seen: Vec<Coordinate> = Vec::new();
        if let Some(coord) = child.coordinate() {
            seen.push(coord);
        }
        for repo in &child.repositories {
            self.resolver.add_repository(repo);
        }
        let mut next_parent = child.parent.clone();
        chain.push(child);
        while let Some(parent_ref) = next_parent.take() {
            let parent_coord = parent_ref.coordinate();
            if seen.contains(&parent_coord) {
                let mut cycle: Vec<String> = seen.iter().map(ToString::to_string).collect();
                cycle.push(parent_coord.to_string());
                problems.push(
                    Problem::fatal(format!(
                        "The parents of {} form a cycle: {}",
                        hint,
                        cycle.join(" -> ")
                    ))
                    .with_source(hint.clone()),
                );
                return None;
            }
            let raw_parent = match self.workspace_parent(&parent_ref).cloned() {
                Some(descriptor) => descriptor,
                None => {
                    let expected = self
                        .policy
                        .source()
                        .get(&parent_coord)
                        .and_then(|d| d.source_path.clone());
                    match self.resolve_external(
                        &parent_ref.group_id,
                        &parent_ref.artifact_id,
                        &parent_ref.version,
                        "raw",
                        expected.as_deref(),
                    ) {
                        Ok(descriptor) => (*descriptor).clone(),
                        Err(cause) => {
                            problems.push(
                                Problem::fatal(format!(
                                    "Non-resolvable parent descriptor {} of {}",
                                    parent_ref, hint
                                ))
                                .with_source(hint.clone())
                                .with_cause(cause),
                            );
                            return None;
                        }
                    }
                }
            };
            let mut activated = raw_parent.clone();
            let active = profiles::select_active(&raw_parent.profiles, ctx);
            profiles::inject(&mut activated, &active);
            for repo in &activated.repositories {
                self.resolver.add_repository(repo);
            }
            seen.push(parent_coord);
            next_parent = activated.parent.clone();
            chain.push(activated);
        }

        let mut effective = self.super_provider.super_descriptor(None);
        for descriptor in chain.into_iter().rev() {
            effective = inherit::merge_parent(&descriptor, &effective);
        }
        Some(effective)
    }

    /// Workspace lookup for a parent reference; the declared version must
    /// agree with the indexed descriptor (uninterpolated versions pass).
    fn workspace_parent(&self, parent: &kiln_model::ParentRef) -> Option<&Descriptor> {
        let descriptor = self.policy.source().get(&parent.coordinate())?;
        match &descriptor.version {
            None => Some(descriptor),
            Some(v) if v.contains("${") || *v == parent.version => Some(descriptor),
            Some(_) => None,
        }
    }

    /// Resolve an external import and, recursively, the imports it declares
    /// itself. Reentering a coordinate on the import chain is an error and
    /// skips the offending import.
    fn resolve_external_import(
        &mut self,
        import: &Dependency,
        stack: &mut Vec<Coordinate>,
        problems: &mut Vec<Problem>,
    ) -> Option<Vec<Dependency>> {
        let import_coord = import.coordinate();
        if stack.contains(&import_coord) {
            let mut cycle: Vec<String> = stack.iter().map(ToString::to_string).collect();
            cycle.push(import_coord.to_string());
            problems.push(Problem::error(format!(
                "Dependency-management import cycle detected: {}",
                cycle.join(" -> ")
            )));
            return None;
        }
        let Some(version) = import.version.clone() else {
            problems.push(Problem::error(format!(
                "Dependency-management import {} must declare a version",
                import_coord
            )));
            return None;
        };
        let descriptor = match self.resolve_external(
            &import.group_id,
            &import.artifact_id,
            &version,
            "import",
            None,
        ) {
            Ok(d) => d,
            Err(cause) => {
                problems.push(
                    Problem::error(format!(
                        "Failure resolving dependency-management import {}:{}",
                        import_coord, version
                    ))
                    .with_cause(cause),
                );
                return None;
            }
        };
        stack.push(import_coord);
        let mut managed: Vec<Dependency> = descriptor
            .dependency_management
            .iter()
            .filter(|d| !d.is_import())
            .cloned()
            .collect();
        for nested in descriptor.dependency_management.iter().filter(|d| d.is_import()) {
            if let Some(more) = self.resolve_external_import(nested, stack, problems) {
                for entry in more {
                    if !managed.iter().any(|m| m.key() == entry.key()) {
                        managed.push(entry);
                    }
                }
            }
        }
        stack.pop();
        Some(managed)
    }

    /// Cache-through external resolution; cached descriptors are sanity
    /// checked against the expected source file.
    fn resolve_external(
        &mut self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        tag: &'static str,
        expected_source: Option<&Path>,
    ) -> Result<Arc<Descriptor>, String> {
        if let Some(hit) = self
            .cache
            .get(group_id, artifact_id, version, tag, expected_source)
        {
            return Ok(hit);
        }
        let source = self
            .resolver
            .resolve(group_id, artifact_id, version)
            .map_err(|e| e.to_string())?;
        let outcome = XmlDescriptorReader.parse(&source, ValidationLevel::Minimal);
        if outcome.is_error() {
            let causes: Vec<String> = outcome
                .problems()
                .iter()
                .map(|p| p.message.clone())
                .collect();
            return Err(causes.join("; "));
        }
        let descriptor = outcome
            .into_value()
            .ok_or_else(|| "external descriptor is empty".to_string())?;
        let descriptor = Arc::new(descriptor);
        self.cache
            .put(group_id, artifact_id, version, tag, descriptor.clone());
        Ok(descriptor)
    }

    /// Workspace-resolver adapter: a completed node by coordinate. Asking
    /// for a node whose build has not finished is a programming error.
    pub(crate) fn completed_node(&self, coord: &Coordinate) -> Result<&ProjectNode, BuildAbort> {
        let &i = self.state.completed_idx.get(coord).ok_or_else(|| {
            BuildAbort::Internal(format!("referenced project {} has not been completed", coord))
        })?;
        self.state.completed[i].1.value().ok_or_else(|| {
            BuildAbort::Internal(format!("referenced project {} completed without a node", coord))
        })
    }

    fn completed_ok(&self, coord: &Coordinate) -> Option<&ProjectNode> {
        let &i = self.state.completed_idx.get(coord)?;
        let outcome = &self.state.completed[i].1;
        if outcome.is_error() {
            return None;
        }
        outcome.value()
    }

    /// Whether a just-built node transitively references any source-variant
    /// project already in the memo.
    pub(crate) fn references_source(&self, node: &ProjectNode) -> bool {
        let mut seen: HashSet<Coordinate> = HashSet::new();
        let mut stack: Vec<Coordinate> = node.references().cloned().collect();
        while let Some(coord) = stack.pop() {
            if !seen.insert(coord.clone()) {
                continue;
            }
            if let Some(referenced) = self.completed_ok(&coord) {
                if referenced.variant == Variant::Source {
                    return true;
                }
                stack.extend(referenced.references().cloned());
            }
        }
        false
    }
}

fn status_of(outcome: &Outcome<ProjectNode>) -> Built {
    if outcome.is_error() {
        Built::Failed
    } else {
        match outcome.value() {
            Some(node) => Built::Ok(node.variant),
            None => Built::Failed,
        }
    }
}
