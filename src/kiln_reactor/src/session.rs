use std::collections::BTreeMap;
use std::path::PathBuf;

use log::info;

use kiln_model::reader::DefaultLocator;
use kiln_model::{Outcome, Problem, Profile, ValidationLevel};

use crate::graph::ProjectGraph;
use crate::graph::builder::GraphBuilder;
use crate::index::{self, WorkspaceIndex};
use crate::loader::DescriptorLoader;
use crate::policy::{BehaviorPolicy, MakeBehavior};
use crate::resolve::{self, ExternalResolver, FileRepositoryResolver, OfflineResolver};

/// Immutable inputs of one reactor invocation.
#[derive(Debug, Clone)]
pub struct ReactorSession {
    /// Root descriptor file.
    pub descriptor_file: PathBuf,
    /// Directory project selectors are resolved against.
    pub base_directory: PathBuf,
    /// Selector expressions; empty means `ALL`.
    pub selected_projects: Vec<String>,
    pub make_behavior: Option<MakeBehavior>,
    pub active_profile_ids: Vec<String>,
    pub inactive_profile_ids: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
    pub user_properties: BTreeMap<String, String>,
    pub validation_level: ValidationLevel,
    /// Externally contributed profile definitions.
    pub profiles: Vec<Profile>,
    /// Local repository holding binary descriptors; also serves external
    /// resolution when no explicit resolver is supplied.
    pub repository: Option<PathBuf>,
}

impl ReactorSession {
    pub fn new(descriptor_file: impl Into<PathBuf>) -> Self {
        let descriptor_file = descriptor_file.into();
        let base_directory = match descriptor_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            descriptor_file,
            base_directory,
            selected_projects: Vec::new(),
            make_behavior: None,
            active_profile_ids: Vec::new(),
            inactive_profile_ids: Vec::new(),
            system_properties: BTreeMap::new(),
            user_properties: BTreeMap::new(),
            validation_level: ValidationLevel::default(),
            profiles: Vec::new(),
            repository: None,
        }
    }
}

/// Baseline system properties a front end usually seeds a session with.
pub fn default_system_properties() -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    properties.insert("os.name".to_string(), std::env::consts::OS.to_string());
    properties.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
    properties.insert("os.family".to_string(), std::env::consts::FAMILY.to_string());
    if let Ok(dir) = std::env::current_dir() {
        properties.insert("user.dir".to_string(), dir.display().to_string());
    }
    properties.insert(
        "kiln.version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    properties
}

/// Assemble the reactor graph with the resolver implied by the session: the
/// configured repository, or offline.
pub fn assemble(session: &ReactorSession) -> Outcome<ProjectGraph> {
    match &session.repository {
        Some(root) => {
            let resolver = FileRepositoryResolver::new(root.clone());
            assemble_with(session, &resolver)
        }
        None => assemble_with(session, &OfflineResolver),
    }
}

/// Loader, indexer and policy feed the graph builder; diagnostics of every
/// stage aggregate in order.
pub fn assemble_with(
    session: &ReactorSession,
    resolver: &dyn ExternalResolver,
) -> Outcome<ProjectGraph> {
    let mut problems: Vec<Problem> = Vec::new();

    let loaded = DescriptorLoader::new(&DefaultLocator).load(&session.descriptor_file);
    let failed = loaded.is_error();
    let (descriptors, loader_problems) = loaded.into_parts();
    problems.extend(loader_problems);
    let Some(descriptors) = descriptors.filter(|_| !failed) else {
        return Outcome::failure(problems);
    };

    let indexed = WorkspaceIndex::build(descriptors);
    let failed = indexed.is_error();
    let (source_index, index_problems) = indexed.into_parts();
    problems.extend(index_problems);
    let Some(source_index) = source_index.filter(|_| !failed) else {
        return Outcome::failure(problems);
    };
    info!("workspace contains {} project(s)", source_index.len());

    let binary_index = match &session.repository {
        Some(root) => {
            let loaded = resolve::load_repository_index(root);
            let (index, repo_problems) = loaded.into_parts();
            problems.extend(repo_problems);
            index.unwrap_or_else(WorkspaceIndex::empty)
        }
        None => WorkspaceIndex::empty(),
    };

    let selection = index::select(
        &source_index,
        &session.selected_projects,
        &session.base_directory,
    );
    let failed = selection.is_error();
    let (selected, selection_problems) = selection.into_parts();
    problems.extend(selection_problems);
    let Some(selected) = selected.filter(|_| !failed) else {
        return Outcome::failure(problems);
    };

    let policy = BehaviorPolicy::create(
        session.make_behavior,
        source_index,
        binary_index,
        selected,
    );
    let failed = policy.is_error();
    let (policy, policy_problems) = policy.into_parts();
    problems.extend(policy_problems);
    let Some(policy) = policy.filter(|_| !failed) else {
        return Outcome::failure(problems);
    };

    let run = GraphBuilder::new(session, &policy, resolver).run();
    let failed = run.is_error();
    let (graph, run_problems) = run.into_parts();
    problems.extend(run_problems);
    match graph {
        Some(graph) if !failed => Outcome::success_with(graph, problems),
        _ => Outcome::failure(problems),
    }
}
