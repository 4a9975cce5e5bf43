use log::debug;
use serde::{Deserialize, Serialize};

use kiln_model::{Coordinate, Outcome, Problem};

use crate::graph::ProjectNode;
use crate::graph::builder::{BuildAbort, GraphBuilder};
use crate::index::WorkspaceIndex;

/// User-requested make behavior, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MakeBehavior {
    /// also-make: selected projects plus everything they build on.
    Upstream,
    /// also-make-dependents: everything, binaries standing in where a
    /// project is independent of source changes.
    Downstream,
    /// Combination of both; rejected.
    Both,
}

/// The realized build policy, one of the tagged variants below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPolicy {
    All,
    SelectedOnly,
    Upstream,
    Downstream,
}

/// Per-invocation policy: which coordinates seed the traversal, which count
/// as workspace projects, and which variant represents each node.
pub struct BehaviorPolicy {
    kind: BuildPolicy,
    source: WorkspaceIndex,
    binary: WorkspaceIndex,
    selected: Vec<Coordinate>,
}

impl BehaviorPolicy {
    /// Derive the policy from the session inputs. `BOTH` is unsupported and
    /// fails before any traversal; a make behavior without selections
    /// degrades to `ALL`.
    pub fn create(
        make_behavior: Option<MakeBehavior>,
        source: WorkspaceIndex,
        binary: WorkspaceIndex,
        selected: Vec<Coordinate>,
    ) -> Outcome<Self> {
        let kind = match make_behavior {
            Some(MakeBehavior::Both) => {
                return Outcome::failure(vec![Problem::fatal(
                    "Combining also-make with also-make-dependents is not supported",
                )]);
            }
            None if selected.is_empty() => BuildPolicy::All,
            None => BuildPolicy::SelectedOnly,
            Some(_) if selected.is_empty() => BuildPolicy::All,
            Some(MakeBehavior::Upstream) => BuildPolicy::Upstream,
            Some(MakeBehavior::Downstream) => BuildPolicy::Downstream,
        };
        debug!("build policy: {:?}, {} selected", kind, selected.len());
        Outcome::success(Self {
            kind,
            source,
            binary,
            selected,
        })
    }

    pub fn kind(&self) -> BuildPolicy {
        self.kind
    }

    pub fn source(&self) -> &WorkspaceIndex {
        &self.source
    }

    pub fn binary(&self) -> &WorkspaceIndex {
        &self.binary
    }

    pub fn is_selected(&self, coord: &Coordinate) -> bool {
        self.selected.contains(coord)
    }

    /// The coordinates the traversal starts from. Full traversals seed in
    /// reverse discovery order so modules complete before the aggregators
    /// that list them; real references still dictate the order within a
    /// subtree.
    pub fn seed_coordinates(&self) -> Vec<Coordinate> {
        match self.kind {
            BuildPolicy::All | BuildPolicy::Downstream => {
                self.source.coordinates().iter().rev().cloned().collect()
            }
            BuildPolicy::SelectedOnly | BuildPolicy::Upstream => self.selected.clone(),
        }
    }

    /// Whether a coordinate belongs to the workspace (vs external).
    pub fn is_project(&self, coord: &Coordinate) -> bool {
        match self.kind {
            BuildPolicy::All | BuildPolicy::Upstream => self.source.contains(coord),
            BuildPolicy::SelectedOnly | BuildPolicy::Downstream => {
                self.source.contains(coord) || self.binary.contains(coord)
            }
        }
    }

    /// Build one coordinate, choosing the variant and handling fallback. The
    /// pipeline work is delegated back to the builder.
    pub(crate) fn build(
        &self,
        coord: &Coordinate,
        builder: &mut GraphBuilder,
    ) -> Result<Outcome<ProjectNode>, BuildAbort> {
        match self.kind {
            BuildPolicy::All | BuildPolicy::Upstream => {
                let raw = self.source_raw(coord)?;
                builder.build_by_variant(true, raw)
            }
            BuildPolicy::SelectedOnly => {
                if self.is_selected(coord) {
                    let raw = self.source_raw(coord)?;
                    builder.build_by_variant(true, raw)
                } else if let Some(raw) = self.binary.get(coord) {
                    builder.build_by_variant(false, raw.clone())
                } else {
                    Ok(Outcome::failure(vec![Problem::fatal(format!(
                        "Project {} is not selected and no binary project with the same id is available",
                        coord
                    ))]))
                }
            }
            BuildPolicy::Downstream => self.build_downstream(coord, builder),
        }
    }

    /// Downstream variant choice. A source project independent of every
    /// source-variant node may be represented by its binary; a binary that
    /// would pull in source falls back to the source variant.
    fn build_downstream(
        &self,
        coord: &Coordinate,
        builder: &mut GraphBuilder,
    ) -> Result<Outcome<ProjectNode>, BuildAbort> {
        match self.source.get(coord) {
            Some(raw) => {
                let source_outcome = builder.build_by_variant(true, raw.clone())?;
                if self.is_selected(coord) {
                    return Ok(source_outcome);
                }
                let source_ok = !source_outcome.is_error();
                let pulls_source = source_outcome
                    .value()
                    .is_some_and(|node| builder.references_source(node));
                if !source_ok || pulls_source {
                    return Ok(source_outcome);
                }
                let Some(binary_raw) = self.binary.get(coord) else {
                    return Ok(source_outcome);
                };
                let binary_outcome = builder.build_by_variant(false, binary_raw.clone())?;
                if binary_outcome.is_error() {
                    debug!(
                        "binary variant of {} failed to build, keeping source",
                        coord
                    );
                    return Ok(source_outcome);
                }
                let binary_pulls_source = binary_outcome
                    .value()
                    .is_some_and(|node| builder.references_source(node));
                if binary_pulls_source {
                    // Use source because the binary would pull in source.
                    Ok(source_outcome)
                } else {
                    Ok(binary_outcome)
                }
            }
            None => {
                let raw = self.binary.get(coord).cloned().ok_or_else(|| {
                    BuildAbort::Internal(format!(
                        "{} is neither a source nor a binary project",
                        coord
                    ))
                })?;
                let binary_outcome = builder.build_by_variant(false, raw)?;
                let pulls_source = binary_outcome
                    .value()
                    .is_some_and(|node| builder.references_source(node));
                if !binary_outcome.is_error() && pulls_source {
                    return Ok(binary_outcome.add_problem(Problem::fatal(format!(
                        "Binary project {} refers to a source project, but no source project with same id available",
                        coord
                    ))));
                }
                Ok(binary_outcome)
            }
        }
    }

    fn source_raw(&self, coord: &Coordinate) -> Result<kiln_model::Descriptor, BuildAbort> {
        self.source.get(coord).cloned().ok_or_else(|| {
            BuildAbort::Internal(format!("{} is not a source project", coord))
        })
    }
}
