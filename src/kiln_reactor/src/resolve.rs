use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use kiln_model::reader::DescriptorSource;
use kiln_model::{Descriptor, Outcome, ParentRef, Problem, Repository, ValidationLevel, XmlDescriptorReader};

use crate::index::WorkspaceIndex;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("descriptor {group_id}:{artifact_id}:{version} not found in any repository")]
    NotFound {
        group_id: String,
        artifact_id: String,
        version: String,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches descriptors that are not part of the workspace. Implementations
/// are only ever called from the invocation's single thread.
pub trait ExternalResolver {
    fn resolve(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<DescriptorSource, ResolveError>;

    fn resolve_parent(&self, parent: &ParentRef) -> Result<DescriptorSource, ResolveError> {
        self.resolve(&parent.group_id, &parent.artifact_id, &parent.version)
    }

    /// Register a repository declared by a descriptor on the lineage walk.
    fn add_repository(&self, _repository: &Repository) {}

    /// Fresh copy for an isolated invocation.
    fn new_copy(&self) -> Box<dyn ExternalResolver>;
}

/// The default resolver: every lookup misses.
pub struct OfflineResolver;

impl ExternalResolver for OfflineResolver {
    fn resolve(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<DescriptorSource, ResolveError> {
        Err(ResolveError::NotFound {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
        })
    }

    fn new_copy(&self) -> Box<dyn ExternalResolver> {
        Box::new(OfflineResolver)
    }
}

/// Resolves descriptors from a local repository directory with the layout
/// `<root>/<groupId>/<artifactId>/<version>/<artifactId>-<version>.xml`.
pub struct FileRepositoryResolver {
    root: PathBuf,
    registered: RefCell<Vec<Repository>>,
}

impl FileRepositoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registered: RefCell::new(Vec::new()),
        }
    }

    fn descriptor_path(&self, group_id: &str, artifact_id: &str, version: &str) -> PathBuf {
        self.root
            .join(group_id)
            .join(artifact_id)
            .join(version)
            .join(format!("{}-{}.xml", artifact_id, version))
    }

    pub fn registered_repositories(&self) -> Vec<Repository> {
        self.registered.borrow().clone()
    }
}

impl ExternalResolver for FileRepositoryResolver {
    fn resolve(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<DescriptorSource, ResolveError> {
        let path = self.descriptor_path(group_id, artifact_id, version);
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                group_id: group_id.to_string(),
                artifact_id: artifact_id.to_string(),
                version: version.to_string(),
            });
        }
        debug!("resolving {}:{}:{} from {}", group_id, artifact_id, version, path.display());
        DescriptorSource::from_file(&path).map_err(|e| match e {
            kiln_model::reader::ReadError::Io { path, source } => ResolveError::Io { path, source },
            other => ResolveError::Io {
                path,
                source: std::io::Error::other(other.to_string()),
            },
        })
    }

    fn add_repository(&self, repository: &Repository) {
        let mut registered = self.registered.borrow_mut();
        if !registered.iter().any(|r| r.id == repository.id) {
            registered.push(repository.clone());
        }
    }

    fn new_copy(&self) -> Box<dyn ExternalResolver> {
        Box::new(FileRepositoryResolver::new(self.root.clone()))
    }
}

/// Index every descriptor stored in a repository directory; used as the
/// binary index of installed projects. The highest version of a coordinate
/// wins. Unreadable entries degrade to warnings, never failures.
pub fn load_repository_index(root: &Path) -> Outcome<WorkspaceIndex> {
    let mut index = WorkspaceIndex::empty();
    let mut problems = Vec::new();
    let Ok(groups) = sorted_dirs(root) else {
        return Outcome::success_with(
            index,
            vec![Problem::warning(format!(
                "Binary repository {} is not readable",
                root.display()
            ))],
        );
    };
    for group_dir in groups {
        let group = dir_name(&group_dir);
        for artifact_dir in sorted_dirs(&group_dir).unwrap_or_default() {
            let artifact = dir_name(&artifact_dir);
            for version_dir in sorted_dirs(&artifact_dir).unwrap_or_default() {
                let version = dir_name(&version_dir);
                let candidate = version_dir.join(format!("{}-{}.xml", artifact, version));
                if !candidate.is_file() {
                    continue;
                }
                let outcome = XmlDescriptorReader::read_file(&candidate, ValidationLevel::Minimal);
                if outcome.is_error() {
                    problems.push(
                        Problem::warning(format!(
                            "Ignoring unreadable binary descriptor {}",
                            candidate.display()
                        ))
                        .with_source(candidate.display().to_string()),
                    );
                    continue;
                }
                if let Some(mut descriptor) = outcome.into_value() {
                    if descriptor.group_id.is_none() {
                        descriptor.group_id = Some(group.clone());
                    }
                    if descriptor.version.is_none() {
                        descriptor.version = Some(version.clone());
                    }
                    match descriptor.coordinate() {
                        // Versions iterate in ascending order, so the last
                        // insert leaves the highest version in place.
                        Some(coord) => index.insert_replacing(coord, descriptor),
                        None => warn!(
                            "binary descriptor {} has no identifier, skipping",
                            candidate.display()
                        ),
                    }
                }
            }
        }
    }
    Outcome::success_with(index, problems)
}

fn sorted_dirs(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Per-invocation external-descriptor cache, write-once per key. A hit is
/// sanity checked: when the caller knows which file the descriptor should
/// have come from and the cached one disagrees, the cache is bypassed so a
/// malformed workspace is never masked.
pub(crate) struct ModelCache {
    map: HashMap<(String, String, String, &'static str), Arc<Descriptor>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        tag: &'static str,
        expected_source: Option<&Path>,
    ) -> Option<Arc<Descriptor>> {
        let key = (
            group_id.to_string(),
            artifact_id.to_string(),
            version.to_string(),
            tag,
        );
        let cached = self.map.get(&key)?;
        if let (Some(expected), Some(actual)) = (expected_source, cached.source_path.as_deref()) {
            if expected != actual {
                return None;
            }
        }
        Some(cached.clone())
    }

    pub fn put(
        &mut self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        tag: &'static str,
        descriptor: Arc<Descriptor>,
    ) {
        self.map
            .entry((
                group_id.to_string(),
                artifact_id.to_string(),
                version.to_string(),
                tag,
            ))
            .or_insert(descriptor);
    }
}
