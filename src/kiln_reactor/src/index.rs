use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kiln_model::{Coordinate, Descriptor, Outcome, Problem};

/// Unique mapping from coordinate to raw descriptor, preserving loader
/// insertion order.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceIndex {
    order: Vec<Coordinate>,
    map: HashMap<Coordinate, Descriptor>,
}

impl WorkspaceIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold descriptors into the index. Duplicate coordinates are fatal and
    /// no partial index is returned.
    pub fn build(descriptors: Vec<Descriptor>) -> Outcome<Self> {
        let mut index = Self::empty();
        let mut problems = Vec::new();
        for descriptor in descriptors {
            let Some(coord) = descriptor.coordinate() else {
                problems.push(
                    Problem::fatal(format!(
                        "Unable to determine the project identifier of {}",
                        descriptor.source_hint()
                    ))
                    .with_source(descriptor.source_hint()),
                );
                continue;
            };
            if let Some(existing) = index.map.get(&coord) {
                problems.push(Problem::fatal(format!(
                    "Duplicate project identifiers: {} declared in {} and {}",
                    coord,
                    existing.source_hint(),
                    descriptor.source_hint()
                )));
                continue;
            }
            index.order.push(coord.clone());
            index.map.insert(coord, descriptor);
        }
        if problems.iter().any(|p| p.severity.is_error()) {
            Outcome::failure(problems)
        } else {
            Outcome::success_with(index, problems)
        }
    }

    /// Insert, replacing any previous descriptor for the coordinate. Used by
    /// the binary repository index where several versions may coexist.
    pub fn insert_replacing(&mut self, coord: Coordinate, descriptor: Descriptor) {
        if !self.map.contains_key(&coord) {
            self.order.push(coord.clone());
        }
        self.map.insert(coord, descriptor);
    }

    pub fn get(&self, coord: &Coordinate) -> Option<&Descriptor> {
        self.map.get(coord)
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.map.contains_key(coord)
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &Descriptor)> {
        self.order.iter().map(|c| (c, &self.map[c]))
    }
}

/// User-facing project selector expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    ByCoordinate(Coordinate),
    ByArtifact(String),
    ByFile(PathBuf),
    ByDirectory(PathBuf),
}

impl Selector {
    /// Parse a selector string. Path expressions are resolved against the
    /// base directory and must name an existing file or directory.
    pub fn parse(raw: &str, base: &Path) -> Result<Selector, Problem> {
        if let Some((group, artifact)) = raw.split_once(':') {
            if artifact.is_empty() {
                return Err(Problem::fatal(format!(
                    "Invalid project selector '{}': missing artifactId",
                    raw
                )));
            }
            if group.is_empty() {
                return Ok(Selector::ByArtifact(artifact.to_string()));
            }
            return Ok(Selector::ByCoordinate(Coordinate::new(group, artifact)));
        }
        let path = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            base.join(raw)
        };
        let canonical = path.canonicalize().map_err(|_| {
            Problem::fatal(format!(
                "Invalid project selector '{}': {} does not exist",
                raw,
                path.display()
            ))
        })?;
        if canonical.is_file() {
            Ok(Selector::ByFile(canonical))
        } else {
            Ok(Selector::ByDirectory(canonical))
        }
    }

    pub fn matches(&self, coord: &Coordinate, descriptor: &Descriptor) -> bool {
        match self {
            Selector::ByCoordinate(c) => c == coord,
            Selector::ByArtifact(artifact) => coord.artifact_id == *artifact,
            Selector::ByFile(file) => descriptor
                .source_path
                .as_deref()
                .map(canonical)
                .is_some_and(|p| p == *file),
            Selector::ByDirectory(dir) => descriptor
                .source_path
                .as_deref()
                .and_then(Path::parent)
                .map(canonical)
                .is_some_and(|p| p == *dir),
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Apply the user's selector strings to the index, producing the selected
/// set in selector order. A selector that matches nothing is fatal.
pub fn select(
    index: &WorkspaceIndex,
    selectors: &[String],
    base: &Path,
) -> Outcome<Vec<Coordinate>> {
    let mut selected: Vec<Coordinate> = Vec::new();
    let mut problems = Vec::new();
    for raw in selectors {
        let selector = match Selector::parse(raw, base) {
            Ok(s) => s,
            Err(p) => {
                problems.push(p);
                continue;
            }
        };
        let mut matched = false;
        for (coord, descriptor) in index.iter() {
            if selector.matches(coord, descriptor) {
                matched = true;
                if !selected.contains(coord) {
                    selected.push(coord.clone());
                }
            }
        }
        if !matched {
            problems.push(Problem::fatal(format!(
                "Could not find the selected project in the workspace: {}",
                raw
            )));
        }
    }
    if problems.iter().any(|p| p.severity.is_error()) {
        Outcome::failure(problems)
    } else {
        Outcome::success_with(selected, problems)
    }
}
