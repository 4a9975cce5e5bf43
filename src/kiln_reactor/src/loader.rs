use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use kiln_model::reader::DescriptorLocator;
use kiln_model::{Descriptor, Outcome, Problem, Severity, ValidationLevel, XmlDescriptorReader};

/// Walks the aggregation tree from a root descriptor file and returns every
/// reachable raw descriptor, parents before their children.
pub struct DescriptorLoader<'a> {
    locator: &'a dyn DescriptorLocator,
}

impl<'a> DescriptorLoader<'a> {
    pub fn new(locator: &'a dyn DescriptorLocator) -> Self {
        Self { locator }
    }

    pub fn load(&self, root: &Path) -> Outcome<Vec<Descriptor>> {
        if !root.is_file() {
            return Outcome::failure(vec![
                Problem::fatal(format!("Root descriptor {} does not exist", root.display()))
                    .with_source(root.display().to_string()),
            ]);
        }
        let canonical_root = canonicalize(root);
        let mut visited = HashSet::new();
        let mut trail = Vec::new();
        let mut descriptors = Vec::new();
        let mut problems = Vec::new();
        visited.insert(canonical_root.clone());
        self.descend(
            canonical_root,
            &mut visited,
            &mut trail,
            &mut descriptors,
            &mut problems,
        );
        debug!("discovered {} descriptor(s)", descriptors.len());
        if problems.iter().any(|p| p.severity.is_error()) {
            Outcome::failure_with(descriptors, problems)
        } else {
            Outcome::success_with(descriptors, problems)
        }
    }

    fn descend(
        &self,
        file: PathBuf,
        visited: &mut HashSet<PathBuf>,
        trail: &mut Vec<PathBuf>,
        descriptors: &mut Vec<Descriptor>,
        problems: &mut Vec<Problem>,
    ) {
        trace!("loading descriptor {}", file.display());
        trail.push(file.clone());
        let outcome = XmlDescriptorReader::read_file(&file, ValidationLevel::Strict);
        let fatal = outcome
            .problems()
            .iter()
            .any(|p| p.severity == Severity::Fatal);
        let (descriptor, file_problems) = outcome.into_parts();
        problems.extend(file_problems);
        let Some(descriptor) = descriptor else {
            trail.pop();
            return;
        };
        if fatal {
            // Only a fatal parse stops the descent; a descriptor with
            // recoverable errors is kept and its modules still explored.
            // Siblings continue either way.
            trail.pop();
            return;
        }

        let dir = file.parent().unwrap_or(Path::new(".")).to_path_buf();
        let modules = descriptor.modules.clone();
        descriptors.push(descriptor);

        for fragment in modules {
            // Module fragments may use either separator style.
            let normalized = fragment.replace('\\', "/");
            let candidate = dir.join(&normalized);
            let resolved = if candidate.is_file() {
                Some(candidate.clone())
            } else if candidate.is_dir() {
                self.locator.locate(&candidate)
            } else {
                None
            };
            let Some(child) = resolved else {
                problems.push(
                    Problem::error(format!(
                        "Child module {} of {} does not exist",
                        candidate.display(),
                        file.display()
                    ))
                    .with_source(file.display().to_string()),
                );
                continue;
            };
            let canonical = canonicalize(&child);
            if !visited.insert(canonical.clone()) {
                problems.push(
                    Problem::error(format!(
                        "Child module {} of {} forms aggregation cycle {}",
                        child.display(),
                        file.display(),
                        cycle_path(trail, &canonical)
                    ))
                    .with_source(file.display().to_string()),
                );
                continue;
            }
            self.descend(canonical, visited, trail, descriptors, problems);
        }
        trail.pop();
    }
}

fn canonicalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn cycle_path(trail: &[PathBuf], reentered: &Path) -> String {
    let start = trail.iter().position(|p| p == reentered).unwrap_or(0);
    let mut parts: Vec<String> = trail[start..]
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    parts.push(reentered.display().to_string());
    parts.join(" -> ")
}
