use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::outcome::{Problem, Severity};

/// Validation rule level, mirroring the descriptor format generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationLevel {
    /// Structural checks only; used for external descriptors.
    Minimal,
    /// The 2.0 rule set: legacy leniencies degrade to warnings.
    V20,
    #[default]
    Strict,
}

impl ValidationLevel {
    fn strictness(self, lenient: Severity, strict: Severity) -> Severity {
        match self {
            ValidationLevel::Strict => strict,
            _ => lenient,
        }
    }
}

/// Checks that must hold on a descriptor as parsed, before inheritance or
/// interpolation. The coordinate must already be derivable here.
pub fn validate_raw(d: &Descriptor, level: ValidationLevel) -> Vec<Problem> {
    let mut problems = Vec::new();
    let hint = d.source_hint();

    if d.artifact_id.is_empty() {
        problems.push(Problem::fatal("'artifactId' is missing").with_source(hint.clone()));
    } else if d.coordinate().is_none() {
        problems.push(
            Problem::fatal("'groupId' is missing and the parent reference does not declare one")
                .with_source(hint.clone()),
        );
    }

    if let Some(parent) = &d.parent {
        if parent.group_id.is_empty() || parent.artifact_id.is_empty() || parent.version.is_empty()
        {
            problems.push(
                Problem::error(
                    "parent reference must declare 'groupId', 'artifactId' and 'version'",
                )
                .with_source(hint.clone()),
            );
        }
    }

    if level == ValidationLevel::Minimal {
        return problems;
    }

    let mut seen_modules = HashSet::new();
    for module in &d.modules {
        if module.is_empty() {
            problems.push(Problem::error("'modules' contains an empty entry").with_source(hint.clone()));
        } else if !seen_modules.insert(module.as_str()) {
            problems.push(
                Problem::new(
                    level.strictness(Severity::Warning, Severity::Error),
                    format!("Duplicate module entry '{}'", module),
                )
                .with_source(hint.clone()),
            );
        }
    }

    for dep in d.dependencies.iter().chain(&d.dependency_management) {
        if dep.group_id.is_empty() || dep.artifact_id.is_empty() {
            problems.push(
                Problem::error("dependency must declare 'groupId' and 'artifactId'")
                    .with_source(hint.clone()),
            );
        }
    }

    let mut seen_profiles = HashSet::new();
    for profile in &d.profiles {
        if profile.id.is_empty() {
            problems.push(
                Problem::new(
                    level.strictness(Severity::Warning, Severity::Error),
                    "profile without an 'id'",
                )
                .with_source(hint.clone()),
            );
        } else if !seen_profiles.insert(profile.id.as_str()) {
            problems.push(
                Problem::error(format!("Duplicate profile id '{}'", profile.id))
                    .with_source(hint.clone()),
            );
        }
    }

    problems
}

/// Checks on a fully assembled effective descriptor.
pub fn validate_effective(d: &Descriptor, level: ValidationLevel) -> Vec<Problem> {
    let mut problems = Vec::new();
    let hint = d.source_hint();
    let id = d.display_id();

    if d.group_id.as_deref().unwrap_or("").is_empty() {
        problems.push(
            Problem::error(format!("Effective descriptor of {} has no 'groupId'", id))
                .with_source(hint.clone()),
        );
    }
    if d.version.as_deref().unwrap_or("").is_empty() {
        problems.push(
            Problem::error(format!("Effective descriptor of {} has no 'version'", id))
                .with_source(hint.clone()),
        );
    }

    if level == ValidationLevel::Minimal {
        return problems;
    }

    let mut seen = HashSet::new();
    for dep in &d.dependencies {
        if dep.version.as_deref().unwrap_or("").is_empty() {
            problems.push(
                Problem::error(format!(
                    "Dependency {}:{} of {} has no version and no managed version applies",
                    dep.group_id, dep.artifact_id, id
                ))
                .with_source(hint.clone()),
            );
        }
        if !seen.insert(dep.key()) {
            problems.push(
                Problem::new(
                    level.strictness(Severity::Warning, Severity::Error),
                    format!("Duplicate declaration of dependency {} in {}", dep.key(), id),
                )
                .with_source(hint.clone()),
            );
        }
    }

    for repo in &d.repositories {
        if repo.id.is_empty() || repo.url.is_empty() {
            problems.push(
                Problem::new(
                    level.strictness(Severity::Warning, Severity::Error),
                    format!("Repository of {} must declare 'id' and 'url'", id),
                )
                .with_source(hint.clone()),
            );
        }
    }

    problems
}
