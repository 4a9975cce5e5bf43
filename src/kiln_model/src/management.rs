use std::collections::HashSet;

use crate::descriptor::{DEFAULT_PLUGIN_GROUP, Dependency, Descriptor};

/// Propagate managed versions and scopes to dependencies that do not declare
/// their own.
pub fn inject_management(descriptor: &mut Descriptor) {
    let managed: Vec<Dependency> = descriptor.dependency_management.clone();
    for dep in &mut descriptor.dependencies {
        if let Some(entry) = managed.iter().find(|m| m.key() == dep.key()) {
            if dep.version.is_none() {
                dep.version = entry.version.clone();
            }
            if dep.scope.is_none() {
                dep.scope = entry.scope.clone();
            }
        }
    }
}

/// Append an imported dependency-management fragment. Own entries win, and
/// among imports the first contribution of a key wins (source order).
pub fn merge_imported_management(descriptor: &mut Descriptor, imported: &[Dependency]) {
    let present: HashSet<String> = descriptor
        .dependency_management
        .iter()
        .map(Dependency::key)
        .collect();
    for entry in imported {
        if !present.contains(&entry.key()) {
            descriptor.dependency_management.push(entry.clone());
        }
    }
}

/// Fill the defaults the descriptor format leaves implicit.
pub fn inject_defaults(descriptor: &mut Descriptor) {
    if descriptor.packaging.is_none() {
        descriptor.packaging = Some("jar".to_string());
    }
    for dep in &mut descriptor.dependencies {
        if dep.dep_type.is_none() {
            dep.dep_type = Some("jar".to_string());
        }
        if dep.scope.is_none() {
            dep.scope = Some("compile".to_string());
        }
    }
    for plugin in &mut descriptor.plugins {
        if plugin.group_id.is_none() {
            plugin.group_id = Some(DEFAULT_PLUGIN_GROUP.to_string());
        }
    }
}

/// Collapse duplicate plugin declarations into the first one, earlier
/// configuration entries winning.
pub fn expand_plugin_configuration(descriptor: &mut Descriptor) {
    let mut result: Vec<crate::descriptor::Plugin> = Vec::new();
    for plugin in descriptor.plugins.drain(..) {
        match result.iter_mut().find(|p| p.key() == plugin.key()) {
            Some(existing) => {
                if existing.version.is_none() {
                    existing.version = plugin.version;
                }
                for (k, v) in plugin.configuration {
                    existing.configuration.entry(k).or_insert(v);
                }
            }
            None => result.push(plugin),
        }
    }
    descriptor.plugins = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(g: &str, a: &str, v: Option<&str>, scope: Option<&str>) -> Dependency {
        Dependency {
            group_id: g.into(),
            artifact_id: a.into(),
            version: v.map(Into::into),
            scope: scope.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn managed_version_applies_to_unversioned() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            dependencies: vec![dep("x", "y", None, None)],
            dependency_management: vec![dep("x", "y", Some("1.0"), Some("test"))],
            ..Default::default()
        };
        inject_management(&mut d);
        assert_eq!(d.dependencies[0].version.as_deref(), Some("1.0"));
        assert_eq!(d.dependencies[0].scope.as_deref(), Some("test"));
    }

    #[test]
    fn own_management_wins_over_import() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            dependency_management: vec![dep("x", "y", Some("1.0"), None)],
            ..Default::default()
        };
        merge_imported_management(&mut d, &[dep("x", "y", Some("9.9"), None)]);
        assert_eq!(d.dependency_management.len(), 1);
        assert_eq!(d.dependency_management[0].version.as_deref(), Some("1.0"));
    }

    #[test]
    fn first_import_wins_for_new_keys() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            ..Default::default()
        };
        merge_imported_management(&mut d, &[dep("x", "y", Some("1.0"), None)]);
        merge_imported_management(&mut d, &[dep("x", "y", Some("2.0"), None)]);
        assert_eq!(d.dependency_management.len(), 1);
        assert_eq!(d.dependency_management[0].version.as_deref(), Some("1.0"));
    }
}
