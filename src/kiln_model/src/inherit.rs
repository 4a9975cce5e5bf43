use crate::descriptor::{Dependency, Descriptor, Plugin, Repository};

/// Assemble one inheritance step: merge `parent` into `child`. The child wins
/// scalar conflicts; list-valued sections merge by identity key. Modules,
/// profiles and the parent reference are never inherited.
pub fn merge_parent(child: &Descriptor, parent: &Descriptor) -> Descriptor {
    let mut merged = child.clone();

    if merged.group_id.is_none() {
        merged.group_id = parent.group_id.clone();
    }
    if merged.version.is_none() {
        merged.version = parent.version.clone();
    }
    if merged.url.is_none() {
        merged.url = parent.url.clone();
    }

    for (key, value) in &parent.properties {
        merged
            .properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    merge_dependency_list(&mut merged.dependencies, &parent.dependencies, false);
    merge_dependency_list(
        &mut merged.dependency_management,
        &parent.dependency_management,
        false,
    );
    merge_plugin_list(&mut merged.plugins, &parent.plugins, false);
    merge_repository_list(&mut merged.repositories, &parent.repositories);

    merged
}

/// Keyed merge of dependency lists. Existing entries win unless
/// `incoming_wins`; either way missing fields are filled from the other side
/// and unseen incoming keys are appended in order.
pub fn merge_dependency_list(base: &mut Vec<Dependency>, incoming: &[Dependency], incoming_wins: bool) {
    for inc in incoming {
        match base.iter_mut().find(|d| d.key() == inc.key()) {
            Some(existing) => {
                if incoming_wins {
                    if inc.version.is_some() {
                        existing.version = inc.version.clone();
                    }
                    if inc.scope.is_some() {
                        existing.scope = inc.scope.clone();
                    }
                    existing.optional = inc.optional;
                } else {
                    if existing.version.is_none() {
                        existing.version = inc.version.clone();
                    }
                    if existing.scope.is_none() {
                        existing.scope = inc.scope.clone();
                    }
                }
            }
            None => base.push(inc.clone()),
        }
    }
}

pub fn merge_plugin_list(base: &mut Vec<Plugin>, incoming: &[Plugin], incoming_wins: bool) {
    for inc in incoming {
        match base.iter_mut().find(|p| p.key() == inc.key()) {
            Some(existing) => {
                if incoming_wins {
                    if inc.version.is_some() {
                        existing.version = inc.version.clone();
                    }
                    for (k, v) in &inc.configuration {
                        existing.configuration.insert(k.clone(), v.clone());
                    }
                } else {
                    if existing.version.is_none() {
                        existing.version = inc.version.clone();
                    }
                    for (k, v) in &inc.configuration {
                        existing
                            .configuration
                            .entry(k.clone())
                            .or_insert_with(|| v.clone());
                    }
                }
            }
            None => base.push(inc.clone()),
        }
    }
}

pub fn merge_repository_list(base: &mut Vec<Repository>, incoming: &[Repository]) {
    for inc in incoming {
        if !base.iter().any(|r| r.id == inc.id) {
            base.push(inc.clone());
        }
    }
}
