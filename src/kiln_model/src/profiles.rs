use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::descriptor::{Activation, Descriptor, OsActivation, Profile};
use crate::inherit;

/// Context a profile activation predicate is evaluated against. Derived from
/// the *building* project's base directory and the session property maps,
/// also when parents of that project are activated.
#[derive(Debug, Clone)]
pub struct ActivationContext<'a> {
    pub active_ids: &'a [String],
    pub inactive_ids: &'a [String],
    /// Merged system and user properties, user entries winning.
    pub properties: BTreeMap<String, String>,
    pub base_dir: Option<PathBuf>,
}

impl<'a> ActivationContext<'a> {
    pub fn new(
        active_ids: &'a [String],
        inactive_ids: &'a [String],
        system_properties: &BTreeMap<String, String>,
        user_properties: &BTreeMap<String, String>,
        base_dir: Option<&Path>,
    ) -> Self {
        let mut properties = system_properties.clone();
        properties.extend(user_properties.clone());
        Self {
            active_ids,
            inactive_ids,
            properties,
            base_dir: base_dir.map(Path::to_path_buf),
        }
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    fn os_name(&self) -> &str {
        self.property("os.name").unwrap_or(std::env::consts::OS)
    }

    fn os_arch(&self) -> &str {
        self.property("os.arch").unwrap_or(std::env::consts::ARCH)
    }

    fn os_family(&self) -> &str {
        self.property("os.family").unwrap_or(std::env::consts::FAMILY)
    }
}

/// Returns the active subset of `profiles`, deterministically: explicit ids
/// and predicate matches first, `activeByDefault` profiles only when nothing
/// else activated, the result order-stable by profile id.
pub fn select_active<'p>(profiles: &'p [Profile], ctx: &ActivationContext) -> Vec<&'p Profile> {
    let inactive = |p: &Profile| ctx.inactive_ids.iter().any(|id| *id == p.id);
    let mut active: Vec<&Profile> = Vec::new();

    for profile in profiles {
        if inactive(profile) {
            continue;
        }
        if ctx.active_ids.iter().any(|id| *id == profile.id) {
            active.push(profile);
            continue;
        }
        if let Some(activation) = &profile.activation {
            if has_conditions(activation) && conditions_hold(activation, ctx) {
                active.push(profile);
            }
        }
    }

    if active.is_empty() {
        for profile in profiles {
            if inactive(profile) {
                continue;
            }
            if profile
                .activation
                .as_ref()
                .is_some_and(|a| a.active_by_default)
            {
                active.push(profile);
            }
        }
    }

    active.sort_by(|a, b| a.id.cmp(&b.id));
    active
}

/// Merge the overlays of `active` profiles into the descriptor, overlay
/// entries winning, and record the injected ids.
pub fn inject(descriptor: &mut Descriptor, active: &[&Profile]) {
    for profile in active {
        for (key, value) in &profile.overlay.properties {
            descriptor.properties.insert(key.clone(), value.clone());
        }
        inherit::merge_dependency_list(
            &mut descriptor.dependencies,
            &profile.overlay.dependencies,
            true,
        );
        inherit::merge_dependency_list(
            &mut descriptor.dependency_management,
            &profile.overlay.dependency_management,
            true,
        );
        inherit::merge_plugin_list(&mut descriptor.plugins, &profile.overlay.plugins, true);
        inherit::merge_repository_list(&mut descriptor.repositories, &profile.overlay.repositories);
        if !profile.id.is_empty() {
            descriptor.active_profiles.push(profile.id.clone());
        }
    }
}

fn has_conditions(a: &Activation) -> bool {
    a.jdk.is_some() || a.property.is_some() || a.file.is_some() || a.os.is_some()
}

fn conditions_hold(a: &Activation, ctx: &ActivationContext) -> bool {
    if let Some(property) = &a.property {
        if !property_holds(&property.name, property.value.as_deref(), ctx) {
            return false;
        }
    }
    if let Some(file) = &a.file {
        if let Some(exists) = &file.exists {
            if !resolve_file(exists, ctx).exists() {
                return false;
            }
        }
        if let Some(missing) = &file.missing {
            if resolve_file(missing, ctx).exists() {
                return false;
            }
        }
    }
    if let Some(jdk) = &a.jdk {
        let version = ctx.property("java.version").unwrap_or("");
        if !jdk_matches(jdk, version) {
            return false;
        }
    }
    if let Some(os) = &a.os {
        if !os_matches(os, ctx) {
            return false;
        }
    }
    true
}

fn property_holds(name: &str, expected: Option<&str>, ctx: &ActivationContext) -> bool {
    if let Some(stripped) = name.strip_prefix('!') {
        return ctx.property(stripped).is_none();
    }
    match (ctx.property(name), expected) {
        (Some(actual), Some(expected)) => match expected.strip_prefix('!') {
            Some(negated) => actual != negated,
            None => actual == expected,
        },
        (None, Some(expected)) => expected.starts_with('!'),
        (Some(_), None) => true,
        (None, None) => false,
    }
}

fn resolve_file(path: &str, ctx: &ActivationContext) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match &ctx.base_dir {
        Some(base) => base.join(p),
        None => p.to_path_buf(),
    }
}

fn jdk_matches(spec: &str, version: &str) -> bool {
    if version.is_empty() {
        return false;
    }
    if let Some(negated) = spec.strip_prefix('!') {
        return !version.starts_with(negated);
    }
    if spec.starts_with('[') || spec.starts_with('(') {
        return version_in_range(spec, version);
    }
    version.starts_with(spec)
}

fn version_in_range(range: &str, version: &str) -> bool {
    let lower_inclusive = range.starts_with('[');
    let upper_inclusive = range.ends_with(']');
    let inner = &range[1..range.len().saturating_sub(1)];
    let Some((lo, hi)) = inner.split_once(',') else {
        return false;
    };
    let (lo, hi) = (lo.trim(), hi.trim());
    if !lo.is_empty() {
        let ord = compare_versions(version, lo);
        if ord == std::cmp::Ordering::Less || (!lower_inclusive && ord == std::cmp::Ordering::Equal)
        {
            return false;
        }
    }
    if !hi.is_empty() {
        let ord = compare_versions(version, hi);
        if ord == std::cmp::Ordering::Greater
            || (!upper_inclusive && ord == std::cmp::Ordering::Equal)
        {
            return false;
        }
    }
    true
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parts = |s: &str| -> Vec<u64> {
        s.split(['.', '-', '_'])
            .map(|p| p.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (pa, pb) = (parts(a), parts(b));
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let (x, y) = (pa.get(i).copied().unwrap_or(0), pb.get(i).copied().unwrap_or(0));
        match x.cmp(&y) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

fn os_matches(os: &OsActivation, ctx: &ActivationContext) -> bool {
    let check = |expected: &str, actual: &str| -> bool {
        match expected.strip_prefix('!') {
            Some(negated) => !actual.eq_ignore_ascii_case(negated),
            None => actual.eq_ignore_ascii_case(expected),
        }
    };
    if let Some(name) = &os.name {
        if !check(name, ctx.os_name()) {
            return false;
        }
    }
    if let Some(family) = &os.family {
        if !check(family, ctx.os_family()) {
            return false;
        }
    }
    if let Some(arch) = &os.arch {
        if !check(arch, ctx.os_arch()) {
            return false;
        }
    }
    if let Some(version) = &os.version {
        if !check(version, ctx.property("os.version").unwrap_or("")) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PropertyActivation;

    fn profile(id: &str, activation: Option<Activation>) -> Profile {
        Profile {
            id: id.into(),
            activation,
            ..Default::default()
        }
    }

    fn ctx_with(props: &[(&str, &str)]) -> BTreeMap<String, String> {
        props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn default_profile_yields_to_triggered_one() {
        let profiles = vec![
            profile(
                "fallback",
                Some(Activation {
                    active_by_default: true,
                    ..Default::default()
                }),
            ),
            profile(
                "ci",
                Some(Activation {
                    property: Some(PropertyActivation {
                        name: "env.CI".into(),
                        value: None,
                    }),
                    ..Default::default()
                }),
            ),
        ];
        let empty = BTreeMap::new();
        let system = ctx_with(&[("env.CI", "true")]);
        let ctx = ActivationContext::new(&[], &[], &system, &empty, None);
        let active = select_active(&profiles, &ctx);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "ci");

        let ctx = ActivationContext::new(&[], &[], &empty, &empty, None);
        let active = select_active(&profiles, &ctx);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "fallback");
    }

    #[test]
    fn explicit_deactivation_wins() {
        let profiles = vec![profile("p", None)];
        let empty = BTreeMap::new();
        let active_ids = vec!["p".to_string()];
        let inactive_ids = vec!["p".to_string()];
        let ctx = ActivationContext::new(&active_ids, &inactive_ids, &empty, &empty, None);
        assert!(select_active(&profiles, &ctx).is_empty());
    }

    #[test]
    fn negated_property_predicate() {
        let profiles = vec![profile(
            "offline",
            Some(Activation {
                property: Some(PropertyActivation {
                    name: "!online".into(),
                    value: None,
                }),
                ..Default::default()
            }),
        )];
        let empty = BTreeMap::new();
        let ctx = ActivationContext::new(&[], &[], &empty, &empty, None);
        assert_eq!(select_active(&profiles, &ctx).len(), 1);

        let system = ctx_with(&[("online", "1")]);
        let ctx = ActivationContext::new(&[], &[], &system, &empty, None);
        assert!(select_active(&profiles, &ctx).is_empty());
    }

    #[test]
    fn jdk_range_activation() {
        assert!(jdk_matches("[1.8,11)", "9.0.1"));
        assert!(!jdk_matches("[1.8,11)", "11"));
        assert!(jdk_matches("17", "17.0.2"));
        assert!(jdk_matches("!17", "11.0.1"));
    }
}
