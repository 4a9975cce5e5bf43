use std::collections::BTreeMap;

use crate::descriptor::Descriptor;
use crate::outcome::Problem;

/// Fixed-point expansion of `${...}` expressions across a descriptor.
///
/// Lookup precedence, strongest first: user properties, system properties,
/// `project.*` built-ins, the descriptor's own properties. Unresolvable
/// expressions stay verbatim; expression cycles produce an `ERROR`.
///
/// The coordinate is never interpolated: it must stay derivable from the raw
/// descriptor.
pub fn interpolate(
    descriptor: &mut Descriptor,
    system_properties: &BTreeMap<String, String>,
    user_properties: &BTreeMap<String, String>,
) -> Vec<Problem> {
    let mut problems = Vec::new();
    let hint = descriptor.source_hint();
    let builtins = project_builtins(descriptor);

    // Resolve the property map first; everything else then expands against
    // literal values.
    let raw_properties = descriptor.properties.clone();
    let ctx = Ctx {
        user: user_properties,
        system: system_properties,
        builtins: &builtins,
        own: &raw_properties,
        hint: &hint,
    };
    let mut resolved = BTreeMap::new();
    for (key, value) in &raw_properties {
        let mut stack = vec![key.clone()];
        resolved.insert(key.clone(), expand(value, &ctx, &mut stack, &mut problems));
    }
    descriptor.properties = resolved.clone();

    let ctx = Ctx {
        user: user_properties,
        system: system_properties,
        builtins: &builtins,
        own: &resolved,
        hint: &hint,
    };
    let mut one = |value: &mut String| {
        let mut stack = Vec::new();
        *value = expand(value, &ctx, &mut stack, &mut problems);
    };

    if let Some(v) = descriptor.version.as_mut() {
        one(v);
    }
    if let Some(v) = descriptor.packaging.as_mut() {
        one(v);
    }
    if let Some(v) = descriptor.name.as_mut() {
        one(v);
    }
    if let Some(v) = descriptor.url.as_mut() {
        one(v);
        *v = normalize_url(v);
    }
    if let Some(parent) = descriptor.parent.as_mut() {
        one(&mut parent.version);
    }
    for module in &mut descriptor.modules {
        one(module);
    }
    for dep in descriptor
        .dependencies
        .iter_mut()
        .chain(&mut descriptor.dependency_management)
    {
        one(&mut dep.group_id);
        one(&mut dep.artifact_id);
        if let Some(v) = dep.version.as_mut() {
            one(v);
        }
        if let Some(v) = dep.scope.as_mut() {
            one(v);
        }
    }
    for plugin in &mut descriptor.plugins {
        if let Some(v) = plugin.group_id.as_mut() {
            one(v);
        }
        one(&mut plugin.artifact_id);
        if let Some(v) = plugin.version.as_mut() {
            one(v);
        }
        for value in plugin.configuration.values_mut() {
            one(value);
        }
    }
    for repo in &mut descriptor.repositories {
        one(&mut repo.id);
        one(&mut repo.url);
        repo.url = normalize_url(&repo.url);
    }

    problems
}

struct Ctx<'a> {
    user: &'a BTreeMap<String, String>,
    system: &'a BTreeMap<String, String>,
    builtins: &'a BTreeMap<String, String>,
    own: &'a BTreeMap<String, String>,
    hint: &'a str,
}

fn project_builtins(d: &Descriptor) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(g) = &d.group_id {
        map.insert("project.groupId".to_string(), g.clone());
    }
    map.insert("project.artifactId".to_string(), d.artifact_id.clone());
    if let Some(v) = &d.version {
        map.insert("project.version".to_string(), v.clone());
    }
    if let Some(dir) = d.base_dir() {
        let dir = dir.display().to_string();
        map.insert("project.basedir".to_string(), dir.clone());
        map.insert("basedir".to_string(), dir);
    }
    map
}

/// Expand every `${key}` in `value`. `stack` carries the chain of property
/// keys currently being resolved, for cycle detection.
fn expand(value: &str, ctx: &Ctx, stack: &mut Vec<String>, problems: &mut Vec<Problem>) -> String {
    let mut out = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match resolve_key(key, ctx, stack, problems) {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated expression, keep it literally.
                out.push_str(rest);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_key(
    key: &str,
    ctx: &Ctx,
    stack: &mut Vec<String>,
    problems: &mut Vec<Problem>,
) -> Option<String> {
    if let Some(value) = ctx.user.get(key).or_else(|| ctx.system.get(key)) {
        return Some(value.clone());
    }
    if let Some(value) = ctx.builtins.get(key) {
        return Some(value.clone());
    }
    let value = ctx.own.get(key)?;
    if stack.iter().any(|k| k == key) {
        let mut chain = stack.join(" -> ");
        chain.push_str(" -> ");
        chain.push_str(key);
        problems.push(
            Problem::error(format!("Cyclic expression ${{{}}} detected: {}", key, chain))
                .with_source(ctx.hint.to_string()),
        );
        return None;
    }
    stack.push(key.to_string());
    let expanded = expand(value, ctx, stack, problems);
    stack.pop();
    Some(expanded)
}

/// Trim redundant trailing slashes off a URL, keeping the scheme separator
/// intact.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with(':') || trimmed.is_empty() {
        url.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn chained_expansion() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            version: Some("${release}".into()),
            ..Default::default()
        };
        d.properties = props(&[("release", "${major}.1"), ("major", "2")]);
        let problems = interpolate(&mut d, &BTreeMap::new(), &BTreeMap::new());
        assert!(problems.is_empty());
        assert_eq!(d.version.as_deref(), Some("2.1"));
    }

    #[test]
    fn user_properties_beat_system_and_own() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            name: Some("${flavor}".into()),
            ..Default::default()
        };
        d.properties = props(&[("flavor", "own")]);
        let system = props(&[("flavor", "system")]);
        let user = props(&[("flavor", "user")]);
        interpolate(&mut d, &system, &user);
        assert_eq!(d.name.as_deref(), Some("user"));
    }

    #[test]
    fn cycle_is_reported_and_left_verbatim() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            ..Default::default()
        };
        d.properties = props(&[("a", "${b}"), ("b", "${a}")]);
        let problems = interpolate(&mut d, &BTreeMap::new(), &BTreeMap::new());
        assert!(problems.iter().any(|p| p.message.contains("Cyclic expression")));
    }

    #[test]
    fn unresolved_expression_stays() {
        let mut d = Descriptor {
            artifact_id: "a".into(),
            name: Some("${who.knows}".into()),
            ..Default::default()
        };
        let problems = interpolate(&mut d, &BTreeMap::new(), &BTreeMap::new());
        assert!(problems.is_empty());
        assert_eq!(d.name.as_deref(), Some("${who.knows}"));
    }
}
