use std::fs;
use std::path::Path;

use kiln_model::Coordinate;
use kiln_reactor::{MakeBehavior, ReactorSession, Variant, assemble};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn session(root: &TempDir) -> ReactorSession {
    ReactorSession::new(root.path().join("kiln.xml"))
}

fn sorted_ids(graph: &kiln_reactor::ProjectGraph) -> Vec<String> {
    graph
        .sorted_projects()
        .iter()
        .map(|n| n.coordinate.to_string())
        .collect()
}

fn linear_workspace() -> TempDir {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId>
          <version>1.0</version><packaging>pom</packaging>
          <modules><module>b</module><module>c</module></modules>
        </project>"#,
    );
    write(
        &root.path().join("b/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version>
          <dependencies>
            <dependency><groupId>com.x</groupId><artifactId>c</artifactId><version>1.0</version></dependency>
          </dependencies>
        </project>"#,
    );
    write(
        &root.path().join("c/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>c</artifactId><version>1.0</version>
        </project>"#,
    );
    root
}

#[test]
fn linear_aggregation_sorts_dependencies_first() {
    let root = linear_workspace();
    let outcome = assemble(&session(&root));
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    let graph = outcome.value().unwrap();
    assert_eq!(sorted_ids(graph), vec!["com.x:c", "com.x:b", "com.x:root"]);
    assert!(
        graph
            .sorted_projects()
            .iter()
            .all(|n| n.variant == Variant::Source)
    );
}

#[test]
fn all_mode_covers_exactly_the_source_index() {
    let root = linear_workspace();
    let outcome = assemble(&session(&root));
    let graph_outcome = outcome;
    let graph = graph_outcome.value().unwrap();
    let mut ids = sorted_ids(graph);
    ids.sort();
    assert_eq!(ids, vec!["com.x:b", "com.x:c", "com.x:root"]);
}

#[test]
fn sorted_order_is_topological() {
    let root = linear_workspace();
    let outcome = assemble(&session(&root));
    let graph = outcome.value().unwrap();
    let order = sorted_ids(graph);
    for node in graph.sorted_projects() {
        let own = order
            .iter()
            .position(|id| *id == node.coordinate.to_string())
            .unwrap();
        for reference in node.references() {
            if let Some(pos) = order.iter().position(|id| *id == reference.to_string()) {
                assert!(pos < own, "{} must precede {}", reference, node.coordinate);
            }
        }
    }
}

#[test]
fn assembling_twice_is_idempotent() {
    let root = linear_workspace();
    let s = session(&root);
    let first = assemble(&s);
    let second = assemble(&s);
    assert_eq!(
        sorted_ids(first.value().unwrap()),
        sorted_ids(second.value().unwrap())
    );
}

#[test]
fn dependency_cycle_is_a_single_fatal() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId>
          <version>1.0</version><packaging>pom</packaging>
          <modules><module>a</module><module>b</module></modules>
        </project>"#,
    );
    write(
        &root.path().join("a/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>a</artifactId><version>1.0</version>
          <dependencies>
            <dependency><groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version></dependency>
          </dependencies>
        </project>"#,
    );
    write(
        &root.path().join("b/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version>
          <dependencies>
            <dependency><groupId>com.x</groupId><artifactId>a</artifactId><version>1.0</version></dependency>
          </dependencies>
        </project>"#,
    );

    let outcome = assemble(&session(&root));
    assert!(outcome.is_error());
    let cycles: Vec<_> = outcome
        .problems()
        .iter()
        .filter(|p| p.message.contains("Project dependency cycle detected"))
        .collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].message.contains("com.x:a"));
    assert!(cycles[0].message.contains("com.x:b"));
}

#[test]
fn upstream_selection_builds_the_needed_subset() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId>
          <version>1.0</version><packaging>pom</packaging>
          <modules><module>a</module><module>b</module><module>c</module><module>d</module></modules>
        </project>"#,
    );
    write(
        &root.path().join("a/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>a</artifactId><version>1.0</version>
          <dependencies>
            <dependency><groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version></dependency>
          </dependencies>
        </project>"#,
    );
    write(
        &root.path().join("b/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version>
          <dependencies>
            <dependency><groupId>com.x</groupId><artifactId>c</artifactId><version>1.0</version></dependency>
          </dependencies>
        </project>"#,
    );
    write(
        &root.path().join("c/kiln.xml"),
        r#"<project><groupId>com.x</groupId><artifactId>c</artifactId><version>1.0</version></project>"#,
    );
    write(
        &root.path().join("d/kiln.xml"),
        r#"<project><groupId>com.x</groupId><artifactId>d</artifactId><version>1.0</version></project>"#,
    );

    let mut s = session(&root);
    s.selected_projects = vec![":b".to_string()];
    s.make_behavior = Some(MakeBehavior::Upstream);
    let outcome = assemble(&s);
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    assert_eq!(sorted_ids(outcome.value().unwrap()), vec!["com.x:c", "com.x:b"]);
}

#[test]
fn duplicate_identifiers_abort_with_one_fatal() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId>
          <version>1.0</version><packaging>pom</packaging>
          <modules><module>b</module><module>c</module></modules>
        </project>"#,
    );
    for module in ["b", "c"] {
        write(
            &root.path().join(module).join("kiln.xml"),
            r#"<project><groupId>com.x</groupId><artifactId>same</artifactId><version>1.0</version></project>"#,
        );
    }

    let outcome = assemble(&session(&root));
    assert!(outcome.is_error());
    assert!(outcome.value().is_none());
    let duplicates: Vec<_> = outcome
        .problems()
        .iter()
        .filter(|p| p.message.contains("Duplicate project identifiers"))
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert!(duplicates[0].message.contains("com.x:same"));
}

#[test]
fn import_chain_resolves_managed_versions_transitively() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId>
          <version>1.0</version><packaging>pom</packaging>
          <modules><module>a</module><module>b</module><module>c</module></modules>
        </project>"#,
    );
    write(
        &root.path().join("c/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>c</artifactId><version>1.0</version><packaging>pom</packaging>
          <dependencyManagement>
            <dependencies>
              <dependency><groupId>x</groupId><artifactId>y</artifactId><version>1.0</version></dependency>
            </dependencies>
          </dependencyManagement>
        </project>"#,
    );
    write(
        &root.path().join("b/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version><packaging>pom</packaging>
          <dependencyManagement>
            <dependencies>
              <dependency>
                <groupId>com.x</groupId><artifactId>c</artifactId><version>1.0</version>
                <type>pom</type><scope>import</scope>
              </dependency>
            </dependencies>
          </dependencyManagement>
        </project>"#,
    );
    write(
        &root.path().join("a/kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>a</artifactId><version>1.0</version>
          <dependencyManagement>
            <dependencies>
              <dependency>
                <groupId>com.x</groupId><artifactId>b</artifactId><version>1.0</version>
                <type>pom</type><scope>import</scope>
              </dependency>
            </dependencies>
          </dependencyManagement>
          <dependencies>
            <dependency><groupId>x</groupId><artifactId>y</artifactId></dependency>
          </dependencies>
        </project>"#,
    );

    let outcome = assemble(&session(&root));
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    let graph = outcome.value().unwrap();

    let a = graph.get(&Coordinate::new("com.x", "a")).unwrap();
    let dep = a
        .descriptor
        .dependencies
        .iter()
        .find(|d| d.artifact_id == "y")
        .unwrap();
    assert_eq!(dep.version.as_deref(), Some("1.0"));
    assert_eq!(a.imports, vec![Coordinate::new("com.x", "b")]);

    let b = graph.get(&Coordinate::new("com.x", "b")).unwrap();
    assert_eq!(b.imports, vec![Coordinate::new("com.x", "c")]);

    // Imports are edges: c precedes b precedes a.
    let order = sorted_ids(graph);
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("com.x:c") < pos("com.x:b"));
    assert!(pos("com.x:b") < pos("com.x:a"));
}

#[test]
fn lineage_inherits_management_and_interpolates() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId>
          <version>1.0</version><packaging>pom</packaging>
          <modules><module>child</module></modules>
          <properties><libver>2.0</libver></properties>
          <dependencyManagement>
            <dependencies>
              <dependency><groupId>x</groupId><artifactId>y</artifactId><version>${libver}</version></dependency>
            </dependencies>
          </dependencyManagement>
        </project>"#,
    );
    write(
        &root.path().join("child/kiln.xml"),
        r#"<project>
          <artifactId>child</artifactId>
          <parent><groupId>com.x</groupId><artifactId>root</artifactId><version>1.0</version></parent>
          <dependencies>
            <dependency><groupId>x</groupId><artifactId>y</artifactId></dependency>
          </dependencies>
        </project>"#,
    );

    let outcome = assemble(&session(&root));
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    let graph = outcome.value().unwrap();
    assert_eq!(sorted_ids(graph), vec!["com.x:root", "com.x:child"]);

    let child = graph.get(&Coordinate::new("com.x", "child")).unwrap();
    assert_eq!(child.parent, Some(Coordinate::new("com.x", "root")));
    assert_eq!(child.descriptor.version.as_deref(), Some("1.0"));
    let dep = &child.descriptor.dependencies[0];
    assert_eq!(dep.version.as_deref(), Some("2.0"));
    assert_eq!(dep.scope.as_deref(), Some("compile"));

    assert_eq!(
        graph
            .downstream_projects(&Coordinate::new("com.x", "root"), true)
            .iter()
            .map(|n| n.coordinate.to_string())
            .collect::<Vec<_>>(),
        vec!["com.x:child"]
    );
    assert_eq!(
        graph
            .upstream_projects(&Coordinate::new("com.x", "child"), false)
            .iter()
            .map(|n| n.coordinate.to_string())
            .collect::<Vec<_>>(),
        vec!["com.x:root"]
    );
}

#[test]
fn profile_overlay_applies_when_property_is_set() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <groupId>com.x</groupId><artifactId>root</artifactId><version>1.0</version>
          <profiles>
            <profile>
              <id>extra</id>
              <activation><property><name>with.extra</name></property></activation>
              <dependencies>
                <dependency><groupId>x</groupId><artifactId>z</artifactId><version>3.0</version></dependency>
              </dependencies>
            </profile>
          </profiles>
        </project>"#,
    );

    let mut s = session(&root);
    s.user_properties
        .insert("with.extra".to_string(), "1".to_string());
    let outcome = assemble(&s);
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    let graph = outcome.value().unwrap();
    let node = graph.get(&Coordinate::new("com.x", "root")).unwrap();
    assert!(node.descriptor.dependencies.iter().any(|d| d.artifact_id == "z"));
    assert_eq!(node.descriptor.active_profiles, vec!["extra"]);

    let plain = assemble(&session(&root));
    let graph = plain.value().unwrap();
    let node = graph.get(&Coordinate::new("com.x", "root")).unwrap();
    assert!(node.descriptor.dependencies.is_empty());
}

#[test]
fn unresolvable_external_parent_is_fatal_but_memoized() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        r#"<project>
          <artifactId>orphan</artifactId>
          <parent><groupId>ext</groupId><artifactId>gone</artifactId><version>9</version></parent>
        </project>"#,
    );

    let outcome = assemble(&session(&root));
    assert!(outcome.is_error());
    assert!(
        outcome
            .problems()
            .iter()
            .any(|p| p.message.contains("Non-resolvable parent descriptor"))
    );
}
