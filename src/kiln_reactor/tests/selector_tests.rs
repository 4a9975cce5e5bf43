use std::fs;
use std::path::Path;

use kiln_model::reader::DefaultLocator;
use kiln_reactor::{DescriptorLoader, WorkspaceIndex, index};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn descriptor(group: &str, artifact: &str, modules: &[&str]) -> String {
    let items: String = modules
        .iter()
        .map(|m| format!("<module>{}</module>", m))
        .collect();
    format!(
        "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>1.0</version><modules>{}</modules></project>",
        group, artifact, items
    )
}

fn workspace() -> (TempDir, WorkspaceIndex) {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        &descriptor("com.x", "root", &["app", "lib"]),
    );
    write(&root.path().join("app/kiln.xml"), &descriptor("com.x", "app", &[]));
    write(&root.path().join("lib/kiln.xml"), &descriptor("com.y", "lib", &[]));
    let loaded = DescriptorLoader::new(&DefaultLocator)
        .load(&root.path().join("kiln.xml"))
        .into_value()
        .unwrap();
    let index = WorkspaceIndex::build(loaded).into_value().unwrap();
    (root, index)
}

#[test]
fn coordinate_selector_matches_exactly() {
    let (root, idx) = workspace();
    let selected = index::select(&idx, &["com.x:app".to_string()], root.path())
        .into_value()
        .unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].to_string(), "com.x:app");
}

#[test]
fn artifact_selector_matches_any_group() {
    let (root, idx) = workspace();
    let selected = index::select(&idx, &[":lib".to_string()], root.path())
        .into_value()
        .unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].to_string(), "com.y:lib");
}

#[test]
fn path_selectors_match_file_and_directory() {
    let (root, idx) = workspace();
    let by_file = index::select(&idx, &["app/kiln.xml".to_string()], root.path())
        .into_value()
        .unwrap();
    assert_eq!(by_file[0].to_string(), "com.x:app");

    let by_dir = index::select(&idx, &["lib".to_string()], root.path())
        .into_value()
        .unwrap();
    assert_eq!(by_dir[0].to_string(), "com.y:lib");
}

#[test]
fn selector_order_wins_and_duplicates_collapse() {
    let (root, idx) = workspace();
    let selected = index::select(
        &idx,
        &[":lib".to_string(), "com.x:app".to_string(), "lib".to_string()],
        root.path(),
    )
    .into_value()
    .unwrap();
    let ids: Vec<String> = selected.iter().map(ToString::to_string).collect();
    assert_eq!(ids, vec!["com.y:lib", "com.x:app"]);
}

#[test]
fn nonexistent_path_selector_is_fatal() {
    let (root, idx) = workspace();
    let outcome = index::select(&idx, &["no/such/dir".to_string()], root.path());
    assert!(outcome.is_error());
    assert!(outcome.problems()[0].message.contains("Invalid project selector"));
}

#[test]
fn unmatched_selector_is_fatal() {
    let (root, idx) = workspace();
    let outcome = index::select(&idx, &["com.x:ghost".to_string()], root.path());
    assert!(outcome.is_error());
    assert!(
        outcome.problems()[0]
            .message
            .contains("Could not find the selected project")
    );
}

#[test]
fn duplicate_coordinates_fail_the_index() {
    let root = TempDir::new().unwrap();
    write(
        &root.path().join("kiln.xml"),
        &descriptor("com.x", "root", &["m1", "m2"]),
    );
    write(&root.path().join("m1/kiln.xml"), &descriptor("com.x", "same", &[]));
    write(&root.path().join("m2/kiln.xml"), &descriptor("com.x", "same", &[]));
    let loaded = DescriptorLoader::new(&DefaultLocator)
        .load(&root.path().join("kiln.xml"))
        .into_value()
        .unwrap();
    let outcome = WorkspaceIndex::build(loaded);
    assert!(outcome.is_error());
    assert!(outcome.value().is_none(), "no partial index on duplicates");
    let duplicates: Vec<_> = outcome
        .problems()
        .iter()
        .filter(|p| p.message.contains("Duplicate project identifiers"))
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert!(duplicates[0].message.contains("com.x:same"));
}
