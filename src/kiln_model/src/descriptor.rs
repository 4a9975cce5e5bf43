use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Group used for plugins declared without an explicit groupId.
pub const DEFAULT_PLUGIN_GROUP: &str = "build.kiln.plugins";

/// Version-less workspace identifier of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
}

impl Coordinate {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}

/// Declared parent of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ParentRef {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.group_id.clone(), self.artifact_id.clone())
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Artifact type; `jar` once defaults are injected. Imports use `pom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dep_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl Dependency {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.group_id.clone(), self.artifact_id.clone())
    }

    /// Identity key used by inheritance and management merges.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.group_id,
            self.artifact_id,
            self.dep_type.as_deref().unwrap_or("jar")
        )
    }

    /// A `dependencyManagement` entry with type `pom` and scope `import`.
    pub fn is_import(&self) -> bool {
        self.dep_type.as_deref() == Some("pom") && self.scope.as_deref() == Some("import")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub artifact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, String>,
}

impl Plugin {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(
            self.group_id.as_deref().unwrap_or(DEFAULT_PLUGIN_GROUP),
            self.artifact_id.clone(),
        )
    }

    pub fn key(&self) -> String {
        self.coordinate().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub url: String,
}

/// Property predicate of a profile activation. A leading `!` on the name
/// inverts presence, a leading `!` on the value inverts equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyActivation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileActivation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsActivation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Activation predicate of a profile; all present conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    #[serde(default)]
    pub active_by_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jdk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<PropertyActivation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileActivation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsActivation>,
}

/// Partial descriptor merged in when the owning profile is active.
/// Modules are deliberately absent: the module set comes from raw
/// descriptors only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverlay {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_management: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(default)]
    pub overlay: ProfileOverlay,
}

/// A project descriptor. The same shape flows through every pipeline stage:
/// raw (as parsed), activated (profiles injected), interpolated (lineage
/// assembled, `${...}` expanded) and effective (management/defaults injected,
/// validated).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub artifact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packaging: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_management: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<Profile>,
    /// Profiles injected into this descriptor during activation, in
    /// injection order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_profiles: Vec<String>,
    /// File the descriptor was read from; absent for external and bootstrap
    /// descriptors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl Descriptor {
    /// Derive the coordinate without inheritance or interpolation: a missing
    /// groupId falls back to the declared parent's. `None` means the
    /// descriptor is invalid.
    pub fn coordinate(&self) -> Option<Coordinate> {
        if self.artifact_id.is_empty() {
            return None;
        }
        let group = match &self.group_id {
            Some(g) if !g.is_empty() => g.clone(),
            _ => match &self.parent {
                Some(p) if !p.group_id.is_empty() => p.group_id.clone(),
                _ => return None,
            },
        };
        Some(Coordinate::new(group, self.artifact_id.clone()))
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.source_path.as_deref().and_then(Path::parent)
    }

    /// Best-effort identifier for diagnostics.
    pub fn display_id(&self) -> String {
        match self.coordinate() {
            Some(c) => c.to_string(),
            None => self
                .source_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("?:{}", self.artifact_id)),
        }
    }

    /// Source hint used when attaching problems to this descriptor.
    pub fn source_hint(&self) -> String {
        self.source_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.display_id())
    }
}
