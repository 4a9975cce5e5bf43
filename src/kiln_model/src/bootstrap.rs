use crate::descriptor::{Descriptor, Repository};

/// Hands out the bootstrap descriptor every parent chain terminates on.
pub trait SuperDescriptorProvider {
    fn super_descriptor(&self, version: Option<&str>) -> Descriptor;
}

/// Built-in provider. The super-descriptor contributes the default
/// repository and base properties; it carries no coordinate so nothing of it
/// leaks into a child's identity.
pub struct BuiltinSuperProvider;

impl SuperDescriptorProvider for BuiltinSuperProvider {
    fn super_descriptor(&self, _version: Option<&str>) -> Descriptor {
        super_descriptor()
    }
}

pub fn super_descriptor() -> Descriptor {
    let mut descriptor = Descriptor {
        artifact_id: "kiln-super".to_string(),
        repositories: vec![Repository {
            id: "central".to_string(),
            url: "https://repo.kiln.build/releases".to_string(),
        }],
        ..Default::default()
    };
    descriptor
        .properties
        .insert("project.build.sourceEncoding".to_string(), "UTF-8".to_string());
    descriptor
}
