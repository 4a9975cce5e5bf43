use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use thiserror::Error;

use crate::descriptor::{
    Activation, Dependency, Descriptor, FileActivation, OsActivation, ParentRef, Plugin, Profile,
    PropertyActivation, Repository,
};
use crate::outcome::{Outcome, Problem};
use crate::validate::{self, ValidationLevel};

/// Default descriptor file name looked up inside module directories.
pub const DESCRIPTOR_FILE: &str = "kiln.xml";

/// A descriptor document plus the place it came from, if any.
#[derive(Debug, Clone)]
pub struct DescriptorSource {
    pub path: Option<PathBuf>,
    pub content: String,
}

impl DescriptorSource {
    pub fn from_file(path: &Path) -> Result<Self, ReadError> {
        let content = fs::read_to_string(path).map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            content,
        })
    }

    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            path: None,
            content: content.into(),
        }
    }
}

pub trait DescriptorParser {
    fn parse(&self, source: &DescriptorSource, level: ValidationLevel) -> Outcome<Descriptor>;
}

/// Finds the descriptor file inside a module directory.
pub trait DescriptorLocator {
    fn locate(&self, dir: &Path) -> Option<PathBuf>;
}

pub struct DefaultLocator;

impl DescriptorLocator for DefaultLocator {
    fn locate(&self, dir: &Path) -> Option<PathBuf> {
        let candidate = dir.join(DESCRIPTOR_FILE);
        candidate.is_file().then_some(candidate)
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("expected a <project> document root")]
    MissingRoot,
}

/// Event-driven reader for `kiln.xml` descriptors.
pub struct XmlDescriptorReader;

impl XmlDescriptorReader {
    pub fn read_file(path: &Path, level: ValidationLevel) -> Outcome<Descriptor> {
        match DescriptorSource::from_file(path) {
            Ok(source) => Self::read_source(&source, level),
            Err(e) => Outcome::failure(vec![
                Problem::fatal(format!("Failed to read descriptor {}", path.display()))
                    .with_source(path.display().to_string())
                    .with_cause(e.to_string()),
            ]),
        }
    }

    pub fn read_str(content: &str, path: Option<&Path>, level: ValidationLevel) -> Outcome<Descriptor> {
        let source = DescriptorSource {
            path: path.map(Path::to_path_buf),
            content: content.to_string(),
        };
        Self::read_source(&source, level)
    }

    pub fn read_source(source: &DescriptorSource, level: ValidationLevel) -> Outcome<Descriptor> {
        let hint = source
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        match parse_document(&source.content) {
            Ok(parsed) => {
                let mut descriptor = parsed.descriptor;
                descriptor.source_path = source.path.clone();
                let mut problems = Vec::new();
                if level != ValidationLevel::Minimal {
                    for tag in parsed.unknown {
                        problems.push(
                            Problem::warning(format!("Unrecognized descriptor element <{}>", tag))
                                .with_source(hint.clone()),
                        );
                    }
                }
                problems.extend(validate::validate_raw(&descriptor, level));
                if problems.iter().any(|p| p.severity.is_error()) {
                    Outcome::failure_with(descriptor, problems)
                } else {
                    Outcome::success_with(descriptor, problems)
                }
            }
            Err(e) => Outcome::failure(vec![
                Problem::fatal(format!("Failed to parse descriptor {}", hint))
                    .with_source(hint.clone())
                    .with_cause(e.to_string()),
            ]),
        }
    }
}

impl DescriptorParser for XmlDescriptorReader {
    fn parse(&self, source: &DescriptorSource, level: ValidationLevel) -> Outcome<Descriptor> {
        Self::read_source(source, level)
    }
}

struct Parsed {
    descriptor: Descriptor,
    unknown: Vec<String>,
}

fn parse_document(content: &str) -> Result<Parsed, ReadError> {
    let mut reader = XmlReader::from_str(content);
    reader.config_mut().trim_text(true);
    loop {
        match read(&mut reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"project" {
                    return parse_project(&mut reader);
                }
                return Err(ReadError::MissingRoot);
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"project" {
                    return Ok(Parsed {
                        descriptor: Descriptor::default(),
                        unknown: Vec::new(),
                    });
                }
                return Err(ReadError::MissingRoot);
            }
            Event::Eof => return Err(ReadError::MissingRoot),
            _ => {}
        }
    }
}

fn read<'a>(reader: &mut XmlReader<&'a [u8]>) -> Result<Event<'a>, ReadError> {
    reader.read_event().map_err(|e| ReadError::Xml {
        position: reader.buffer_position() as u64,
        message: e.to_string(),
    })
}

/// Text content of the element whose `Start` was just consumed; stops at the
/// matching end tag, tolerating (and flattening) stray nested markup.
fn element_text(reader: &mut XmlReader<&[u8]>) -> Result<String, ReadError> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match read(reader)? {
            Event::Text(t) => {
                let cow = t.unescape().map_err(|e| ReadError::Xml {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })?;
                text.push_str(&cow);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(c.as_ref())),
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}

fn skip_element(reader: &mut XmlReader<&[u8]>) -> Result<(), ReadError> {
    let mut depth = 0usize;
    loop {
        match read(reader)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn parse_project(reader: &mut XmlReader<&[u8]>) -> Result<Parsed, ReadError> {
    let mut d = Descriptor::default();
    let mut unknown = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"groupId" => d.group_id = non_empty(element_text(reader)?),
                b"artifactId" => d.artifact_id = element_text(reader)?,
                b"version" => d.version = non_empty(element_text(reader)?),
                b"packaging" => d.packaging = non_empty(element_text(reader)?),
                b"name" => d.name = non_empty(element_text(reader)?),
                b"url" => d.url = non_empty(element_text(reader)?),
                b"parent" => d.parent = Some(parse_parent(reader)?),
                b"modules" => d.modules = parse_string_list(reader, b"module")?,
                b"properties" => d.properties = parse_property_map(reader)?,
                b"dependencies" => d.dependencies = parse_dependencies(reader)?,
                b"dependencyManagement" => {
                    d.dependency_management = parse_dependency_management(reader)?
                }
                b"build" => d.plugins = parse_build(reader)?,
                b"repositories" => d.repositories = parse_repositories(reader)?,
                b"profiles" => d.profiles = parse_profiles(reader)?,
                other => {
                    unknown.push(String::from_utf8_lossy(other).into_owned());
                    skip_element(reader)?;
                }
            },
            Event::Empty(e) => {
                // An empty scalar element contributes nothing.
                let local = e.local_name();
                if !is_known_project_element(local.as_ref()) {
                    unknown.push(String::from_utf8_lossy(local.as_ref()).into_owned());
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(Parsed {
        descriptor: d,
        unknown,
    })
}

fn is_known_project_element(name: &[u8]) -> bool {
    matches!(
        name,
        b"groupId"
            | b"artifactId"
            | b"version"
            | b"packaging"
            | b"name"
            | b"url"
            | b"parent"
            | b"modules"
            | b"properties"
            | b"dependencies"
            | b"dependencyManagement"
            | b"build"
            | b"repositories"
            | b"profiles"
    )
}

fn parse_parent(reader: &mut XmlReader<&[u8]>) -> Result<ParentRef, ReadError> {
    let mut group_id = String::new();
    let mut artifact_id = String::new();
    let mut version = String::new();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"groupId" => group_id = element_text(reader)?,
                b"artifactId" => artifact_id = element_text(reader)?,
                b"version" => version = element_text(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(ParentRef {
        group_id,
        artifact_id,
        version,
    })
}

fn parse_string_list(reader: &mut XmlReader<&[u8]>, item: &[u8]) -> Result<Vec<String>, ReadError> {
    let mut items = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == item {
                    items.push(element_text(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(items)
}

/// Free-form key/value elements, used by `<properties>` and plugin
/// `<configuration>` blocks.
fn parse_property_map(
    reader: &mut XmlReader<&[u8]>,
) -> Result<BTreeMap<String, String>, ReadError> {
    let mut map = BTreeMap::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                let key = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                map.insert(key, element_text(reader)?);
            }
            Event::Empty(e) => {
                let key = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                map.insert(key, String::new());
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(map)
}

fn parse_dependencies(reader: &mut XmlReader<&[u8]>) -> Result<Vec<Dependency>, ReadError> {
    let mut deps = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"dependency" {
                    deps.push(parse_dependency(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(deps)
}

fn parse_dependency(reader: &mut XmlReader<&[u8]>) -> Result<Dependency, ReadError> {
    let mut dep = Dependency::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"groupId" => dep.group_id = element_text(reader)?,
                b"artifactId" => dep.artifact_id = element_text(reader)?,
                b"version" => dep.version = non_empty(element_text(reader)?),
                b"type" => dep.dep_type = non_empty(element_text(reader)?),
                b"scope" => dep.scope = non_empty(element_text(reader)?),
                b"optional" => dep.optional = element_text(reader)? == "true",
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(dep)
}

fn parse_dependency_management(
    reader: &mut XmlReader<&[u8]>,
) -> Result<Vec<Dependency>, ReadError> {
    let mut deps = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"dependencies" {
                    deps = parse_dependencies(reader)?;
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(deps)
}

fn parse_build(reader: &mut XmlReader<&[u8]>) -> Result<Vec<Plugin>, ReadError> {
    let mut plugins = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"plugins" {
                    plugins = parse_plugins(reader)?;
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(plugins)
}

fn parse_plugins(reader: &mut XmlReader<&[u8]>) -> Result<Vec<Plugin>, ReadError> {
    let mut plugins = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"plugin" {
                    plugins.push(parse_plugin(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(plugins)
}

fn parse_plugin(reader: &mut XmlReader<&[u8]>) -> Result<Plugin, ReadError> {
    let mut plugin = Plugin::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"groupId" => plugin.group_id = non_empty(element_text(reader)?),
                b"artifactId" => plugin.artifact_id = element_text(reader)?,
                b"version" => plugin.version = non_empty(element_text(reader)?),
                b"configuration" => plugin.configuration = parse_property_map(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(plugin)
}

fn parse_repositories(reader: &mut XmlReader<&[u8]>) -> Result<Vec<Repository>, ReadError> {
    let mut repos = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"repository" {
                    repos.push(parse_repository(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(repos)
}

fn parse_repository(reader: &mut XmlReader<&[u8]>) -> Result<Repository, ReadError> {
    let mut repo = Repository::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"id" => repo.id = element_text(reader)?,
                b"url" => repo.url = element_text(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(repo)
}

fn parse_profiles(reader: &mut XmlReader<&[u8]>) -> Result<Vec<Profile>, ReadError> {
    let mut profiles = Vec::new();
    loop {
        match read(reader)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"profile" {
                    profiles.push(parse_profile(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(profiles)
}

fn parse_profile(reader: &mut XmlReader<&[u8]>) -> Result<Profile, ReadError> {
    let mut profile = Profile::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"id" => profile.id = element_text(reader)?,
                b"activation" => profile.activation = Some(parse_activation(reader)?),
                b"properties" => profile.overlay.properties = parse_property_map(reader)?,
                b"dependencies" => profile.overlay.dependencies = parse_dependencies(reader)?,
                b"dependencyManagement" => {
                    profile.overlay.dependency_management = parse_dependency_management(reader)?
                }
                b"build" => profile.overlay.plugins = parse_build(reader)?,
                b"repositories" => profile.overlay.repositories = parse_repositories(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(profile)
}

fn parse_activation(reader: &mut XmlReader<&[u8]>) -> Result<Activation, ReadError> {
    let mut activation = Activation::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"activeByDefault" => {
                    activation.active_by_default = element_text(reader)? == "true"
                }
                b"jdk" => activation.jdk = non_empty(element_text(reader)?),
                b"property" => activation.property = Some(parse_property_activation(reader)?),
                b"file" => activation.file = Some(parse_file_activation(reader)?),
                b"os" => activation.os = Some(parse_os_activation(reader)?),
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(activation)
}

fn parse_property_activation(
    reader: &mut XmlReader<&[u8]>,
) -> Result<PropertyActivation, ReadError> {
    let mut property = PropertyActivation::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => property.name = element_text(reader)?,
                b"value" => property.value = non_empty(element_text(reader)?),
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(property)
}

fn parse_file_activation(reader: &mut XmlReader<&[u8]>) -> Result<FileActivation, ReadError> {
    let mut file = FileActivation::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"exists" => file.exists = non_empty(element_text(reader)?),
                b"missing" => file.missing = non_empty(element_text(reader)?),
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(file)
}

fn parse_os_activation(reader: &mut XmlReader<&[u8]>) -> Result<OsActivation, ReadError> {
    let mut os = OsActivation::default();
    loop {
        match read(reader)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => os.name = non_empty(element_text(reader)?),
                b"family" => os.family = non_empty(element_text(reader)?),
                b"arch" => os.arch = non_empty(element_text(reader)?),
                b"version" => os.version = non_empty(element_text(reader)?),
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ReadError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(os)
}
