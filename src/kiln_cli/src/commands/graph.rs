use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use log::debug;
use serde::Serialize;

use kiln_model::{Coordinate, Problem, ValidationLevel};
use kiln_reactor::{
    MakeBehavior, ProjectGraph, ProjectNode, ReactorSession, Variant, assemble,
    default_system_properties,
};

#[derive(Args)]
pub struct GraphArgs {
    /// Root descriptor file
    #[arg(short = 'f', long = "file", default_value = "kiln.xml")]
    pub file: PathBuf,

    /// Directory project selectors are resolved against; defaults to the
    /// root descriptor's directory
    #[arg(short = 'C', long = "directory")]
    pub directory: Option<PathBuf>,

    /// Project selectors: groupId:artifactId, :artifactId, or a path
    #[arg(short = 'p', long = "projects", value_delimiter = ',')]
    pub projects: Vec<String>,

    /// Also build the projects the selection builds on (also-make)
    #[arg(long = "also-make")]
    pub also_make: bool,

    /// Also build the projects depending on the selection
    #[arg(long = "also-make-dependents")]
    pub also_make_dependents: bool,

    /// Profiles to activate; prefix an id with '!' to deactivate it
    #[arg(short = 'P', long = "profiles", value_delimiter = ',')]
    pub profiles: Vec<String>,

    /// User properties as key=value
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    #[arg(long = "validation", value_enum, default_value = "strict")]
    pub validation: ValidationArg,

    /// Local repository holding installed binary descriptors
    #[arg(long = "binary-repo")]
    pub binary_repo: Option<PathBuf>,

    /// Print the graph as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the transitive upstream closure of one project instead
    #[arg(long = "upstream-of", value_name = "GROUP:ARTIFACT")]
    pub upstream_of: Option<String>,

    /// Print the transitive downstream closure of one project instead
    #[arg(long = "downstream-of", value_name = "GROUP:ARTIFACT")]
    pub downstream_of: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ValidationArg {
    Minimal,
    V20,
    Strict,
}

impl From<ValidationArg> for ValidationLevel {
    fn from(arg: ValidationArg) -> Self {
        match arg {
            ValidationArg::Minimal => ValidationLevel::Minimal,
            ValidationArg::V20 => ValidationLevel::V20,
            ValidationArg::Strict => ValidationLevel::Strict,
        }
    }
}

#[derive(Serialize)]
struct GraphReport<'a> {
    problems: &'a [Problem],
    projects: Vec<&'a ProjectNode>,
}

pub fn execute(args: GraphArgs) -> Result<()> {
    let mut session = ReactorSession::new(args.file.clone());
    if let Some(directory) = args.directory {
        session.base_directory = directory;
    }
    session.selected_projects = args.projects;
    session.make_behavior = match (args.also_make, args.also_make_dependents) {
        (true, true) => Some(MakeBehavior::Both),
        (true, false) => Some(MakeBehavior::Upstream),
        (false, true) => Some(MakeBehavior::Downstream),
        (false, false) => None,
    };
    for profile in args.profiles {
        match profile.strip_prefix('!') {
            Some(id) => session.inactive_profile_ids.push(id.to_string()),
            None => session.active_profile_ids.push(profile),
        }
    }
    session.system_properties = default_system_properties();
    for define in args.defines {
        match define.split_once('=') {
            Some((key, value)) => {
                session.user_properties.insert(key.into(), value.into());
            }
            None => {
                session.user_properties.insert(define, String::new());
            }
        }
    }
    session.validation_level = args.validation.into();
    session.repository = args.binary_repo;

    let outcome = assemble(&session);
    let failed = outcome.is_error();
    let (graph, problems) = outcome.into_parts();
    for problem in &problems {
        eprintln!("{}", problem);
    }
    let graph = match graph {
        Some(graph) if !failed => graph,
        _ => bail!("reactor graph could not be assembled"),
    };
    debug!("assembled {} project(s)", graph.len());

    if let Some(spec) = &args.upstream_of {
        return print_closure(&graph, spec, true);
    }
    if let Some(spec) = &args.downstream_of {
        return print_closure(&graph, spec, false);
    }

    if args.json {
        let report = GraphReport {
            problems: &problems,
            projects: graph.sorted_projects(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Reactor build order:");
        for node in graph.sorted_projects() {
            println!("  {} ({})", node.coordinate, variant_label(node.variant));
        }
    }
    Ok(())
}

fn print_closure(graph: &ProjectGraph, spec: &str, upstream: bool) -> Result<()> {
    let Some((group, artifact)) = spec.split_once(':') else {
        bail!("expected GROUP:ARTIFACT, got '{}'", spec);
    };
    let coord = Coordinate::new(group, artifact);
    if !graph.contains(&coord) {
        bail!("project {} is not part of the graph", coord);
    }
    let closure = if upstream {
        graph.upstream_projects(&coord, true)
    } else {
        graph.downstream_projects(&coord, true)
    };
    for node in closure {
        println!("{}", node.coordinate);
    }
    Ok(())
}

fn variant_label(variant: Variant) -> &'static str {
    match variant {
        Variant::Source => "source",
        Variant::Binary => "binary",
    }
}
