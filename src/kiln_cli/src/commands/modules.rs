use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;

use kiln_model::reader::DefaultLocator;
use kiln_reactor::DescriptorLoader;

#[derive(Args)]
pub struct ModulesArgs {
    /// Root descriptor file
    #[arg(short = 'f', long = "file", default_value = "kiln.xml")]
    pub file: PathBuf,

    /// Print the module list as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ModuleEntry {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

pub fn execute(args: ModulesArgs) -> Result<()> {
    let loader = DescriptorLoader::new(&DefaultLocator);
    let outcome = loader.load(&args.file);
    let failed = outcome.is_error();
    let (descriptors, problems) = outcome.into_parts();
    for problem in &problems {
        eprintln!("{}", problem);
    }
    let descriptors = descriptors.unwrap_or_default();

    if args.json {
        let entries: Vec<ModuleEntry> = descriptors
            .iter()
            .map(|d| ModuleEntry {
                id: d.display_id(),
                path: d.source_path.clone(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for descriptor in &descriptors {
            match &descriptor.source_path {
                Some(path) => println!("{} ({})", descriptor.display_id(), path.display()),
                None => println!("{}", descriptor.display_id()),
            }
        }
    }
    if failed {
        bail!("module discovery reported errors");
    }
    Ok(())
}
