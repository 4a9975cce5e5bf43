use crate::commands::graph::GraphArgs;
use crate::commands::modules::ModulesArgs;
use crate::commands::{graph, modules};
use clap::{Parser, Subcommand};
use std::env;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Reactor planner for multi-module kiln workspaces", version, author)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble the reactor graph and print the build order
    Graph(Box<GraphArgs>),

    /// Walk the aggregation tree and list the discovered descriptors
    Modules(Box<ModulesArgs>),
}

pub fn run() -> anyhow::Result<()> {
    let os_args = env::args_os();
    let all_args = argfile::expand_args_from(os_args, argfile::parse_fromfile, argfile::PREFIX)?;
    let cli = Cli::parse_from(all_args);

    match cli.command {
        Commands::Graph(args) => graph::execute(*args),
        Commands::Modules(args) => modules::execute(*args),
    }
}
