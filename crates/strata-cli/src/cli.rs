use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "strata", about = "Inspect and convert Strata mesh files", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Session configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the mesh tree of a file with its attributes
    Inspect(InspectArgs),
    /// Read a file with one backend and write it with another
    Convert(ConvertArgs),
    /// Write a small example series
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct InspectArgs {
    pub file: PathBuf,
    /// Omit attributes
    #[arg(long)]
    pub brief: bool,
}

#[derive(Args)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Args)]
pub struct DemoArgs {
    pub output: PathBuf,
}
