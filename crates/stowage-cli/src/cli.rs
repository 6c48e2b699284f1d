use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stowage",
    about = "Browse and edit object storage locations",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// How to reach the location the command works on.
#[derive(Args, Debug)]
pub struct LocationArgs {
    /// Kind name (`local`, `local-meta`, `memory`) or a URL whose scheme selects one
    #[arg(short, long, global = true, default_value = "local")]
    pub kind: String,

    /// TOML file of backend configuration
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Backend configuration as key=value; overrides the config file
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the registered kinds
    Kinds,
    /// List containers
    Containers(ListArgs),
    /// Create a container
    CreateContainer(ContainerArgs),
    /// Remove an empty container
    RemoveContainer(ContainerArgs),
    /// List the items of a container
    Ls(LsArgs),
    /// Store an item from a file or stdin
    Put(PutArgs),
    /// Write an item's content to a file or stdout
    Get(GetArgs),
    /// Show an item's attributes and metadata
    Stat(ItemArgs),
    /// Remove an item
    Rm(ItemArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// Resume from this cursor
    #[arg(long, default_value = "")]
    pub cursor: String,
    #[arg(short = 'n', long, default_value = "100")]
    pub count: usize,
    /// Follow cursors until the listing is exhausted
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct ContainerArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    pub container: String,
    #[command(flatten)]
    pub list: ListArgs,
}

#[derive(Args, Debug)]
pub struct ItemArgs {
    pub container: String,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    pub container: String,
    pub name: String,
    /// Source file; stdin when omitted
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Metadata entry as key=value (repeatable)
    #[arg(short, long)]
    pub meta: Vec<String>,
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub container: String,
    pub name: String,
    /// Destination file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Byte range START..END
    #[arg(long)]
    pub range: Option<String>,
}
