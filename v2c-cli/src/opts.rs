use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "v2c",
    version,
    about = "Lift and shift the contents of a virtual machine image into build materials for a container image"
)]
pub struct Opts {
    #[arg(short, long, global = true)]
    /// Enable debug output.
    pub debug: bool,
    #[arg(long, global = true)]
    /// Enable trace output.
    pub trace: bool,
    #[arg(long, global = true)]
    /// URI of the container engine, e.g. `unix:///var/run/docker.sock` or
    /// `tcp://127.0.0.1:2375`. Defaults to the local engine socket.
    pub runtime_uri: Option<String>,
    #[arg(short, long, global = true)]
    /// Path to the configuration file (default - "~/.config/.v2c.yml").
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Opts {
    pub fn from_args() -> Self {
        Self::parse()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transform a virtual disk into a container build context.
    Build(BuildOpts),
    /// Options for working with transformed images.
    Image {
        #[command(subcommand)]
        object: ImageCmd,
    },
    /// Options for working with detectives.
    Detective {
        #[command(subcommand)]
        object: DetectiveCmd,
    },
    /// Options for working with provisioners.
    Provisioner {
        #[command(subcommand)]
        object: ProvisionerCmd,
    },
}

#[derive(Debug, Parser)]
pub struct BuildOpts {
    /// Path to the virtual machine disk image to transform.
    pub path: PathBuf,
    #[arg(short = 't', long)]
    /// Tag the resulting image with `REPOSITORY[:TAG]`.
    pub tag: Option<String>,
    #[arg(long)]
    /// Leave the transport volume behind for inspection.
    pub no_cleanup: bool,
}

#[derive(Debug, Subcommand)]
pub enum ImageCmd {
    /// List the transformed images.
    List,
    /// Remove transformed images.
    Rm {
        #[arg(short, long)]
        /// Force removal of the images.
        force: bool,
        #[arg(long)]
        /// Do not delete untagged parent layers.
        no_prune: bool,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Export a transformed image.
    Export {
        #[arg(short, long)]
        /// Write to a file instead of stdout.
        output: Option<PathBuf>,
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum DetectiveCmd {
    /// List the installed detectives.
    List,
    /// Install a detective.
    Install { name: String },
}

#[derive(Debug, Subcommand)]
pub enum ProvisionerCmd {
    /// List the installed provisioners.
    List,
    /// Install a provisioner.
    Install { name: String },
}
