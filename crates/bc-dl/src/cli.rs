use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::lifecycle::Mode;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "bc-dl", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Optional config file (TOML); defaults to config.toml next to the binary
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download releases into new album directories and tag them
    Download(ReleaseArgs),

    /// Tag audio files already at the library root and move them into album directories
    TagFiles(ReleaseArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ReleaseArgs {
    /// Music library root; albums land in <artist>/[<year>] <album>
    pub music_library_dir: PathBuf,

    /// Genre written to every track
    pub genre: String,

    /// Bandcamp album or track urls
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,
}

impl Command {
    pub fn mode(&self) -> Mode {
        match self {
            Command::Download(_) => Mode::Download,
            Command::TagFiles(_) => Mode::TagFiles,
        }
    }

    pub fn release_args(&self) -> &ReleaseArgs {
        match self {
            Command::Download(args) | Command::TagFiles(args) => args,
        }
    }
}
