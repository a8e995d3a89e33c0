//! Command-line configuration (ambient stack, SPEC_FULL §1 "Configuration
//! / CLI"). Expands §6's "single positional argument" with two optional
//! flags; behavior with no flags matches the spec exactly.
use clap::Parser;
use std::path::PathBuf;

/// Leech the bytes of a single-file torrent from its swarm and write them
/// to disk.
#[derive(Debug, Parser)]
#[command(name = "rstc", version, about)]
pub struct Args {
    /// Path to the `.torrent` metainfo file.
    pub torrent_path: PathBuf,

    /// Output file path. Defaults to the metainfo's `name` field in the
    /// current working directory (§6).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Port advertised to the tracker in the announce query (§4.C).
    #[arg(long, default_value_t = 6881)]
    pub port: u16,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
