//! Command line arguments

use crate::tracing::{LogLevel, TracingFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "edgenode")]
#[command(about = "CDN edge node: local content cache with origin pull and image transforms")]
#[command(version)]
pub struct Cli {
    #[arg(
        short = 'c',
        long,
        env = "EDGENODE_CONFIG",
        default_value = "edgenode.toml",
        help = "Path to the TOML configuration file"
    )]
    pub config: PathBuf,

    #[arg(
        short = 'l',
        long,
        help = "Set logging level",
        default_value = "info",
        value_enum
    )]
    pub log_level: LogLevel,

    #[arg(long, help = "Log output format", default_value = "pretty", value_enum)]
    pub log_format: TracingFormat,

    #[arg(long, help = "Skip the warmup prefetch")]
    pub no_warmup: bool,
}
