use clap::Parser;

/// CLI flags layered on top of the environment-sourced config (spec.md
/// §4.1): anything left blank here falls through to `HOST`/`PORT`/env
/// defaults read by `gpool_core::config::ConfigLoader`.
#[derive(Parser)]
#[command(name = "gpool")]
pub(crate) struct Cli {
    #[arg(long, default_value = "")]
    pub(crate) dsn: String,
    #[arg(long, default_value = "")]
    pub(crate) data_dir: String,
    #[arg(long, default_value = "")]
    pub(crate) host: String,
    #[arg(long)]
    pub(crate) port: Option<u16>,
}
