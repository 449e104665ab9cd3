//! Command-line surface of the `harvester` binary.

use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[command(
    name = "harvester",
    about = "Folder scan and upload agent, split into a daemon and GUI clients",
    version
)]
pub struct HarvesterArgs {
    #[command(flatten)]
    pub mode: ModeArgs,

    /// Log filter, e.g. "debug" or "harvester=trace"
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Cache server address
    #[arg(long, default_value = harvester_bus::DEFAULT_ADDR)]
    pub cache_addr: String,

    /// Delay between poll iterations, in milliseconds
    #[arg(long, default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Settings snapshot (TOML) used for submitted refresh jobs
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Submit a refresh job right after connecting (client mode)
    #[arg(long)]
    pub refresh: bool,
}

/// Mutually exclusive process modes.
#[derive(clap::Args, Debug)]
#[group(multiple = false)]
pub struct ModeArgs {
    /// Run the background daemon responsible for folder scans and uploads
    #[arg(short, long)]
    pub daemon: bool,

    /// Connect to a running daemon and observe its progress
    #[arg(short, long)]
    pub client: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn daemon_and_client_are_mutually_exclusive() {
        assert!(HarvesterArgs::try_parse_from(["harvester", "--daemon", "--client"]).is_err());
        let args = HarvesterArgs::try_parse_from(["harvester", "--daemon"]).unwrap();
        assert!(args.mode.daemon);
        assert!(!args.mode.client);
    }

    #[test]
    fn defaults() {
        let args = HarvesterArgs::try_parse_from(["harvester", "--client"]).unwrap();
        assert_eq!(args.log_level, "info");
        assert_eq!(args.cache_addr, "127.0.0.1:11211");
        assert_eq!(args.poll_interval_ms, 250);
        assert!(!args.refresh);
    }
}
