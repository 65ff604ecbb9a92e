//! Subcommands and the flag plumbing they share.

pub mod config;
pub mod kill;
pub mod list;
pub mod wait;

use anyhow::{bail, Result};
use clap::Args;
use portterminator_core::{
    parse_port_args, validate_port_range, ConfigStore, Options, ProtocolFilter,
    DEFAULT_MAX_RANGE_SIZE,
};
use tracing::warn;

pub use config::ConfigArgs;
pub use kill::KillArgs;
pub use list::ListArgs;
pub use wait::WaitArgs;

/// Flags every subcommand sees.
pub struct Globals {
    pub quiet: bool,
    pub json: bool,
}

/// Port selection shared by `kill` and `list`.
#[derive(Args, Debug, Default)]
pub struct PortSelection {
    /// Ports: 3000, 3000-3005 or 3000,8080
    #[arg(value_name = "PORTS")]
    pub ports: Vec<String>,

    /// Inclusive port range, e.g. 3000-3010
    #[arg(long, value_name = "START-END")]
    pub range: Option<String>,

    /// Protocol to match: tcp, udp or both
    #[arg(short, long, value_name = "PROTOCOL")]
    pub method: Option<ProtocolFilter>,
}

impl PortSelection {
    /// All requested ports, validated and deduplicated in order.
    pub fn resolve(&self) -> Result<Vec<u16>> {
        let mut ports = parse_port_args(&self.ports, DEFAULT_MAX_RANGE_SIZE)?;
        if let Some(range) = &self.range {
            for port in validate_port_range(range, DEFAULT_MAX_RANGE_SIZE)? {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }

        if ports.is_empty() {
            bail!("No ports given. Try `portterminator 3000` or `portterminator --range 3000-3005`");
        }
        Ok(ports)
    }
}

/// Load persisted defaults, falling back to built-ins when there is no home directory.
pub async fn load_options(globals: &Globals) -> Result<Options> {
    let options = match ConfigStore::new() {
        Ok(store) => store.load().await?,
        Err(e) => {
            warn!(error = %e, "Config unavailable, using defaults");
            Options::default()
        }
    };
    let quiet = globals.quiet || options.quiet;
    Ok(options.with_quiet(quiet))
}
