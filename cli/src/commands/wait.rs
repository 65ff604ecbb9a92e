//! Wait command - block until a port is free or busy.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use portterminator_core::{validate_port, PortTerminator, ProtocolFilter};

use super::{load_options, Globals};

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Port to watch
    pub port: String,

    /// Wait for the port to become busy instead of free
    #[arg(long)]
    pub busy: bool,

    /// Milliseconds to wait before giving up
    #[arg(short, long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Protocol to match: tcp, udp or both
    #[arg(short, long, value_name = "PROTOCOL")]
    pub method: Option<ProtocolFilter>,
}

pub async fn run(args: WaitArgs, globals: &Globals) -> Result<bool> {
    let port = validate_port(&args.port)?;
    let mut options = load_options(globals).await?;
    if let Some(protocol) = args.method {
        options = options.with_protocol(protocol);
    }

    let timeout = args
        .timeout
        .map(Duration::from_millis)
        .unwrap_or_else(|| options.overall_timeout());
    let terminator = PortTerminator::system(options)?;

    let reached = if args.busy {
        terminator
            .finder()
            .wait_for_port_to_be_busy(port, timeout, terminator.options().protocol)
            .await
    } else {
        terminator.wait_for_port(port, Some(timeout)).await.is_ok()
    };

    let state = if args.busy { "busy" } else { "free" };
    if globals.json {
        let report = serde_json::json!({ "port": port, "state": state, "reached": reached });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if reached {
        if !globals.quiet {
            println!("Port {} is {}", port, state);
        }
    } else {
        eprintln!(
            "Timed out after {}ms waiting for port {} to be {}",
            timeout.as_millis(),
            port,
            state
        );
    }
    Ok(reached)
}
