//! Kill command - terminate whatever owns the given ports.

use anyhow::Result;
use clap::Args;
use portterminator_core::{Options, PortTerminator, SystemAdapter};

use super::{load_options, Globals, PortSelection};
use crate::output;

#[derive(Args, Debug, Default)]
pub struct KillArgs {
    #[command(flatten)]
    pub selection: PortSelection,

    /// Force kill (SIGKILL) without graceful shutdown
    #[arg(short, long)]
    pub force: bool,

    /// Milliseconds to wait after the graceful request before forcing
    #[arg(short, long, value_name = "MS")]
    pub graceful_timeout: Option<u64>,

    /// Milliseconds to wait for each port to become free
    #[arg(short, long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Show what would be killed without killing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

impl KillArgs {
    /// Flags override the persisted defaults.
    fn apply(&self, mut options: Options) -> Options {
        if let Some(protocol) = self.selection.method {
            options = options.with_protocol(protocol);
        }
        if self.force {
            options = options.with_force(true);
        }
        if let Some(ms) = self.graceful_timeout {
            options = options.with_graceful_timeout_ms(ms);
        }
        if let Some(ms) = self.timeout {
            options = options.with_overall_timeout_ms(ms);
        }
        options
    }
}

pub async fn run(args: KillArgs, globals: &Globals) -> Result<bool> {
    let ports = args.selection.resolve()?;
    let options = args.apply(load_options(globals).await?);
    let terminator = PortTerminator::system(options)?;

    if args.dry_run {
        return dry_run(&terminator, &ports, globals).await;
    }

    let results = terminator.terminate_with_details(&ports).await;

    if globals.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        output::print_results(&results, globals.quiet);
    }

    if results.iter().any(|r| r.is_permission_denied()) {
        output::permission_hint();
    }
    Ok(results.iter().all(|r| r.success))
}

async fn dry_run(
    terminator: &PortTerminator<SystemAdapter>,
    ports: &[u16],
    globals: &Globals,
) -> Result<bool> {
    let options = terminator.options();
    let found = terminator
        .finder()
        .try_find_by_ports(ports, options.protocol)
        .await;

    if globals.json {
        let report = output::lookup_report(ports, &found);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(found.values().all(|r| r.is_ok()));
    }

    let mode = if options.force { "force kill" } else { "terminate" };
    let mut ok = true;
    for port in ports {
        match &found[port] {
            Ok(processes) if processes.is_empty() => {
                println!("Port {}: nothing to kill", port);
            }
            Ok(processes) => {
                for process in processes {
                    println!("Port {}: would {} {}", port, mode, process);
                }
            }
            Err(e) => {
                ok = false;
                eprintln!("Port {}: {}", port, e);
            }
        }
    }
    Ok(ok)
}
