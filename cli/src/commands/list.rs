//! List command - show the processes on the given ports.

use anyhow::Result;
use clap::Args;
use portterminator_core::PortTerminator;

use super::{load_options, Globals, PortSelection};
use crate::output;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub selection: PortSelection,
}

pub async fn run(args: ListArgs, globals: &Globals) -> Result<bool> {
    let ports = args.selection.resolve()?;
    let mut options = load_options(globals).await?;
    if let Some(protocol) = args.selection.method {
        options = options.with_protocol(protocol);
    }

    let terminator = PortTerminator::system(options)?;
    let found = terminator
        .finder()
        .try_find_by_ports(&ports, terminator.options().protocol)
        .await;

    if globals.json {
        let report = output::lookup_report(&ports, &found);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut rows = Vec::new();
        for port in &ports {
            match &found[port] {
                Ok(processes) => rows.extend(processes.iter()),
                Err(e) => eprintln!("Port {}: {}", port, e),
            }
        }
        output::print_process_table(&rows);
    }

    if found
        .values()
        .any(|r| r.as_ref().is_err_and(|e| e.is_permission_denied()))
    {
        output::permission_hint();
    }
    Ok(found.values().all(|r| r.is_ok()))
}
