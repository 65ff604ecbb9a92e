//! Human and JSON rendering of results.

use std::collections::HashMap;

use portterminator_core::{Error, ProcessInfo, TerminationResult};
use serde::Serialize;

/// One port's lookup outcome, as printed by `list --json` and `kill --dry-run --json`.
#[derive(Serialize)]
pub struct PortLookup<'a> {
    port: u16,
    processes: &'a [ProcessInfo],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn lookup_report<'a>(
    ports: &[u16],
    found: &'a HashMap<u16, portterminator_core::Result<Vec<ProcessInfo>>>,
) -> Vec<PortLookup<'a>> {
    ports
        .iter()
        .filter_map(|port| found.get(port).map(|result| (*port, result)))
        .map(|(port, result)| match result {
            Ok(processes) => PortLookup {
                port,
                processes,
                error: None,
            },
            Err(e) => PortLookup {
                port,
                processes: &[],
                error: Some(e.to_string()),
            },
        })
        .collect()
}

pub fn print_results(results: &[TerminationResult], quiet: bool) {
    for result in results {
        if !result.success {
            let reason = result.error.as_deref().unwrap_or("port is still in use");
            eprintln!("Port {}: failed - {}", result.port, reason);
            continue;
        }
        if quiet {
            continue;
        }
        if result.processes.is_empty() {
            println!("Port {}: no processes found", result.port);
        }
        for process in &result.processes {
            println!("Port {}: terminated {}", result.port, process);
        }
    }

    if !quiet && results.len() > 1 {
        let cleared = results.iter().filter(|r| r.success).count();
        println!("\n{}/{} ports cleared", cleared, results.len());
    }
}

pub fn print_process_table(processes: &[&ProcessInfo]) {
    if processes.is_empty() {
        println!("No processes found.");
        return;
    }

    // Table header
    println!(
        "{:<6} {:<6} {:<8} {:<20} {:<12} COMMAND",
        "PORT", "PROTO", "PID", "PROCESS", "USER"
    );
    println!("{}", "-".repeat(80));

    for process in processes {
        println!(
            "{:<6} {:<6} {:<8} {:<20} {:<12} {}",
            process.port,
            process.protocol,
            process.pid,
            truncate(&process.name, 20),
            truncate(process.user.as_deref().unwrap_or("-"), 12),
            truncate(process.command.as_deref().unwrap_or("-"), 40)
        );
    }

    println!("\nTotal: {} processes", processes.len());
}

pub fn permission_hint() {
    if cfg!(windows) {
        eprintln!("Hint: some processes belong to another user. Try an Administrator prompt.");
    } else {
        eprintln!("Hint: some processes belong to another user. Try running with sudo.");
    }
}

pub fn report_error(error: &anyhow::Error) {
    eprintln!("Error: {:#}", error);
    if error
        .downcast_ref::<Error>()
        .is_some_and(Error::is_permission_denied)
    {
        permission_hint();
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 1).collect();
        format!("{}…", kept)
    }
}
