//! PortTerminator CLI - Terminate processes on network ports
//!
//! A command-line tool for finding and killing the processes that
//! hold TCP/UDP ports, with graceful shutdown before a forced kill.

mod commands;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{ConfigArgs, Globals, KillArgs, ListArgs, WaitArgs};

#[derive(Parser)]
#[command(name = "portterminator")]
#[command(author, version, about = "Terminate processes listening on network ports")]
#[command(propagate_version = true, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Ports to clear when no subcommand is given
    #[command(flatten)]
    kill: KillArgs,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Kill the processes on one or more ports (default)
    #[command(alias = "k")]
    Kill(KillArgs),

    /// Show the processes on one or more ports
    #[command(alias = "ls")]
    List(ListArgs),

    /// Wait until a port is free (or busy)
    Wait(WaitArgs),

    /// Show or create the defaults file
    Config(ConfigArgs),
}

fn init_tracing(quiet: bool, verbose: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let globals = Globals {
        quiet: cli.quiet,
        json: cli.json,
    };

    let outcome = match cli.command {
        Some(Commands::Kill(args)) => commands::kill::run(args, &globals).await,
        Some(Commands::List(args)) => commands::list::run(args, &globals).await,
        Some(Commands::Wait(args)) => commands::wait::run(args, &globals).await,
        Some(Commands::Config(args)) => commands::config::run(args, &globals).await,
        None => commands::kill::run(cli.kill, &globals).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            output::report_error(&e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use portterminator_core::ProtocolFilter;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bare_ports_mean_kill() {
        let cli =
            Cli::try_parse_from(["portterminator", "3000", "8080", "-f", "-m", "TCP"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.kill.selection.ports, vec!["3000", "8080"]);
        assert!(cli.kill.force);
        assert_eq!(cli.kill.selection.method, Some(ProtocolFilter::Tcp));
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["portterminator", "ls", "--range", "3000-3005", "--json"])
            .unwrap();
        match cli.command {
            Some(Commands::List(args)) => {
                assert_eq!(args.selection.range.as_deref(), Some("3000-3005"));
            }
            _ => panic!("expected list"),
        }
        assert!(cli.json);

        let cli = Cli::try_parse_from(["portterminator", "wait", "5432", "--busy", "-t", "500"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Wait(WaitArgs { busy: true, timeout: Some(500), .. }))
        ));

        assert!(Cli::try_parse_from(["portterminator", "k", "3000", "-m", "sctp"]).is_err());
        assert!(Cli::try_parse_from(["portterminator", "-q", "-v", "3000"]).is_err());
    }
}
