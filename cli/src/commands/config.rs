//! Config command - inspect or create the defaults file.

use anyhow::Result;
use clap::{Args, Subcommand};
use portterminator_core::ConfigStore;

use super::Globals;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective defaults (default)
    Show,
    /// Print the config file location
    Path,
    /// Write the built-in defaults if no config file exists
    Init,
}

pub async fn run(args: ConfigArgs, globals: &Globals) -> Result<bool> {
    let store = ConfigStore::new()?;

    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let options = store.load().await?;
            if globals.json {
                println!("{}", serde_json::to_string_pretty(&options)?);
            } else {
                println!("Config file: {}", store.path().display());
                if !store.exists() {
                    println!("(not created yet, showing built-in defaults)");
                }
                println!();
                println!("  protocol:           {}", options.protocol);
                println!("  force:              {}", options.force);
                println!("  graceful timeout:   {}ms", options.graceful_timeout_ms);
                println!("  overall timeout:    {}ms", options.overall_timeout_ms);
                println!("  command timeout:    {}ms", options.command_timeout_ms);
                println!("  quiet:              {}", options.quiet);
            }
        }
        ConfigAction::Path => println!("{}", store.path().display()),
        ConfigAction::Init => {
            if store.init().await? {
                println!("Wrote defaults to {}", store.path().display());
            } else {
                println!("Config already exists at {}", store.path().display());
            }
        }
    }
    Ok(true)
}
