//! `patrol-cli` – interactive front end for the patrol agent.
//!
//! 1. Installs tracing (see `patrol_runtime::telemetry`).
//! 2. Loads `~/.patrol/config.toml`, writing defaults on first run.
//! 3. Spawns a [`PatrolAgent`] on a simulated navigator.
//! 4. Drops the operator into a REPL; Ctrl-C shuts the agent down cleanly.

mod config;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use patrol_runtime::PatrolAgent;
use tokio::sync::watch;
use tracing::{error, warn};

fn main() {
    // Keep the guard alive so pending spans are flushed at exit.
    let _guard = patrol_runtime::init_tracing("patrol");

    print_banner();
    let cfg = load_config();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_tx.send_replace(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not shut down cleanly");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg, shutdown_rx));
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_timeout(Duration::from_millis(200));
}

async fn run(cfg: config::Config, shutdown: watch::Receiver<bool>) {
    let agent = match PatrolAgent::spawn(cfg.runtime(), Arc::new(cfg.navigator())) {
        Ok(agent) => agent,
        Err(e) => {
            println!("{}: {}", "Cannot start agent".red(), e);
            return;
        }
    };

    println!(
        "  Agent {} is {}. Type {} for a list of commands.\n",
        cfg.agent_name.bold(),
        agent.dispatcher().status().to_string().green(),
        "/help".bold().cyan()
    );

    repl::run(agent.dispatcher(), agent.bus(), &cfg.frame_id, shutdown).await;

    agent.shutdown().await;
    println!("{}", "  ✓ Agent stopped. Goodbye.".green());
}

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___       __           __"#.bold().cyan());
    println!("{}", r#"  / _ \___ _/ /________  / /"#.bold().cyan());
    println!("{}", r#" / ___/ _ `/ __/ __/ _ \/ / "#.bold().cyan());
    println!("{}", r#"/_/   \_,_/\__/_/  \___/_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Patrol".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Investigate & patrol agent");
    println!();
}
