//! REPL – interactive shell for driving a patrol agent.
//!
//! Supported slash-commands:
//!   /status                 – show the agent status
//!   /stop                   – submit an empty route
//!   /investigate x y [yaw]  – submit a single pose
//!   /patrol x,y x,y ...     – submit a patrol loop
//!   /submit <json>          – submit a raw route payload
//!   /events                 – toggle the live event echo
//!   /help                   – show this list
//!   /quit | /exit           – shut the agent down and exit

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use patrol_middleware::EventBus;
use patrol_runtime::PatrolDispatcher;
use patrol_types::{PatrolError, PatrolResponse, PatrolRoute, Pose};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::warn;

/// A parsed prompt line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Stop,
    Investigate { x: f64, y: f64, yaw: f64 },
    Patrol(Vec<(f64, f64)>),
    Submit(String),
    Events,
    Help,
    Quit,
}

impl Command {
    /// Parse one prompt line.  Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match head {
            "/status" => Command::Status,
            "/stop" => Command::Stop,
            "/investigate" => {
                let numbers = parse_numbers(rest.split_whitespace())?;
                match numbers.as_slice() {
                    [x, y] => Command::Investigate { x: *x, y: *y, yaw: 0.0 },
                    [x, y, yaw] => Command::Investigate { x: *x, y: *y, yaw: *yaw },
                    _ => return Err("usage: /investigate x y [yaw]".to_string()),
                }
            }
            "/patrol" => {
                let waypoints = rest
                    .split_whitespace()
                    .map(|pair| {
                        let (x, y) = pair
                            .split_once(',')
                            .ok_or_else(|| format!("'{pair}' is not an x,y pair"))?;
                        let xy = parse_numbers([x, y])?;
                        Ok((xy[0], xy[1]))
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                if waypoints.len() < 2 {
                    return Err("a patrol needs at least two waypoints: /patrol x,y x,y ...".to_string());
                }
                Command::Patrol(waypoints)
            }
            "/submit" if !rest.is_empty() => Command::Submit(rest.to_string()),
            "/submit" => return Err("usage: /submit <json>".to_string()),
            "/events" => Command::Events,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(Some(command))
    }

    /// The route this command submits, if it submits one.
    pub fn route(&self, frame_id: &str) -> Option<Result<PatrolRoute, PatrolError>> {
        match self {
            Command::Stop => Some(Ok(PatrolRoute::stop())),
            Command::Investigate { x, y, yaw } => {
                Some(Ok(vec![Pose::planar(frame_id, *x, *y, *yaw)].into()))
            }
            Command::Patrol(waypoints) => Some(Ok(waypoints
                .iter()
                .map(|(x, y)| Pose::planar(frame_id, *x, *y, 0.0))
                .collect::<Vec<_>>()
                .into())),
            Command::Submit(raw) => Some(PatrolRoute::from_json(raw)),
            _ => None,
        }
    }
}

fn parse_numbers<'a>(parts: impl IntoIterator<Item = &'a str>) -> Result<Vec<f64>, String> {
    parts
        .into_iter()
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not a number"))
        })
        .collect()
}

/// Run the prompt until `/quit`, end of input, or `shutdown` flips to true.
pub async fn run(
    dispatcher: PatrolDispatcher,
    bus: EventBus,
    frame_id: &str,
    mut shutdown: watch::Receiver<bool>,
) {
    let echo = Arc::new(AtomicBool::new(false));
    tokio::spawn(echo_events(bus, Arc::clone(&echo)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let _ = stdout.write_all(format!("{} ", "patrol>".bold().cyan()).as_bytes()).await;
        let _ = stdout.flush().await;

        let line = tokio::select! {
            line = lines.next_line() => line,
            Ok(_) = shutdown.wait_for(|stop| *stop) => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    e,
                    "/help".bold()
                );
                continue;
            }
        };

        match command {
            Command::Status => println!("  status: {}", dispatcher.status().to_string().yellow()),
            Command::Events => {
                let on = !echo.fetch_xor(true, Ordering::SeqCst);
                println!("  event echo {}", if on { "on".green() } else { "off".dimmed() });
            }
            Command::Help => cmd_help(),
            Command::Quit => break,
            submitting => match submitting.route(frame_id) {
                Some(Ok(route)) => submit(&dispatcher, route),
                Some(Err(e)) => println!("{} {}", "Rejected:".red(), e),
                None => {}
            },
        }
    }
}

/// Submit in the background so a long investigation does not block the
/// prompt; the outcome is printed when it arrives.
fn submit(dispatcher: &PatrolDispatcher, route: PatrolRoute) {
    let dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        match dispatcher.submit(route).await {
            Ok(response) => println!("\n  {}", describe(&response)),
            Err(e) => println!("\n  {} {}", "Rejected:".red(), e),
        }
    });
}

fn describe(response: &PatrolResponse) -> String {
    match response {
        PatrolResponse::Completed(outcome) => {
            format!("{} status {}", "✓ done –".green(), outcome.status.to_string().bold())
        }
        PatrolResponse::Superseded => "↷ superseded by a newer request".yellow().to_string(),
        PatrolResponse::Aborted(outcome) => format!(
            "{} status {}",
            "✗ target unreachable –".red(),
            outcome.status.to_string().bold()
        ),
    }
}

async fn echo_events(bus: EventBus, echo: Arc<AtomicBool>) {
    let mut rx = bus.subscribe_all();
    loop {
        match rx.recv().await {
            Ok(event) => {
                if !echo.load(Ordering::SeqCst) {
                    continue;
                }
                match serde_json::to_string(&event.payload) {
                    Ok(json) => println!("  {} {}", event.source.dimmed(), json),
                    Err(e) => warn!(error = %e, "event not printable"),
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event echo lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Patrol Commands".bold().underline());
    println!("  {}                  – show the agent status", "/status".bold().cyan());
    println!("  {}                    – stop and become available", "/stop".bold().cyan());
    println!("  {}  – drive to a pose and observe it", "/investigate x y [yaw]".bold().cyan());
    println!("  {}     – loop through waypoints", "/patrol x,y x,y ...".bold().cyan());
    println!("  {}          – submit a JSON route payload", "/submit <json>".bold().cyan());
    println!("  {}                  – toggle live event echo", "/events".bold().cyan());
    println!("  {}            – shut down and exit", "/quit  /exit".bold().cyan());
    println!();
}
