/*!
`server.rs`

Implements `ollamanager server <add|list|use|remove|current|ping>`.

Every subcommand runs under the registry lock: lock -> load -> (mutate -> save).
`ping` lets go of the lock once the current server is resolved.
Registry failures (duplicate name, unknown server, protected default, ...) are
reported to the user and turn into exit code 1; they never change the file.

JSON output (`--json`) always carries a `status` field:
{
  "status": "ok",
  "current": "default",
  "servers": [ { "name": "default", "address": "127.0.0.1:11434", "current": true } ]
}
{
  "status": "error",
  "error": "Server with name 'gpu' not found"
}
*/

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::process::ExitCode;
use std::time::Instant;

use crate::cmd::format::{Role, StyleOptions, color, emoji, status_line, table};
use crate::probe::{LivenessChecker, PingResult};
use crate::registry::{Endpoint, Registry, RegistryStore};

/// CLI arguments for `ollamanager server ...`
#[derive(Args, Debug)]
#[command(arg_required_else_help = true)]
pub struct ServerArgs {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ServerCommand {
    /// Add a new server (port 11434 is assumed when omitted)
    Add { name: String, address: String },
    /// List available servers (current one marked with *)
    List,
    /// Switch to a different server
    Use { name: String },
    /// Remove a server
    Remove { name: String },
    /// Show the current server
    Current,
    /// Check whether the current server responds
    Ping,
}

/// Entry point for the server subcommand.
pub fn execute_server(args: ServerArgs, store: &RegistryStore) -> Result<ExitCode> {
    let mut lock = Some(store.lock().context("Failed to lock server registry")?);
    let state = store.load().context("Failed to load server registry")?;
    let mut registry = Registry::new(store, state);
    let out = Output::new(args.json);

    match args.command {
        ServerCommand::Add { name, address } => match registry.add(&name, &address) {
            Ok(ep) => out.ok(
                serde_json::json!({ "status": "ok", "added": endpoint_json(&ep) }),
                format!("Added server '{}' ({})", ep.name, ep.address),
            ),
            Err(e) => out.fail(e.into()),
        },
        ServerCommand::List => {
            out.list(&registry);
            Ok(ExitCode::SUCCESS)
        }
        ServerCommand::Use { name } => match registry.use_endpoint(&name) {
            Ok(ep) => out.ok(
                serde_json::json!({ "status": "ok", "current": endpoint_json(&ep) }),
                format!("Now using server '{}' ({})", ep.name, ep.address),
            ),
            Err(e) => out.fail(e.into()),
        },
        ServerCommand::Remove { name } => match registry.remove(&name) {
            Ok(()) => out.ok(
                serde_json::json!({
                    "status": "ok",
                    "removed": name,
                    "current": registry.state().active_name,
                }),
                format!("Removed server '{name}'"),
            ),
            Err(e) => out.fail(e.into()),
        },
        ServerCommand::Current => match registry.active() {
            Some(ep) => {
                if out.json {
                    println!(
                        "{}",
                        serde_json::json!({ "status": "ok", "current": endpoint_json(ep) })
                    );
                } else {
                    println!(
                        "Current server: {} ({})",
                        color(Role::Primary, &ep.name, &out.style),
                        ep.address
                    );
                }
                Ok(ExitCode::SUCCESS)
            }
            None => out.no_current(),
        },
        ServerCommand::Ping => {
            let active = registry.active().cloned();
            // Read-only from here; release before the network call.
            drop(lock.take());
            match active {
                Some(ep) => ping(&out, &ep),
                None => out.no_current(),
            }
        }
    }
}

fn ping(out: &Output, ep: &Endpoint) -> Result<ExitCode> {
    let checker = LivenessChecker::new()?;
    let started = Instant::now();
    let result = checker.ping(ep)?;
    let elapsed_ms = started.elapsed().as_millis();

    if out.json {
        let mut report = serde_json::json!({
            "status": "ok",
            "server": ep.name,
            "address": ep.address,
            "reachable": result.is_reachable(),
            "elapsed_ms": elapsed_ms,
        });
        if let serde_json::Value::Object(ref mut map) = report {
            match &result {
                PingResult::Reachable => {}
                PingResult::Unreachable(cause) => {
                    map.insert("error".into(), cause.clone().into());
                }
                PingResult::RespondedWithError { status, body } => {
                    map.insert("http_status".into(), (*status).into());
                    map.insert("body".into(), body.clone().into());
                }
            }
        }
        println!("{report}");
    } else {
        let style = &out.style;
        match &result {
            PingResult::Reachable => println!(
                "{} {}",
                status_line(
                    "success",
                    Role::Success,
                    format!("Server {} is reachable", ep.address),
                    style
                ),
                color(Role::Dim, format!("({elapsed_ms} ms)"), style)
            ),
            PingResult::Unreachable(cause) => println!(
                "{}",
                status_line(
                    "error",
                    Role::Error,
                    format!("Error pinging server {}: {cause}", ep.address),
                    style
                )
            ),
            PingResult::RespondedWithError { status, body } => println!(
                "{}",
                status_line(
                    "warn",
                    Role::Warning,
                    format!("Server {} returned status: {status} ({body})", ep.address),
                    style
                )
            ),
        }
    }

    Ok(if result.is_reachable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn endpoint_json(ep: &Endpoint) -> serde_json::Value {
    serde_json::json!({ "name": ep.name, "address": ep.address })
}

/// Rows for the list table: marker, name, address.
fn list_rows(registry: &Registry<'_>) -> Vec<Vec<String>> {
    registry
        .list()
        .iter()
        .map(|ep| {
            let mark = if registry.is_active(&ep.name) { "*" } else { " " };
            vec![mark.to_string(), ep.name.clone(), ep.address.clone()]
        })
        .collect()
}

/// Output mode shared by the subcommands.
struct Output {
    json: bool,
    style: StyleOptions,
}

impl Output {
    fn new(json: bool) -> Self {
        let style = if json {
            StyleOptions::plain()
        } else {
            StyleOptions::detect()
        };
        Self { json, style }
    }

    fn ok(&self, body: serde_json::Value, human: String) -> Result<ExitCode> {
        if self.json {
            println!("{body}");
        } else {
            println!("{}", status_line("success", Role::Success, human, &self.style));
        }
        Ok(ExitCode::SUCCESS)
    }

    fn fail(&self, err: anyhow::Error) -> Result<ExitCode> {
        let msg = format!("{err:#}");
        if self.json {
            println!("{}", serde_json::json!({ "status": "error", "error": msg }));
        } else {
            eprintln!("{}", status_line("error", Role::Error, msg, &self.style));
        }
        Ok(ExitCode::FAILURE)
    }

    fn no_current(&self) -> Result<ExitCode> {
        self.fail(anyhow::anyhow!("No current server selected"))
    }

    fn list(&self, registry: &Registry<'_>) {
        if self.json {
            let servers: Vec<_> = registry
                .list()
                .iter()
                .map(|ep| {
                    serde_json::json!({
                        "name": ep.name,
                        "address": ep.address,
                        "current": registry.is_active(&ep.name),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "status": "ok",
                    "current": registry.state().active_name,
                    "count": servers.len(),
                    "servers": servers,
                })
            );
            return;
        }

        let style = &self.style;
        let title = format!("Available Ollama servers ({}):", registry.list().len());
        let icon = emoji("server", style);
        if icon.is_empty() {
            println!("{}", color(Role::Bold, title, style));
        } else {
            println!("{icon} {}", color(Role::Bold, title, style));
        }
        println!(
            "{}",
            table(&["", "NAME", "ADDRESS"], &list_rows(registry), 0, style)
        );
    }
}
