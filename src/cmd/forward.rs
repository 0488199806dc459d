/*!
`forward.rs`

Pass-through of every command `ollamanager` does not handle itself, plus
`version`.

  ollamanager run llama3      -> OLLAMA_HOST=<current> ollama run llama3
  ollamanager version         -> own version, then `ollama --version` on <current>

Exit code: the child's own code; 127 when the downstream program cannot be started;
1 when no current server resolves.
*/

use anyhow::{Context, Result, bail};
use std::process::ExitCode;
use tracing::{debug, error, warn};

use crate::cmd::format::{Role, StyleOptions, status_line};
use crate::dispatch::{DispatchError, Dispatcher, LAUNCH_FAILURE_EXIT_CODE, Program};
use crate::registry::{Endpoint, Registry, RegistryStore};

/// Load the registry and resolve the current server.
///
/// Loading may repair the file, so the lock is held for the read and
/// released before anything is spawned.
fn current_endpoint(store: &RegistryStore) -> Result<Option<Endpoint>> {
    let _lock = store.lock().context("Failed to lock server registry")?;
    let state = store.load().context("Failed to load server registry")?;
    Ok(Registry::new(store, state).active().cloned())
}

fn report_no_current() -> ExitCode {
    let style = StyleOptions::detect();
    eprintln!(
        "{}",
        status_line("error", Role::Error, "No current server selected", &style)
    );
    ExitCode::FAILURE
}

/// Map a child exit code onto a process exit code.
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Forward `argv` (`<command> [args...]`) to the downstream program.
pub fn execute_forward(
    argv: Vec<String>,
    program: &str,
    store: &RegistryStore,
) -> Result<ExitCode> {
    let Some((command, args)) = argv.split_first() else {
        bail!("no command to forward");
    };
    let program = Program::parse(program)?;
    let Some(endpoint) = current_endpoint(store)? else {
        return Ok(report_no_current());
    };

    match Dispatcher::new(program).forward(command, args, &endpoint) {
        Ok(outcome) => {
            debug!(code = outcome.code(), "forwarded command finished");
            Ok(exit_code(outcome.code()))
        }
        Err(e @ DispatchError::LaunchFailure { .. }) => {
            error!("{e}");
            Ok(ExitCode::from(LAUNCH_FAILURE_EXIT_CODE))
        }
        Err(e) => Err(e.into()),
    }
}

/// Print the tool version, then ask the downstream program for its own.
pub fn execute_version(program: &str, store: &RegistryStore) -> Result<ExitCode> {
    println!("Ollamanager v{}", env!("CARGO_PKG_VERSION"));

    let Some(endpoint) = current_endpoint(store)? else {
        return Ok(ExitCode::SUCCESS);
    };
    let program = Program::parse(program)?;
    match Dispatcher::new(program).forward("--version", &[], &endpoint) {
        Ok(outcome) if !outcome.success() => {
            debug!(code = outcome.code(), "downstream version probe failed");
        }
        Ok(_) => {}
        Err(e) => warn!("{e}"),
    }
    Ok(ExitCode::SUCCESS)
}

/// Short overview shown when no command is given.
pub fn execute_overview(store: &RegistryStore) -> Result<ExitCode> {
    let current = current_endpoint(store)?
        .map(|ep| format!("{} ({})", ep.name, ep.address))
        .unwrap_or_else(|| "none".to_string());
    println!("{}", overview_text(&current));
    Ok(ExitCode::SUCCESS)
}

fn overview_text(current: &str) -> String {
    format!(
        "Ollamanager v{version} - {about}

Basic Commands:
  ollamanager run <model>              Run a model on current server
  ollamanager server list              List available servers
  ollamanager server use <name>        Switch to a different server

For more detailed help:
  ollamanager help                     Show detailed help
  ollamanager help server              Show server management commands

Current server: {current}",
        version = env!("CARGO_PKG_VERSION"),
        about = env!("CARGO_PKG_DESCRIPTION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryState;

    fn temp_store() -> (tempfile::TempDir, RegistryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::at(dir.path().join("config.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn exit_code_clamps_out_of_range() {
        // ExitCode has no accessor; compare through Debug.
        assert_eq!(format!("{:?}", exit_code(3)), format!("{:?}", ExitCode::from(3)));
        assert_eq!(format!("{:?}", exit_code(-1)), format!("{:?}", ExitCode::from(1)));
        assert_eq!(format!("{:?}", exit_code(300)), format!("{:?}", ExitCode::from(1)));
    }

    #[test]
    fn overview_mentions_current_server() {
        let text = overview_text("gpu (10.0.0.7:11434)");
        assert!(text.contains("Current server: gpu (10.0.0.7:11434)"));
        assert!(text.starts_with("Ollamanager v"));
    }

    #[test]
    fn current_endpoint_none_when_dangling() {
        let (_dir, store) = temp_store();
        store
            .save(&RegistryState {
                endpoints: Vec::new(),
                active_name: "default".into(),
            })
            .unwrap();
        assert!(current_endpoint(&store).unwrap().is_none());
    }

    #[test]
    fn repair_waits_for_registry_lock() {
        let (_dir, store) = temp_store();
        let held = store.lock().unwrap();
        std::fs::write(
            store.path(),
            r#"{"servers":[{"name":"default","address":"127.0.0.1:11434"}],"current":"gone"}"#,
        )
        .unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let reader = store.clone();
        let handle = std::thread::spawn(move || current_endpoint(&reader).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(!handle.is_finished());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);

        drop(held);
        let ep = handle.join().unwrap().unwrap();
        assert_eq!(ep.name, "default");
        assert_eq!(store.load().unwrap().active_name, "default");
    }

    #[test]
    fn empty_argv_is_an_error() {
        let (_dir, store) = temp_store();
        assert!(execute_forward(Vec::new(), "ollama", &store).is_err());
    }

    #[test]
    fn bad_program_is_an_error() {
        let (_dir, store) = temp_store();
        let err = execute_forward(vec!["list".into()], "ollama \"oops", &store).unwrap_err();
        assert!(err.to_string().contains("failed to parse downstream program"));
    }

    #[cfg(unix)]
    #[test]
    fn forwards_to_current_server() {
        let (_dir, store) = temp_store();
        let mut state = RegistryState::default();
        state.endpoints.push(Endpoint::new("gpu", "10.9.8.7:11434"));
        state.active_name = "gpu".into();
        store.save(&state).unwrap();

        let code = execute_forward(
            vec![
                "-c".into(),
                r#"test "$OLLAMA_HOST" = "10.9.8.7:11434""#.into(),
            ],
            "sh",
            &store,
        )
        .unwrap();
        assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::SUCCESS));
    }
}
