//! Command forwarding to the downstream `ollama` executable.
//!
//! forward("run", ["llama3"], endpoint)
//!   -> spawns `<program> run llama3` with OLLAMA_HOST=<endpoint.address>
//!
//! Stdio is inherited so interactive sessions work unchanged. The endpoint is
//! handed over through a [`ContextInjector`]; [`EnvInjector`] is the stock one.

use shell_words::split as shell_split;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

use crate::registry::Endpoint;

/// Variable the `ollama` CLI reads to find its server.
pub const HOST_ENV_VAR: &str = "OLLAMA_HOST";

/// Downstream executable used when none is configured.
pub const DEFAULT_PROGRAM: &str = "ollama";

/// Exit code reported when the downstream executable cannot be started.
pub const LAUNCH_FAILURE_EXIT_CODE: u8 = 127;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("downstream program is empty")]
    EmptyProgram,

    #[error("failed to parse downstream program '{raw}': {source}")]
    InvalidProgram {
        raw: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("Error executing {program} command: {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Downstream executable plus any fixed leading arguments.
///
/// Parsed with shell rules, so `docker exec -it box ollama` is a valid program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub program: String,
    pub prefix_args: Vec<String>,
}

impl Program {
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        let parts = shell_split(raw.trim()).map_err(|source| DispatchError::InvalidProgram {
            raw: raw.to_string(),
            source,
        })?;
        let mut parts = parts.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(DispatchError::EmptyProgram)?;
        Ok(Self {
            program,
            prefix_args: parts.collect(),
        })
    }
}

impl Default for Program {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            prefix_args: Vec::new(),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix_args.is_empty() {
            f.write_str(&self.program)
        } else {
            write!(f, "{} {}", self.program, self.prefix_args.join(" "))
        }
    }
}

/// Hands the selected endpoint to the child process.
pub trait ContextInjector {
    fn inject(&self, cmd: &mut Command, endpoint: &Endpoint);
}

/// Sets one environment variable on the child to the endpoint address.
#[derive(Debug, Clone)]
pub struct EnvInjector {
    var: OsString,
}

impl EnvInjector {
    pub fn new(var: impl Into<OsString>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvInjector {
    fn default() -> Self {
        Self::new(HOST_ENV_VAR)
    }
}

impl ContextInjector for EnvInjector {
    fn inject(&self, cmd: &mut Command, endpoint: &Endpoint) {
        cmd.env(&self.var, &endpoint.address);
    }
}

/// How a forwarded child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub status: ExitStatus,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Shell-style exit code: the child's own code, or `128 + signal` on Unix.
    pub fn code(&self) -> i32 {
        if let Some(code) = self.status.code() {
            return code;
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = self.status.signal() {
                return 128 + sig;
            }
        }
        1
    }
}

/// Spawns the downstream program against an endpoint.
pub struct Dispatcher {
    program: Program,
    injector: Box<dyn ContextInjector>,
}

impl Dispatcher {
    pub fn new(program: Program) -> Self {
        Self::with_injector(program, EnvInjector::default())
    }

    /// Like [`Dispatcher::new`], with a custom way of handing the endpoint to the child.
    pub fn with_injector(program: Program, injector: impl ContextInjector + 'static) -> Self {
        Self {
            program,
            injector: Box::new(injector),
        }
    }

    fn command(&self, command: &str, args: &[String], endpoint: &Endpoint) -> Command {
        let mut cmd = Command::new(&self.program.program);
        cmd.args(&self.program.prefix_args)
            .arg(command)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        self.injector.inject(&mut cmd, endpoint);
        cmd
    }

    /// Run `command args...` and wait for it.
    ///
    /// Ctrl-C is left to the child: the parent keeps waiting and reports
    /// whatever status the child exits with.
    pub fn forward(
        &self,
        command: &str,
        args: &[String],
        endpoint: &Endpoint,
    ) -> Result<ExitOutcome, DispatchError> {
        let mut cmd = self.command(command, args, endpoint);
        debug!(
            program = %self.program,
            command,
            ?args,
            server = %endpoint.name,
            address = %endpoint.address,
            "forwarding"
        );

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DispatchError::Runtime)?;

        rt.block_on(async {
            let mut child = cmd.spawn().map_err(|source| DispatchError::LaunchFailure {
                program: self.program.program.clone(),
                source,
            })?;

            let mut listen = true;
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    res = tokio::signal::ctrl_c(), if listen => match res {
                        Ok(()) => debug!("interrupt received; waiting for child to exit"),
                        Err(e) => {
                            debug!("cannot listen for interrupts: {e}");
                            listen = false;
                        }
                    },
                }
            };

            let status = status.map_err(|source| DispatchError::Wait {
                program: self.program.program.clone(),
                source,
            })?;
            debug!(%status, "child exited");
            Ok(ExitOutcome { status })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_program_plain() {
        assert_eq!(Program::parse("ollama").unwrap(), Program::default());
    }

    #[test]
    fn parse_program_with_prefix() {
        let p = Program::parse(r#"docker exec -it "my box" ollama"#).unwrap();
        assert_eq!(p.program, "docker");
        assert_eq!(p.prefix_args, ["exec", "-it", "my box", "ollama"]);
        assert_eq!(p.to_string(), "docker exec -it my box ollama");
    }

    #[test]
    fn parse_program_rejects_empty_and_unbalanced() {
        assert!(matches!(Program::parse("   "), Err(DispatchError::EmptyProgram)));
        assert!(matches!(
            Program::parse("ollama \"unterminated"),
            Err(DispatchError::InvalidProgram { .. })
        ));
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let d = Dispatcher::new(Program::parse("/nonexistent/ollamanager-test-bin").unwrap());
        let err = d
            .forward("list", &[], &Endpoint::new("default", "127.0.0.1:11434"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::LaunchFailure { .. }), "{err:?}");
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;

        fn sh() -> Dispatcher {
            Dispatcher::new(Program::parse("sh").unwrap())
        }

        #[test]
        fn injects_host_variable() {
            let ep = Endpoint::new("gpu", "10.0.0.9:11434");
            let out = sh()
                .forward(
                    "-c",
                    &[r#"test "$OLLAMA_HOST" = "10.0.0.9:11434""#.to_string()],
                    &ep,
                )
                .unwrap();
            assert!(out.success());
            assert_eq!(out.code(), 0);
        }

        #[test]
        fn propagates_child_exit_code() {
            let ep = Endpoint::new("default", "127.0.0.1:11434");
            let out = sh().forward("-c", &["exit 3".to_string()], &ep).unwrap();
            assert!(!out.success());
            assert_eq!(out.code(), 3);
        }

        #[test]
        fn prefix_args_come_before_command() {
            let d = Dispatcher::new(Program::parse("sh -c").unwrap());
            let ep = Endpoint::new("default", "127.0.0.1:11434");
            let out = d.forward("exit 4", &[], &ep).unwrap();
            assert_eq!(out.code(), 4);
        }

        #[test]
        fn signal_exit_maps_to_shell_code() {
            let ep = Endpoint::new("default", "127.0.0.1:11434");
            let out = sh().forward("-c", &["kill -TERM $$".to_string()], &ep).unwrap();
            assert_eq!(out.code(), 128 + 15);
        }

        #[test]
        fn custom_injector_replaces_env_var() {
            let d = Dispatcher::with_injector(
                Program::parse("sh").unwrap(),
                EnvInjector::new("REMOTE_ADDR"),
            );
            let ep = Endpoint::new("x", "h:1");
            let out = d
                .forward("-c", &[r#"test "$REMOTE_ADDR" = "h:1""#.to_string()], &ep)
                .unwrap();
            assert!(out.success());
        }
    }
}
