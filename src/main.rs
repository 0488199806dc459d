use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cmd;
mod dispatch;
mod probe;
mod registry;
mod utils;

use cmd::ServerArgs;
use registry::RegistryStore;

/// Ollamanager - route ollama commands to one of several Ollama servers.
///
/// Command layout:
///   ollamanager server add <name> <address>   Register a server (port 11434 if omitted)
///   ollamanager server list                   List servers, current one marked with *
///   ollamanager server use <name>             Select the current server
///   ollamanager server remove <name>          Forget a server ('default' is protected)
///   ollamanager server current                Show the current server
///   ollamanager server ping                   Probe the current server
///   ollamanager version                       Own version + `ollama --version`
///   ollamanager <anything else> [args...]     Run `ollama <anything else> [args...]`
///                                             with OLLAMA_HOST set to the current server
///
/// Global flags / env:
///   -v / -vv          Increase verbosity (RUST_LOG overrides)
///   -q / --quiet      Errors only
///   --config <FILE>   Registry file (or OLLAMANAGER_CONFIG)
///   --ollama-bin <C>  Downstream program, shell-split (or OLLAMANAGER_OLLAMA_BIN)
#[derive(Parser, Debug)]
#[command(
    name = "ollamanager",
    version,
    author,
    about = "A wrapper for ollama that allows controlling ollama instances on your internal network",
    propagate_version = true,
    after_help = "Any command not listed above is passed to ollama on the current server, e.g.\n  ollamanager run llama3\n  ollamanager list"
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error log output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Registry file (defaults to <user config dir>/ollamanager/config.json)
    #[arg(long, global = true, env = "OLLAMANAGER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Downstream program that receives forwarded commands
    #[arg(
        long = "ollama-bin",
        global = true,
        env = "OLLAMANAGER_OLLAMA_BIN",
        value_name = "CMD",
        default_value = dispatch::DEFAULT_PROGRAM
    )]
    ollama_bin: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage Ollama servers
    Server(ServerArgs),

    /// Show version information (ours and the current server's ollama)
    Version,

    /// Passed through to ollama on the current server
    #[command(external_subcommand)]
    Ollama(Vec<String>),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    let store = RegistryStore::open(cli.config.clone())
        .context("Failed to initialize configuration")?;
    debug!(path = %store.path().display(), "using server registry");

    match cli.command {
        None => cmd::execute_overview(&store),
        Some(Commands::Server(args)) => cmd::execute_server(args, &store),
        Some(Commands::Version) => cmd::execute_version(&cli.ollama_bin, &store),
        Some(Commands::Ollama(argv)) => cmd::execute_forward(argv, &cli.ollama_bin, &store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::server::ServerCommand;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ollamanager").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_command_is_overview() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn server_subcommand_parses() {
        let cli = parse(&["server", "use", "gpu"]);
        match cli.command {
            Some(Commands::Server(a)) => {
                assert_eq!(a.command, ServerCommand::Use { name: "gpu".into() })
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_forwarded_verbatim() {
        let cli = parse(&["run", "llama3", "--verbose", "-q"]);
        match cli.command {
            Some(Commands::Ollama(argv)) => {
                assert_eq!(argv, ["run", "llama3", "--verbose", "-q"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cli.verbose, 0, "flags after the command belong to ollama");
        assert!(!cli.quiet);
    }

    #[test]
    fn global_flags_before_forwarded_command() {
        let cli = parse(&["-vv", "--config", "/tmp/x.json", "--ollama-bin", "my-ollama", "ps"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(cli.ollama_bin, "my-ollama");
        assert!(matches!(cli.command, Some(Commands::Ollama(ref a)) if a == &["ps"]));
    }

    #[test]
    fn version_is_a_subcommand() {
        assert!(matches!(parse(&["version"]).command, Some(Commands::Version)));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
