/*!
Command dispatcher module.

  src/cmd/
    mod.rs       (this file)
    server.rs    (ServerArgs + execute_server)
    forward.rs   (execute_forward / execute_version / execute_overview)
    format.rs    (color / emoji / table helpers for human output)

Conventions:
  - Each command module exposes `execute_*` functions returning
    `anyhow::Result<ExitCode>`.
  - Argument structs derive `clap::Args` and are kept minimal.
  - JSON output never goes through `format.rs`.
*/

pub mod format;
pub mod forward;
pub mod server;

pub use forward::{execute_forward, execute_overview, execute_version};
pub use server::{ServerArgs, execute_server};
