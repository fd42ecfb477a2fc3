//! Outer-surface crate: the CLI, HTTP, and MCP-function adapters that sit
//! on top of `tx-services`/`tx-retrieval`, plus the config, telemetry, and
//! git-hook concerns that make a binary out of them. Mirrors the teacher's
//! `mcp-server` crate's role in its own workspace.

pub mod cli;
pub mod config;
pub mod dto;
pub mod error;
pub mod hooks;
pub mod http;
pub mod mcp;
pub mod telemetry;

pub use cli::{Cli, Command, Output, Services};
pub use config::Config;
pub use dto::TaskView;
pub use error::{AdapterError, ErrorBody};
pub use hooks::{HookConfig, HookConfigError};
