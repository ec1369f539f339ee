pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod mcp;
pub mod util;

pub use config::Settings;
pub use error::{BridgeError, Result};
pub use index::IndexManager;
pub use mcp::McpServer;
