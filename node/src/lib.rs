//! Node wiring: one owned context object per node instance.
//!
//! A [`Node`] composes the transport endpoint, the secure peer layer, and
//! the discovery handlers, and exposes the collaborator interface the
//! application layer consumes (`register_command`, `send`, `find_by_id`,
//! `disconnect`, `bootstrap`, `export_peers`). Several nodes can coexist in
//! one process; there is no global state.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::Node;
