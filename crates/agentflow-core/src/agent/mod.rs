//! External agent access.
//!
//! ```text
//! handlers ──► AgentExecutionService ──► dyn AgentApi ──► CursorAgentClient (HTTP)
//!                      │
//!                   JobStore (agent id, status, prompt rows)
//! ```

pub mod api;
pub mod cursor_client;
pub mod service;

pub use api::{AgentApi, LaunchRequest, LaunchedAgent};
pub use cursor_client::{CursorAgentClient, CursorClientConfig};
pub use service::AgentExecutionService;
