//! Tool-calling canvas agent: declared tools, the backend tools that run
//! server-side, and the router that drives the model conversation.

pub mod backend;
pub mod prompt;
pub mod router;
pub mod tools;

pub use backend::BackendTools;
pub use router::{AgentRouter, FrontendCall, RunInput, RunOutput};
pub use tools::{ToolRegistry, ToolSide, ToolSpec};
