//! Embedded engine module
//!
//! - `EngineLifecycle`: creates the single engine instance and signals readiness
//! - `EngineInstance`: shared handle used to open sessions
//! - `Session`: one connection issuing SQL and returning Arrow result sets

mod lifecycle;
mod session;

pub use lifecycle::{EngineInstance, EngineLifecycle, RuntimeProfile};
pub use session::Session;
