//! Session identity and lifecycle.

pub mod id;
pub mod state;

pub use id::SessionId;
pub use state::{InvalidTransition, SessionState};
