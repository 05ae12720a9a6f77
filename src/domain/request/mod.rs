//! Grant request aggregate - domain model and status transitions.
//!
//! This module contains the core domain logic for requests:
//! - Request types and the status enum
//! - The transition function guarding every status change

pub mod state;
pub mod transitions;

// Re-export commonly used types
pub use state::*;
pub use transitions::StatusUpdate;
