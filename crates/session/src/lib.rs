//! TacSync session wiring.
//!
//! [`SyncSession`] is built from a configuration and its collaborators,
//! started with a credential and shut down by the caller.

pub mod error;
pub mod session;

pub use error::{Result, SessionError};
pub use session::{Collaborators, SyncSession};
