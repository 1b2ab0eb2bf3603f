//! REST collaborator for the TacSync field client: snapshot fetch, task
//! list refresh and task mutations.

pub mod client;
pub mod commands;
pub mod error;
pub mod loader;

pub use client::{Credentials, RestClient, SnapshotSource, TaskApi};
pub use commands::TaskCommands;
pub use error::{RestError, Result};
pub use loader::SnapshotLoader;
