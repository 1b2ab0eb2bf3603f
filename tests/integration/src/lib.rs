//! End-to-end scenarios for the TacSync field client
//!
//! Each scenario drives a full `SyncSession` over in-memory fakes:
//! - a loopback streaming transport
//! - a scripted GPS
//! - a fixed REST snapshot and task API

pub mod test_utils;

#[cfg(test)]
mod reconciliation_tests;

#[cfg(test)]
mod location_tests;

#[cfg(test)]
mod connection_tests;
