/// TCP server implementation for the Flatdoc daemon.
///
/// This module provides the [`Router`] which handles incoming TCP connections
/// and dispatches line commands to any [`DocumentStore`](crate::DocumentStore).
pub mod router;

pub use router::Router;
