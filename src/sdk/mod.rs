/// Software Development Kit (SDK) for Flatdoc.
///
/// This module selects the backend from configuration and provides the remote
/// TCP client that mirrors the embedded engine's interface.
pub mod client;
/// Configuration and one-time backend selection.
pub mod discovery;

pub use client::Client;
pub use discovery::{new, Config};
