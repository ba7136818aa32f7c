//! Core data models for the application
//!
//! [`SsNode`] is what the link parser produces; [`XrayConfig`] is the relay
//! document the generator builds from a list of nodes and the writer persists.

mod node;
pub mod xray;

pub use node::SsNode;
pub use xray::XrayConfig;
