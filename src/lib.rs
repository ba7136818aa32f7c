pub mod generator;
pub mod interfaces;
pub mod models;
pub mod parser;
pub mod settings;
pub mod utils;

// Re-export the main types for easier access
pub use models::{SsNode, XrayConfig};
pub use settings::Settings;
