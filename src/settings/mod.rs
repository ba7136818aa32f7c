pub mod settings_struct;

pub use settings_struct::Settings;
