pub mod explodes;
pub mod types;

pub use explodes::ss::explode_ss;
pub use types::{MalformedUri, ParsePolicy};
