pub mod base64;
pub mod file;
pub mod http;
pub mod url;
