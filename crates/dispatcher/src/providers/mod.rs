//! Provider implementations
//!
//! Contains LogProvider, FileProvider, and HttpProvider.

mod file;
mod http;
mod log;

pub use self::file::FileProvider;
pub use self::http::{HttpProvider, HttpProviderConfig};
pub use self::log::LogProvider;
