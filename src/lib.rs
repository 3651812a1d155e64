pub mod client;
pub mod config;
pub mod error;
pub mod fs;
pub mod metadata;
pub mod watch;

pub use error::{FsError, Result};
