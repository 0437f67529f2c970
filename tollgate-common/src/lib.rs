mod codes;
mod config;
mod error;
mod types;

pub use codes::*;
pub use config::*;
pub use error::*;
pub use types::*;
