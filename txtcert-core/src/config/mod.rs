//! Configuration for txtcert

mod loader;
mod types;

pub use loader::{ConfigLoader, ConfigOverrides, parse_domains};
pub use types::*;
