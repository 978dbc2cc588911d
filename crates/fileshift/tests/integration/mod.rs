//! Shared helpers for fileshift integration tests

pub mod utils;
pub mod live;

pub use utils::*;
pub use live::*;
