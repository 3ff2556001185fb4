//! A runtime dependency-injection container for Rust.
//!

pub use plugboard_core::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use plugboard_core::prelude::*;
}
