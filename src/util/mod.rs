//! Shared utilities.

pub mod clock;
pub mod hash;
pub mod telemetry;

pub use clock::*;
pub use hash::murmur3_32;
pub use telemetry::*;
