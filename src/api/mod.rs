//! Versioned API surfaces mounted by the binary.

pub mod v0;

/// Mount point of the v0 API.
pub const V0_PREFIX: &str = "/api/v0";
