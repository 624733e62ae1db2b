//! SIRTIS admin CLI library
//!
//! Exposes the command bodies behind `sirtis-admin` for testing.

pub mod commands;
pub mod error;

pub use error::AdminError;
