//! Domain layer for almsync
//!
//! Backend-independent models, the adapter and secret ports, and the error
//! taxonomy.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{AlmError, AlmResult};
