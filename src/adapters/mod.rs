//! Infrastructure adapters for external ALM systems.

pub mod plugins;
