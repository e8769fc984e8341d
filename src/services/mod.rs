//! Application services: field mapping, reconciliation and the adapter
//! registry.

pub mod adapter_registry;
pub mod field_mapper;
pub mod reconciliation;

pub use adapter_registry::AdapterRegistry;
