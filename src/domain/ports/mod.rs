//! Port trait definitions (Hexagonal Architecture)
//!
//! - AlmAdapter: the uniform capability surface of an ALM backend
//! - SecretSource: where adapter connection parameters come from
//!
//! These traits keep the reconciliation engine and the registry
//! independent of any specific backend or secret store.

pub mod alm_adapter;
pub mod secret_source;

pub use alm_adapter::AlmAdapter;
pub use secret_source::SecretSource;
