//! Polarion ALM backend (SOAP/XML).
//!
//! - `soap`: escaped envelope builder and response parser
//! - `session`: login session state machine
//! - `client`: SOAP transport holding the session behind a mutex
//! - `models`: work item conversion, URIs and Lucene queries
//! - `adapter`: the [`AlmAdapter`](crate::domain::ports::AlmAdapter) implementation

pub mod adapter;
pub mod client;
pub mod models;
pub mod session;
pub mod soap;

pub use adapter::PolarionAdapter;
pub use client::PolarionClient;
