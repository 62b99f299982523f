//! relink core library: qualified-name registry, call resolution, pending-call
//! reconciliation and graph storage.
//!
//! The main entry point is [`ingest::Ingestor`], which runs one ingestion pass
//! for one project over a [`store::GraphBackend`]: parse, register, resolve
//! calls, then reconcile every stored pending call.

pub mod config;
pub mod error;
pub mod ingest;
pub mod pending;
pub mod registry;
pub mod resolve;
pub mod store;
pub mod types;
