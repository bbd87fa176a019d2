//! Reconciliation services
//!
//! Leaves first: candidate stores, scoring, selection and identifier
//! resolution; the batch runner composes them over the record set.

pub mod batch_runner;
pub mod catalog;
pub mod catalog_client;
pub mod quota;
pub mod resolver;
pub mod scoring;
pub mod selector;
pub mod stores;

pub use batch_runner::{BatchRunner, RunAborted};
pub use catalog::{CandidateStore, CatalogError, SqliteCatalog};
pub use catalog_client::HostedCatalogClient;
pub use quota::QuotaBudget;
pub use resolver::{CatalogReference, DirectIdentifier, ExpansionSlugs, IdentifierResolver};
pub use scoring::ScoringEngine;
pub use selector::MatchSelector;
pub use stores::{ProgressStore, RecordStore, SqliteProgressStore, SqliteRecordStore};
