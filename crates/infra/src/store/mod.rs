//! Durable records: jobs, stories, and the per-user quota ledger.
//!
//! Each concern has a trait, an in-memory implementation for tests/dev, and
//! a Postgres implementation in [`postgres`].

pub mod job_store;
pub mod ledger;
pub mod postgres;
pub mod story_store;

pub use job_store::{InMemoryJobStore, JobStore, JobStoreError, Transitioned};
pub use ledger::{InMemoryQuotaLedger, LedgerError, QuotaLedger};
pub use postgres::PostgresStore;
pub use story_store::{InMemoryStoryStore, StoryStore, StoryStoreError};
