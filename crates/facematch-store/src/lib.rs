//! facematch-store — SQLite persistence for the identity-resolution engine.
//!
//! One database file holds the provider configurations, the registered
//! entities (the candidate corpus), and the descriptor records. The same
//! [`SqliteStore`] value implements the engine's [`ConfigStore`],
//! [`DescriptorStore`] and [`CandidateCorpus`] seams.

mod store;

pub use store::SqliteStore;
