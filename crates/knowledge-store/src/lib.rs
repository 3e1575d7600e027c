//! Selector knowledge for pagewarden.
//!
//! Maps `(context, element key)` to a selector and keeps a capped,
//! insertion-ordered history of selectors that successfully dismissed an
//! obstruction. The store flushes through a [`KnowledgePersistence`] after every
//! mutation; persistence failures are logged and the in-memory state stays
//! authoritative.

pub mod errors;
pub mod persistence;
pub mod store;
pub mod validate;

pub use errors::PersistenceError;
pub use persistence::{
    JsonFilePersistence, KnowledgePersistence, KnowledgeSnapshot, MemoryPersistence,
    LEARNED_KEY_PREFIX,
};
pub use store::{
    KnowledgeStore, LearnedSelector, RetentionPolicy, SharedKnowledgeStore, StoreStatsSnapshot,
    DEFAULT_LEARNED_CAP,
};
pub use validate::validate_selector_format;
