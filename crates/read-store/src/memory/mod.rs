//! In-memory implementations of every collaborator contract.
//!
//! Each implementation is cheaply cloneable (clones share state) and has a
//! fault-injection switch so tests can simulate an unavailable dependency.

mod cache;
mod documents;
mod log;
mod search;

pub use cache::InMemoryCache;
pub use documents::InMemoryDocumentStore;
pub use log::{InMemoryLog, InMemoryLogReader};
pub use search::InMemorySearchIndex;
