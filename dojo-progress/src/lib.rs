//! Dojo Progress
//!
//! Local bookkeeping of which course items a learner has solved.
//!
//! Layers, leaves first:
//! - Store: failure-tolerant key-value persistence (never errors, never panics)
//! - Keys: current and legacy key formats
//! - Cache: namespaced read-through/write-through cache with legacy migration
//! - Bus: change notifications for local writes and for external mutations
//!   the host reports through [`ProgressCache::apply_external_change`]
//! - Observer: solved count and percentage over a fixed set of items
//!
//! The cache and the bus are explicit instances created once at startup and
//! passed to whatever needs them.

pub mod bus;
pub mod cache;
pub mod error;
pub mod keys;
pub mod observer;
pub mod store;

// Re-export commonly used types
pub use bus::{ChangeBus, ChangeEvent, ExternalChange};
pub use cache::{ProgressCache, SOLVED};
pub use keys::{KeyKind, KeyScheme, ParsedKey};
pub use observer::{AggregateObserver, AggregateState};
pub use store::{DisabledStore, FileStore, KeyValueStore, MemoryStore, open_store};
