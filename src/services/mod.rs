//! External collaborators module
//! 
//! Persistence, audio backends, the sound catalog and the stats collector
//! consumed by the engine.

pub mod audio;
pub mod catalog;
pub mod persistence;
pub mod stats;

// Re-export main types
pub use audio::{select_backend, AudioBackend, AudioError, AudioSink, AssetBackend, NullBackend};
pub use catalog::{default_catalog, SoundDef};
pub use persistence::{JsonFileStore, MemoryStore, PersistenceGateway, StoreError};
pub use stats::{FocusStats, StatsCollector, StatsSnapshot};
