//! Level-result cache
//!
//! - `SharedStream`: replaying multicast stream, the unit the cache stores
//! - `LevelCache`: size-bounded LRU keyed by (parent identity, variation)

mod level_cache;
mod shared_stream;

pub use level_cache::{
    CachedLevel, LevelCache, LevelCacheKey, LevelStage, LevelVariation, ParentKey,
};
pub use shared_stream::SharedStream;
