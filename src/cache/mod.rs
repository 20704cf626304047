//! Persistent hash cache.
//!
//! This module stores file digests between runs so unchanged files are never
//! re-hashed.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema management, batched lookups
//!   and upserts, housekeeping.
//! * [`entry`]: Keys and entries stored in the cache.
//!
//! # Cache Invalidation
//!
//! Entries are keyed by path, size and modification time (nanoseconds). A
//! file whose size or mtime changed simply has a different key, so its old
//! entry can never be returned. Old entries stay on disk until
//! [`HashCache::prune_missing`], [`HashCache::invalidate`] or
//! [`HashCache::clear`] removes them.
//!
//! # Failure Model
//!
//! A corrupt database is recreated by [`HashCache::open_or_recover`]. Callers
//! treat lookup errors as misses and write errors as warnings; a cache that
//! fails both ways in one run is the only cache failure that stops a run.

pub mod database;
pub mod entry;

pub use database::{CacheError, CacheResult, CacheStats, HashCache};
pub use entry::{nanos_to_system_time, system_time_to_nanos, CacheEntry, CacheKey};
