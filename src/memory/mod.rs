pub mod client;
pub mod sync;

pub use client::{MemoryClient, MemoryConfig, MemoryKind, MemoryRecord};
pub use sync::{ReferenceSync, SyncStatus, SyncSummary};
