// Implementations for the leveling system.

pub mod in_memory;
pub mod sqlite_store;

// Re-export for convenience
#[allow(unused_imports)]
pub use in_memory::InMemoryLevelStore;
pub use sqlite_store::SqliteLevelStore;
