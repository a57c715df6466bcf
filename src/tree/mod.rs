//! Storage side of a mount
//!
//! The engine only enumerates storage and asks for leaf hashes; it never
//! reads file bytes itself. Directory hashes are derived from children.

pub mod hasher;
pub mod memory;
pub mod node;
pub mod walker;

pub use hasher::{content_hash, directory_hash, Blake3HashProvider, HashProvider};
pub use memory::MemoryStorage;
pub use node::{Storage, StorageEntry};
pub use walker::LocalStorage;
