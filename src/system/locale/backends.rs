// Backend layer implementations
pub mod filesystem;
pub mod http;
pub mod local_storage;
pub mod memory;

pub use filesystem::FilesystemBackend;
pub use http::{HttpBackend, HttpBackendOptions};
pub use local_storage::{FileStore, KeyValueStore, LocalStorageBackend, MemoryStore, StoredEntry};
pub use memory::MemoryBackend;
