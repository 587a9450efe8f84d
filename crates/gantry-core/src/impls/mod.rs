//! Bundled implementations of the ports: in-memory and filesystem stores,
//! JSON codec. All are suitable defaults; production hosts may bring their
//! own (a remote blob store, a columnar codec, ...).

pub mod fs_store;
pub mod json_codec;
pub mod memory_store;

pub use self::fs_store::FsStore;
pub use self::json_codec::JsonCodec;
pub use self::memory_store::MemoryStore;
