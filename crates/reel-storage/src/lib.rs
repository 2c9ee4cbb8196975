//! Storage for generated assets.
//!
//! This crate provides:
//! - Fetching finished assets from the provider (HTTP and `file://`)
//! - A session-scoped in-memory blob store
//! - The local save capability (destination prompt + file write)
//! - Reading the bytes behind any `AssetRef`
//! - `AssetResolver`, which turns a remote result into a usable asset

pub mod blob;
pub mod error;
pub mod fetch;
pub mod local;
pub mod reader;
pub mod resolver;

pub use blob::BlobStore;
pub use error::{StorageError, StorageResult};
pub use fetch::{AssetFetcher, HttpFetcher};
pub use local::{DirectorySaver, LocalSaver, SaveChoice};
pub use reader::AssetReader;
pub use resolver::AssetResolver;
