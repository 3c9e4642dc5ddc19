//! manualrag - hybrid retrieval over paginated technical manuals.
//!
//! manualrag ingests a service-manual style PDF, slices its text into
//! overlapping chunks, embeds them through a pluggable [`Embedder`], and
//! answers queries by fusing a flat L2 vector scan with a keyword-overlap
//! scorer. The built index persists as a redb vector store plus JSON
//! metadata and is reloaded wholesale on later runs.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use manualrag::{DataDir, Engine, EngineConfig, HashEmbedder};
//!
//! let dir = DataDir::resolve(None).unwrap();
//! let config = EngineConfig::from_env().unwrap();
//! let engine = Engine::new(dir, config, Arc::new(HashEmbedder::default())).unwrap();
//!
//! engine.build("manual.pdf".as_ref()).unwrap();
//! for r in engine.search_hybrid("replace fuel pump relay", 10).unwrap() {
//!     println!("p.{} [{:?}] {:.3}: {}", r.page, r.kind, r.similarity, r.text);
//! }
//! ```

pub mod chunker;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod embed;
pub mod error;
pub mod images;
pub mod ingest;
pub mod keyword;
pub mod search;
pub mod store;
pub mod vector_db;
pub mod vector_index;

#[doc(hidden)]
pub mod testutil;

pub use chunker::Chunk;
pub use config::EngineConfig;
pub use data_dir::DataDir;
pub use embed::{Embedder, EmbeddingGateway, HashEmbedder};
pub use error::{Error, Result};
pub use images::{ImageDescriptor, Rect};
pub use search::{SearchKind, SearchResult};
pub use store::{Engine, Snapshot};
pub use vector_index::FlatIndex;
