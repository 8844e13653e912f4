//! Secure extraction of archives and compressed streams.
//!
//! `unpax` consumes a single byte stream of unknown type, detects its
//! format by magic bytes, and materialises its contents into a pluggable
//! filesystem target while enforcing anti-abuse invariants: path
//! traversal prevention across directory and symlink edges,
//! absolute-path neutralisation, size and count quotas,
//! decompression-bomb guards, link-loop caps, and platform filename
//! restrictions.
//!
//! Supported inputs: tar, zip, 7z and rar archives, plus gzip, bzip2,
//! xz, zstd, brotli, lz4, snappy and zlib single streams (with automatic
//! tar extraction after decompression).
//!
//! # Examples
//!
//! Extracting to disk:
//!
//! ```no_run
//! use std::fs::File;
//! use std::path::Path;
//! use unpax::{extract, Config};
//! use unpax::target::DiskTarget;
//!
//! # fn main() -> unpax::Result<()> {
//! let archive = File::open("bundle.tar.gz")?;
//! extract(archive, Path::new("/tmp/out"), &DiskTarget::new(), &Config {
//!     create_destination: true,
//!     ..Config::default()
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! Extracting into memory, with telemetry:
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use unpax::{extract, Config};
//! use unpax::target::MemoryFs;
//!
//! # fn main() -> unpax::Result<()> {
//! # let archive: &[u8] = &[];
//! let fs = MemoryFs::new();
//! let config = Config {
//!     telemetry_hook: Some(Arc::new(|data| println!("{data}"))),
//!     ..Config::default()
//! };
//! extract(archive, Path::new("."), &fs, &config)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod extraction;
pub mod formats;
pub mod io;
pub mod security;
pub mod target;
pub mod telemetry;

// Re-export main API types
pub use config::CancelToken;
pub use config::Config;
pub use config::MetricsProcessor;
pub use config::TelemetryHook;
pub use error::ExtractError;
pub use error::Quota;
pub use error::Result;
pub use extraction::engine::EntryKind;
pub use extraction::engine::EntrySource;
pub use extraction::engine::SourceEntry;
pub use extraction::extract;
pub use extraction::extract_file;
pub use formats::FileType;
pub use formats::MAX_HEADER_LENGTH;
pub use formats::detect;
pub use target::DiskTarget;
pub use target::MemoryFs;
pub use target::Metadata;
pub use target::NodeKind;
pub use target::Target;
pub use telemetry::Telemetry;
