//! # coverzip
//!
//! Pairs WAV tracks with JPG/JPEG covers inside a ZIP archive and
//! repackages every matched track as an `.mp3`-named entry of a new archive.
//!
//! Matching is by base name (the entry name without its extension),
//! compared case-insensitively: `001.WAV` pairs with `001.jpg`. No audio is
//! transcoded; output entries carry the original WAV bytes.
//!
//! Archives can be read from memory or from the local filesystem.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use coverzip::{CompressionMethod, LocalFileReader, Session};
//!
//! #[tokio::main]
//! async fn main() -> coverzip::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new(Path::new("album.zip"))?);
//!
//!     let mut session = Session::new(CompressionMethod::Stored);
//!     let analysis = session.analyze(reader).await?;
//!     for pair in &analysis.pairs {
//!         println!("{} + {}", pair.audio.name, pair.image.name);
//!     }
//!
//!     let output = session.convert(|progress| println!("{}%", progress.percent()))?;
//!     std::fs::write("converted_mp3_with_covers.zip", output)?;
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod cli;
pub mod convert;
pub mod error;
pub mod io;
pub mod session;
pub mod zip;

pub use analyzer::{Analysis, EntryRef, MatchedPair, MediaKind, analyze, analyze_archive};
pub use cli::Cli;
pub use convert::{DEFAULT_OUTPUT_NAME, build_output, output_name};
pub use error::{Error, Result};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use session::{Progress, Session, Stage};
pub use zip::{Archive, ArchiveEntry, ArchiveReader, ArchiveWriter, CompressionMethod};
