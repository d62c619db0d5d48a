//! ZIP container decoding and encoding.
//!
//! - [`structures`]: on-disk records (EOCD, ZIP64 records, file headers) and
//!   the decoded [`Archive`] model
//! - [`parser`]: locating and parsing the central directory
//! - [`reader`]: decoding member content (STORED, DEFLATE) with CRC checks
//! - [`writer`]: building new archives in memory
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archives
//! - No BZIP2, LZMA, or other compression methods
//! - ZIP64 is read but never written

mod parser;
mod reader;
mod structures;
mod writer;

pub use parser::ZipParser;
pub use reader::ArchiveReader;
pub use structures::*;
pub use writer::ArchiveWriter;
