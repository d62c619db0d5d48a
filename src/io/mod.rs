mod local;
mod memory;

pub use local::LocalFileReader;
pub use memory::MemoryReader;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for random access reading from an archive source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`.
    ///
    /// A range that reaches past the end of the source means the archive
    /// metadata points outside the file, so it is reported as a decode
    /// failure rather than an I/O error.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| Error::decode("offset overflow"))?;
        if end > self.size() {
            return Err(Error::decode(format!(
                "range {offset}..{end} is outside the archive ({} bytes)",
                self.size()
            )));
        }

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                return Err(Error::decode("unexpected end of archive"));
            }
            filled += n;
        }
        Ok(())
    }
}
