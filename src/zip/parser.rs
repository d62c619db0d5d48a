//! Low-level ZIP archive parser.
//!
//! Reads the archive back to front: the End of Central Directory record
//! (and its ZIP64 counterpart when present) locates the Central Directory,
//! which holds the name, sizes and local header offset of every member.
//! Only the tail of the archive is needed to list it, which keeps remote
//! sources down to a couple of Range requests.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This bounds the backwards search for an EOCD followed by a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// ZIP64 extended information extra field id
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Central directory reader over any [`ReadAt`] source.
///
/// Usually driven through [`ArchiveReader`](super::ArchiveReader).
pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset. Archives without a comment are
    /// resolved with a single 22-byte read; otherwise the last 64 KiB are
    /// scanned backwards for a signature whose comment length reaches
    /// exactly to the end of the file.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(Error::decode("file too small to be a ZIP archive"));
        }

        let offset = self.size - eocd_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(Error::decode("not a ZIP archive (no end of central directory record)"))
    }

    /// Read the ZIP64 End of Central Directory record that the locator
    /// immediately preceding the regular EOCD points to.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| Error::decode("missing ZIP64 end of central directory locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List every member recorded in the central directory, in directory order.
    pub async fn list_entries(&self) -> Result<Vec<CentralDirectoryEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        if eocd.is_multi_disk() {
            return Err(Error::decode("multi-disk archives are not supported"));
        }

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        // Every header takes at least 46 bytes; anything claiming more
        // entries than that is corrupt and must not drive the allocation.
        if total_entries > cd_size / CDFH_MIN_SIZE as u64 {
            return Err(Error::decode(format!(
                "central directory of {cd_size} bytes cannot hold {total_entries} entries"
            )));
        }

        self.check_range(cd_offset, cd_size, "central directory")?;
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());
        for index in 0..total_entries {
            let entry = parse_cdfh(&mut cursor).map_err(|e| {
                Error::decode(format!("central directory entry {index}: {e}"))
            })?;
            entries.push(entry);
        }

        tracing::debug!(entries = entries.len(), cd_offset, cd_size, "read central directory");
        Ok(entries)
    }

    /// Offset of the member's data, just past its local file header.
    ///
    /// The local header's name and extra field lengths may differ from the
    /// central directory copy, so they are read from the local header itself.
    pub async fn data_offset(&self, entry: &CentralDirectoryEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(Error::decode(format!(
                "invalid local file header for {}",
                entry.file_name
            )));
        }

        let file_name_length = u16::from_le_bytes([lfh_buf[26], lfh_buf[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh_buf[28], lfh_buf[29]]) as u64;

        entry
            .lfh_offset
            .checked_add(LFH_SIZE as u64 + file_name_length + extra_field_length)
            .ok_or_else(|| Error::decode(format!("{}: data offset overflows", entry.file_name)))
    }

    /// Fail with a decode error unless `offset..offset + len` lies inside the
    /// archive. Header-supplied lengths go through here before they size any
    /// buffer.
    pub fn check_range(&self, offset: u64, len: u64, what: &str) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::decode(format!(
                "{what} ({len} bytes at offset {offset}) extends past the end of the archive ({} bytes)",
                self.size
            ))),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Parse one Central Directory File Header at the cursor position.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> io::Result<CentralDirectoryEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Err(invalid("bad central directory header signature"));
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    // Non-UTF-8 names (legacy code pages) are kept, lossily
    let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();
    let is_directory = file_name.ends_with('/');

    let mut extra = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra)?;
    let mut extra = Cursor::new(extra.as_slice());
    while extra.position() + 4 <= extra.get_ref().len() as u64 {
        let header_id = extra.read_u16::<LittleEndian>()?;
        let field_size = extra.read_u16::<LittleEndian>()? as u64;
        let field_end = extra.position() + field_size;

        if header_id == ZIP64_EXTRA_ID {
            // Values appear only for the header fields saturated at 0xFFFFFFFF
            if uncompressed_size == 0xFFFFFFFF {
                uncompressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF {
                compressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF {
                lfh_offset = extra.read_u64::<LittleEndian>()?;
            }
        }
        extra.set_position(field_end);
    }

    let mut comment = vec![0u8; file_comment_length as usize];
    cursor.read_exact(&mut comment)?;

    Ok(CentralDirectoryEntry {
        file_name,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        is_directory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use std::io::Write;

    fn parser(bytes: Vec<u8>) -> ZipParser<MemoryReader> {
        ZipParser::new(Arc::new(MemoryReader::new(bytes)))
    }

    fn fixture(comment: &[u8]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.add_directory("covers/", opts).unwrap();
        zip.start_file("covers/001.jpg", opts).unwrap();
        zip.write_all(b"jpeg").unwrap();
        zip.start_file("001.wav", opts).unwrap();
        zip.write_all(b"RIFF").unwrap();
        if !comment.is_empty() {
            zip.set_comment(String::from_utf8_lossy(comment).into_owned());
        }
        zip.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn lists_entries_in_directory_order() {
        let entries = parser(fixture(b"")).list_entries().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["covers/", "covers/001.jpg", "001.wav"]);
        assert!(entries[0].is_directory);
        assert!(!entries[2].is_directory);
        assert_eq!(entries[2].uncompressed_size, 4);
    }

    #[tokio::test]
    async fn finds_eocd_behind_comment() {
        let bytes = fixture(b"mastered 2024, side A");
        let p = parser(bytes.clone());
        let (eocd, offset) = p.find_eocd().await.unwrap();
        assert_eq!(eocd.total_entries, 3);
        assert_eq!(offset as usize, bytes.len() - EndOfCentralDirectory::SIZE - 21);
    }

    #[tokio::test]
    async fn data_offset_skips_local_header() {
        let p = parser(fixture(b""));
        let entries = p.list_entries().await.unwrap();
        let offset = p.data_offset(&entries[2]).await.unwrap();
        let mut buf = [0u8; 4];
        p.reader().read_exact_at(offset, &mut buf).await.unwrap();
        assert_eq!(&buf, b"RIFF");
    }

    #[tokio::test]
    async fn rejects_non_zip_input() {
        let err = parser(b"definitely not a zip archive, just text".to_vec())
            .list_entries()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = parser(b"PK".to_vec()).list_entries().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    /// A ZIP64 archive with no members whose end record claims a central
    /// directory of `cd_size` bytes at offset 0.
    fn zip64_tail(cd_size: u64) -> Vec<u8> {
        use byteorder::WriteBytesExt;

        let mut buf = Vec::new();
        buf.extend_from_slice(Zip64EOCD::SIGNATURE);
        buf.write_u64::<LittleEndian>(44).unwrap();
        buf.write_u16::<LittleEndian>(45).unwrap();
        buf.write_u16::<LittleEndian>(45).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(cd_size).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();

        buf.extend_from_slice(Zip64EOCDLocator::SIGNATURE);
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();

        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 0xFFFF,
            total_entries: 0xFFFF,
            cd_size: 0xFFFFFFFF,
            cd_offset: 0xFFFFFFFF,
            comment_len: 0,
        }
        .write_to(&mut buf)
        .unwrap();
        buf
    }

    #[tokio::test]
    async fn zip64_central_directory_past_end_is_decode_error() {
        let bytes = zip64_tail(u64::MAX);
        assert_eq!(bytes.len(), 98);

        let err = parser(bytes).list_entries().await.unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("central directory")));
    }

    #[tokio::test]
    async fn empty_zip64_archive_lists_nothing() {
        let entries = parser(zip64_tail(0)).list_entries().await.unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn check_range_bounds() {
        let p = parser(vec![0u8; 100]);
        assert!(p.check_range(0, 100, "all").is_ok());
        assert!(p.check_range(99, 2, "tail").is_err());
        assert!(p.check_range(u64::MAX, 1, "overflow").is_err());
    }

    #[tokio::test]
    async fn rejects_truncated_central_directory() {
        let mut bytes = fixture(b"");
        let eocd_at = bytes.len() - EndOfCentralDirectory::SIZE;
        // Claim one more entry than the directory holds
        bytes[eocd_at + 8] += 1;
        bytes[eocd_at + 10] += 1;
        let err = parser(bytes).list_entries().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
