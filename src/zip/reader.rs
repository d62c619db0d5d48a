use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::structures::{Archive, ArchiveEntry, CentralDirectoryEntry, CompressionMethod};

/// Upper bound on the buffer reserved ahead of inflating, whatever the header claims
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Decodes archive members from a random-access source
pub struct ArchiveReader<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ArchiveReader<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all members of the archive
    pub async fn list_entries(&self) -> Result<Vec<CentralDirectoryEntry>> {
        self.parser.list_entries().await
    }

    /// Decode one member's content, verifying its CRC-32
    pub async fn read_entry(&self, entry: &CentralDirectoryEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            return Err(Error::decode(format!(
                "{} is encrypted, encryption is not supported",
                entry.file_name
            )));
        }

        let data_offset = self.parser.data_offset(entry).await?;
        self.parser
            .check_range(data_offset, entry.compressed_size, &entry.file_name)?;
        let compressed_len = usize::try_from(entry.compressed_size)
            .map_err(|_| Error::decode(format!("{} is too large", entry.file_name)))?;
        let mut raw = vec![0u8; compressed_len];
        self.parser
            .reader()
            .read_exact_at(data_offset, &mut raw)
            .await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(Error::decode(format!(
                        "{} is stored but sizes differ ({} vs {})",
                        entry.file_name, entry.compressed_size, entry.uncompressed_size
                    )));
                }
                raw
            }
            CompressionMethod::Deflate => {
                let mut out =
                    Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOC) as usize);
                DeflateDecoder::new(raw.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| Error::decode(format!("{}: {e}", entry.file_name)))?;
                if out.len() as u64 != entry.uncompressed_size {
                    return Err(Error::decode(format!(
                        "{} inflated to {} bytes, expected {}",
                        entry.file_name,
                        out.len(),
                        entry.uncompressed_size
                    )));
                }
                out
            }
            CompressionMethod::Unknown(method) => {
                return Err(Error::decode(format!(
                    "{} uses unsupported compression method {method}",
                    entry.file_name
                )));
            }
        };

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            return Err(Error::decode(format!(
                "CRC mismatch for {} (expected {:08x}, got {:08x})",
                entry.file_name,
                entry.crc32,
                crc.sum()
            )));
        }

        Ok(data)
    }

    /// Decode the whole archive into memory.
    ///
    /// Either every member decodes or the call fails; there is no partial
    /// result.
    pub async fn load(&self) -> Result<Archive> {
        let listing = self.list_entries().await?;
        let mut entries = Vec::with_capacity(listing.len());

        for entry in &listing {
            if entry.is_directory {
                entries.push(ArchiveEntry::directory(entry.file_name.clone()));
                continue;
            }
            let data = self.read_entry(entry).await?;
            tracing::debug!(name = %entry.file_name, bytes = data.len(), "decoded entry");
            entries.push(ArchiveEntry::file(entry.file_name.clone(), data));
        }

        Ok(Archive::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use std::io::{Cursor, Write};

    fn build(method: zip::CompressionMethod, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts =
            zip::write::SimpleFileOptions::default().compression_method(method);
        for (name, data) in files {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn reader(bytes: Vec<u8>) -> ArchiveReader<MemoryReader> {
        ArchiveReader::new(Arc::new(MemoryReader::new(bytes)))
    }

    #[tokio::test]
    async fn loads_deflated_entries() {
        let pcm = vec![7u8; 10_000];
        let bytes = build(
            zip::CompressionMethod::Deflated,
            &[("001.wav", &pcm), ("001.jpg", b"\xFF\xD8\xFF")],
        );
        let archive = reader(bytes).load().await.unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[0].data, pcm);
        assert_eq!(archive.entries()[1].data, b"\xFF\xD8\xFF");
    }

    #[tokio::test]
    async fn crc_mismatch_is_decode_error() {
        let mut bytes = build(zip::CompressionMethod::Stored, &[("001.wav", b"RIFFdata")]);
        let pos = bytes
            .windows(8)
            .position(|w| w == b"RIFFdata")
            .unwrap();
        bytes[pos] = b'X';

        let err = reader(bytes).load().await.unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("CRC")));
    }

    /// One STORED member named `001.wav` whose sizes live in a ZIP64 extra
    /// field and claim `claimed` bytes, with no data behind the header.
    fn oversized_member(claimed: u64) -> Vec<u8> {
        use byteorder::{LittleEndian, WriteBytesExt};
        use crate::zip::{CDFH_SIGNATURE, EndOfCentralDirectory, LFH_SIGNATURE};

        let name = b"001.wav";
        let mut buf = Vec::new();

        buf.extend_from_slice(LFH_SIGNATURE);
        for v in [45u16, 0, 0, 0, 0] {
            buf.write_u16::<LittleEndian>(v).unwrap();
        }
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        buf.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        buf.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.extend_from_slice(name);

        let cd_offset = buf.len() as u32;
        buf.extend_from_slice(CDFH_SIGNATURE);
        for v in [45u16, 45, 0, 0, 0, 0] {
            buf.write_u16::<LittleEndian>(v).unwrap();
        }
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        buf.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        buf.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        buf.write_u16::<LittleEndian>(20).unwrap();
        for v in [0u16, 0, 0] {
            buf.write_u16::<LittleEndian>(v).unwrap();
        }
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.extend_from_slice(name);
        buf.write_u16::<LittleEndian>(0x0001).unwrap();
        buf.write_u16::<LittleEndian>(16).unwrap();
        buf.write_u64::<LittleEndian>(claimed).unwrap();
        buf.write_u64::<LittleEndian>(claimed).unwrap();
        let cd_size = buf.len() as u32 - cd_offset;

        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 1,
            total_entries: 1,
            cd_size,
            cd_offset,
            comment_len: 0,
        }
        .write_to(&mut buf)
        .unwrap();
        buf
    }

    #[tokio::test]
    async fn zip64_member_larger_than_archive_is_decode_error() {
        let r = reader(oversized_member(1 << 62));
        let listing = r.list_entries().await.unwrap();
        assert_eq!(listing[0].compressed_size, 1 << 62);

        let err = r.load().await.unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("001.wav")));
    }

    #[tokio::test]
    async fn zip64_sized_empty_member_loads() {
        let archive = reader(oversized_member(0)).load().await.unwrap();
        assert_eq!(archive.entries(), [ArchiveEntry::file("001.wav", Vec::<u8>::new())]);
    }

    #[tokio::test]
    async fn truncated_archive_is_decode_error() {
        let bytes = build(zip::CompressionMethod::Stored, &[("001.wav", b"RIFFdata")]);
        let err = reader(bytes[..bytes.len() - 10].to_vec())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
