use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::io::Write;

use crate::error::{Error, Result};

use super::structures::{
    CentralDirectoryEntry, CompressionMethod, EndOfCentralDirectory, FLAG_UTF8,
};

/// DOS date for 1980-01-01, the earliest representable timestamp.
///
/// Output archives carry a fixed timestamp so identical input produces
/// byte-identical output.
const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// In-memory ZIP writer.
///
/// Entries are appended with [`add_entry`](Self::add_entry) and the central
/// directory is emitted by [`finish`](Self::finish). Sizes and offsets are
/// limited to 32 bits; ZIP64 output is not produced.
pub struct ArchiveWriter {
    method: CompressionMethod,
    buf: Vec<u8>,
    central: Vec<CentralDirectoryEntry>,
}

impl ArchiveWriter {
    pub fn new(method: CompressionMethod) -> Result<Self> {
        if let CompressionMethod::Unknown(m) = method {
            return Err(Error::output(format!(
                "cannot write compression method {m}"
            )));
        }
        Ok(Self {
            method,
            buf: Vec::new(),
            central: Vec::new(),
        })
    }

    /// Append one file entry.
    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(Error::output(format!("invalid entry name {name:?}")));
        }
        if self.central.len() >= u16::MAX as usize {
            return Err(Error::output("too many entries for a non-ZIP64 archive"));
        }

        let mut crc = Crc::new();
        crc.update(data);

        let compressed = match self.method {
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?
            }
            _ => data.to_vec(),
        };

        let lfh_offset = self.buf.len() as u64;
        for (what, value) in [
            ("entry size", data.len() as u64),
            ("compressed size", compressed.len() as u64),
            ("entry offset", lfh_offset),
        ] {
            if value >= u32::MAX as u64 {
                return Err(Error::output(format!(
                    "{name}: {what} {value} needs ZIP64, which is not written"
                )));
            }
        }

        let entry = CentralDirectoryEntry {
            file_name: name.to_string(),
            flags: FLAG_UTF8,
            compression_method: self.method,
            compressed_size: compressed.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32: crc.sum(),
            lfh_offset,
            last_mod_time: 0,
            last_mod_date: DOS_EPOCH_DATE,
            is_directory: false,
        };
        entry.write_local_header(&mut self.buf)?;
        self.buf.extend_from_slice(&compressed);

        tracing::debug!(name, bytes = data.len(), stored = compressed.len(), "wrote entry");
        self.central.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.central.len()
    }

    pub fn is_empty(&self) -> bool {
        self.central.is_empty()
    }

    /// Write the central directory and end record, returning the archive bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let cd_offset = self.buf.len() as u64;
        for entry in &self.central {
            entry.write_central_header(&mut self.buf)?;
        }
        let cd_size = self.buf.len() as u64 - cd_offset;

        if cd_offset >= u32::MAX as u64 || cd_size >= u32::MAX as u64 {
            return Err(Error::output("archive exceeds 4 GiB, ZIP64 is not written"));
        }

        let count = self.central.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        }
        .write_to(&mut self.buf)?;

        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn stored_archive_reads_back() {
        let mut writer = ArchiveWriter::new(CompressionMethod::Stored).unwrap();
        writer.add_entry("001.mp3", b"RIFF one").unwrap();
        writer.add_entry("Album/Intro.mp3", b"RIFF two").unwrap();
        assert_eq!(writer.len(), 2);

        let files = read_back(writer.finish().unwrap());
        assert_eq!(
            files,
            vec![
                ("001.mp3".to_string(), b"RIFF one".to_vec()),
                ("Album/Intro.mp3".to_string(), b"RIFF two".to_vec()),
            ]
        );
    }

    #[test]
    fn deflated_archive_reads_back() {
        let pcm = vec![0x55u8; 50_000];
        let mut writer = ArchiveWriter::new(CompressionMethod::Deflate).unwrap();
        writer.add_entry("track.mp3", &pcm).unwrap();
        let bytes = writer.finish().unwrap();
        assert!(bytes.len() < pcm.len());

        let files = read_back(bytes);
        assert_eq!(files[0].1, pcm);
    }

    #[test]
    fn empty_archive_is_just_an_end_record() {
        let writer = ArchiveWriter::new(CompressionMethod::Stored).unwrap();
        assert!(writer.is_empty());
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(zip::ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 0);
    }

    #[test]
    fn rejects_unknown_method_and_empty_names() {
        assert!(matches!(
            ArchiveWriter::new(CompressionMethod::Unknown(12)),
            Err(Error::Output(_))
        ));
        let mut writer = ArchiveWriter::new(CompressionMethod::Stored).unwrap();
        assert!(matches!(writer.add_entry("", b"x"), Err(Error::Output(_))));
    }
}
