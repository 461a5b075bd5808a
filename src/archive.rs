//! Zip assembly for folder downloads
//!
//! Objects are appended one at a time: each source is fully copied into its
//! entry before the next one is opened, so at most one object body is held
//! besides the archive sink itself. Entry names are the object keys relative
//! to the downloaded folder.

use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::path::{relative_to, DELIMITER};

/// Default deflate level, as used for local archives
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 6;

/// Writes store objects into a zip archive
pub struct ZipAssembler<W: Write + Seek> {
    zip: ZipWriter<W>,
    base_prefix: String,
    options: SimpleFileOptions,
    entries: usize,
}

impl ZipAssembler<Cursor<Vec<u8>>> {
    /// Assembler writing into an in-memory buffer
    pub fn in_memory(base_prefix: &str, compression_level: i64) -> Self {
        Self::new(Cursor::new(Vec::new()), base_prefix, compression_level)
    }
}

impl<W: Write + Seek> ZipAssembler<W> {
    /// Create an assembler naming entries relative to `base_prefix`.
    ///
    /// A `compression_level` of 0 stores entries uncompressed.
    pub fn new(sink: W, base_prefix: &str, compression_level: i64) -> Self {
        // Stored entries take no level; zip refuses Some(0) for them
        let options = if compression_level == 0 {
            SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .compression_level(None)
        } else {
            SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .compression_level(Some(compression_level))
        };

        Self {
            zip: ZipWriter::new(sink),
            base_prefix: base_prefix.to_string(),
            options,
            entries: 0,
        }
    }

    /// Entry name for `key`, or `None` for the base folder itself
    pub fn entry_name(&self, key: &str) -> Option<String> {
        let name = relative_to(key, &self.base_prefix);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Append the object stored under `key`.
    ///
    /// Folder keys become directory entries and `source` is not read.
    /// Returns whether an entry was written.
    pub fn append<R: Read>(&mut self, key: &str, source: &mut R) -> zip::result::ZipResult<bool> {
        let Some(name) = self.entry_name(key) else {
            return Ok(false);
        };

        if name.ends_with(DELIMITER) {
            self.zip.add_directory(name, self.options)?;
        } else {
            self.zip.start_file(name, self.options)?;
            std::io::copy(source, &mut self.zip)?;
        }

        self.entries += 1;
        Ok(true)
    }

    /// Number of entries written so far
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Write the central directory and hand back the sink
    pub fn finish(self) -> zip::result::ZipResult<W> {
        self.zip.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            entries.push((entry.name().to_string(), data));
        }
        entries
    }

    #[test]
    fn test_entries_are_relative_to_base() {
        let mut assembler = ZipAssembler::in_memory("user-1-files/x/", DEFAULT_COMPRESSION_LEVEL);

        assert!(!assembler.append("user-1-files/x/", &mut std::io::empty()).unwrap());
        assert!(assembler.append("user-1-files/x/a.txt", &mut &b"alpha"[..]).unwrap());
        assert!(assembler.append("user-1-files/x/sub/", &mut std::io::empty()).unwrap());
        assert!(assembler.append("user-1-files/x/sub/b.txt", &mut &b"beta"[..]).unwrap());
        assert_eq!(assembler.entries(), 3);

        let bytes = assembler.finish().unwrap().into_inner();
        let entries = read_back(bytes);
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub/", "sub/b.txt"]);
        assert_eq!(entries[0].1, b"alpha".to_vec());
        assert_eq!(entries[2].1, b"beta".to_vec());
    }

    #[test]
    fn test_stored_archive() {
        let mut assembler = ZipAssembler::in_memory("p/", 0);
        assembler.append("p/empty.bin", &mut std::io::empty()).unwrap();
        assembler.append("p/sub/", &mut std::io::empty()).unwrap();
        assembler.append("p/sub/data.txt", &mut &b"stored bytes"[..]).unwrap();
        let bytes = assembler.finish().unwrap().into_inner();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        {
            let entry = archive.by_index(0).unwrap();
            assert_eq!(entry.name(), "empty.bin");
            assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
            assert_eq!(entry.size(), 0);
        }
        let mut entry = archive.by_name("sub/data.txt").unwrap();
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"stored bytes".to_vec());
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let assembler = ZipAssembler::in_memory("p/", DEFAULT_COMPRESSION_LEVEL);
        let bytes = assembler.finish().unwrap().into_inner();
        assert_eq!(ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 0);
    }
}
