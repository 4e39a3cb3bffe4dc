//! Module byte sources.
//!
//! The runtime never fetches modules itself. It asks a [`ModuleSource`] for
//! the raw bytes, which keeps network retrieval and packaging outside the
//! host.

use std::io::Read;
use std::path::{Path, PathBuf};

/// Something that can deliver the bytes of a WebAssembly module.
pub trait ModuleSource {
    /// Short description used in logs and errors.
    fn describe(&self) -> String;

    /// Produce the module bytes.
    fn fetch(&mut self) -> std::io::Result<Vec<u8>>;
}

/// A module stored on the host filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Read the module at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModuleSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&mut self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

/// A module already held in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    name: String,
    bytes: Vec<u8>,
}

impl BytesSource {
    /// Wrap `bytes`, described as `name`.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl ModuleSource for BytesSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn fetch(&mut self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

/// A module streamed from any reader, such as a response body or a pipe.
#[derive(Debug)]
pub struct ReaderSource<R> {
    name: String,
    reader: R,
}

impl<R: Read> ReaderSource<R> {
    /// Read the module from `reader` until end of stream.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

impl<R: Read> ModuleSource for ReaderSource<R> {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn fetch(&mut self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_source() {
        let mut source = BytesSource::new("inline", vec![0x00, 0x61, 0x73, 0x6d]);
        assert_eq!(source.describe(), "inline");
        assert_eq!(source.fetch().unwrap(), b"\0asm");
    }

    #[test]
    fn test_reader_source() {
        let mut source = ReaderSource::new("stream", std::io::Cursor::new(b"payload".to_vec()));
        assert_eq!(source.fetch().unwrap(), b"payload");
    }

    #[test]
    fn test_missing_file_source() {
        let mut source = FileSource::new("/definitely/not/here.wasm");
        assert!(source.fetch().is_err());
        assert_eq!(source.describe(), "/definitely/not/here.wasm");
    }
}
