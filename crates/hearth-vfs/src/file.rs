//! Virtual files and the handles that read and write them.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{VfsError, VfsResult};

/// Largest size a virtual file may grow to (4 GiB, the wasm32 address space).
pub const MAX_FILE_SIZE: u64 = 1 << 32;

/// An in-memory file.
///
/// Cloning a `VirtualFile` produces another reference to the same buffer, so
/// writes through one clone are visible through every other. Use
/// [`VirtualFile::ptr_eq`] to check whether two values are the same file.
#[derive(Clone, Default)]
pub struct VirtualFile {
    data: Arc<RwLock<Vec<u8>>>,
}

impl VirtualFile {
    /// Create a file holding the given bytes.
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(RwLock::new(contents.into())),
        }
    }

    /// Create an empty file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Current length in bytes.
    pub fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    /// Whether the file holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Whether both values refer to the same underlying buffer.
    pub fn ptr_eq(&self, other: &VirtualFile) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Discard all contents.
    pub fn truncate(&self) {
        self.data.write().clear();
    }

    /// Copy bytes starting at `offset` into `buf`, returning how many were copied.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let data = self.data.read();
        let start = match usize::try_from(offset) {
            Ok(start) if start < data.len() => start,
            _ => return 0,
        };
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        count
    }

    /// Write `bytes` at `offset`, growing (and zero-filling) the buffer as needed.
    ///
    /// Fails with [`VfsError::FileTooLarge`] if the write would end past
    /// `max_size` (itself clamped to [`MAX_FILE_SIZE`]).
    pub fn write_at(&self, offset: u64, bytes: &[u8], max_size: u64) -> VfsResult<usize> {
        let limit = max_size.min(MAX_FILE_SIZE);
        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|end| *end <= limit)
            .ok_or(VfsError::FileTooLarge {
                requested: offset.saturating_add(bytes.len() as u64),
            })?;

        let mut data = self.data.write();
        let (start, end) = (offset as usize, end as usize);
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

impl std::fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFile")
            .field("len", &self.len())
            .finish()
    }
}

impl From<Vec<u8>> for VirtualFile {
    fn from(contents: Vec<u8>) -> Self {
        Self::new(contents)
    }
}

impl From<&[u8]> for VirtualFile {
    fn from(contents: &[u8]) -> Self {
        Self::new(contents)
    }
}

impl From<&str> for VirtualFile {
    fn from(contents: &str) -> Self {
        Self::new(contents.as_bytes())
    }
}

/// Reference point for [`OpenFile::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Whence {
    /// From the start of the file.
    Set = 0,
    /// From the current cursor.
    Cur = 1,
    /// From the end of the file.
    End = 2,
}

impl Whence {
    /// Decode the raw WASI whence value.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Whence::Set),
            1 => Some(Whence::Cur),
            2 => Some(Whence::End),
            _ => None,
        }
    }
}

/// How an [`OpenFile`] applies writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Reads and writes happen at the cursor.
    #[default]
    Read,
    /// Writes always land at the end of the file.
    Append,
}

/// A cursor over a [`VirtualFile`].
#[derive(Debug, Clone)]
pub struct OpenFile {
    file: VirtualFile,
    position: u64,
    mode: OpenMode,
    max_size: u64,
}

impl OpenFile {
    /// Open `file` with the cursor at 0.
    pub fn new(file: VirtualFile, mode: OpenMode) -> Self {
        Self {
            file,
            position: 0,
            mode,
            max_size: MAX_FILE_SIZE,
        }
    }

    /// Cap how large writes through this handle may grow the file.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.set_max_size(bytes);
        self
    }

    pub(crate) fn set_max_size(&mut self, bytes: u64) {
        self.max_size = bytes.min(MAX_FILE_SIZE);
    }

    /// Largest size writes through this handle may grow the file to.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// The file this handle reads and writes.
    pub fn file(&self) -> &VirtualFile {
        &self.file
    }

    /// The mode the handle was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current cursor position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Read up to `buf.len()` bytes from the cursor. Returns 0 at end of data.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = self.file.read_at(self.position, buf);
        self.position += count as u64;
        count
    }

    /// Write `bytes` at the cursor (or at the end in append mode).
    pub fn write(&mut self, bytes: &[u8]) -> VfsResult<usize> {
        if self.mode == OpenMode::Append {
            self.position = self.file.len();
        }
        let count = self.file.write_at(self.position, bytes, self.max_size)?;
        self.position += count as u64;
        Ok(count)
    }

    /// Move the cursor and return its new position.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> VfsResult<u64> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.position,
            Whence::End => self.file.len(),
        };

        let target = i128::from(base) + i128::from(offset);
        let position =
            u64::try_from(target).map_err(|_| VfsError::InvalidOffset { offset, whence })?;

        self.position = position;
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_same_handle() {
        let mut handle = OpenFile::new(VirtualFile::empty(), OpenMode::Read);

        assert_eq!(handle.write(b"hello world").unwrap(), 11);
        handle.seek(0, Whence::Set).unwrap();

        let mut buf = [0u8; 32];
        let n = handle.read(&mut buf);
        assert_eq!(&buf[..n], b"hello world");
        assert_eq!(handle.read(&mut buf), 0);
    }

    #[test]
    fn test_write_visible_through_other_handle() {
        let file = VirtualFile::empty();
        let mut writer = OpenFile::new(file.clone(), OpenMode::Read);
        let mut reader = OpenFile::new(file.clone(), OpenMode::Read);

        writer.write(b"shared").unwrap();

        let mut buf = [0u8; 6];
        assert_eq!(reader.read(&mut buf), 6);
        assert_eq!(&buf, b"shared");
        assert_eq!(file.contents(), b"shared");
    }

    #[test]
    fn test_partial_reads_advance_cursor() {
        let mut handle = OpenFile::new(VirtualFile::from("abcdef"), OpenMode::Read);
        let mut buf = [0u8; 4];

        assert_eq!(handle.read(&mut buf), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(handle.tell(), 4);

        assert_eq!(handle.read(&mut buf), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(handle.read(&mut buf), 0);
    }

    #[test]
    fn test_overwrite_in_the_middle() {
        let file = VirtualFile::from("abcdef");
        let mut handle = OpenFile::new(file.clone(), OpenMode::Read);

        handle.seek(2, Whence::Set).unwrap();
        handle.write(b"XY").unwrap();

        assert_eq!(file.contents(), b"abXYef");
        assert_eq!(handle.tell(), 4);
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let file = VirtualFile::from("ab");
        let mut handle = OpenFile::new(file.clone(), OpenMode::Read);

        handle.seek(4, Whence::Set).unwrap();
        handle.write(b"z").unwrap();

        assert_eq!(file.contents(), b"ab\0\0z");
    }

    #[test]
    fn test_append_mode_writes_at_end() {
        let file = VirtualFile::from("log:");
        let mut handle = OpenFile::new(file.clone(), OpenMode::Append);
        assert_eq!(handle.tell(), 0);

        handle.write(b"one").unwrap();
        handle.seek(0, Whence::Set).unwrap();
        handle.write(b"two").unwrap();

        assert_eq!(file.contents(), b"log:onetwo");
        assert_eq!(handle.tell(), 10);
    }

    #[test]
    fn test_seek_variants() {
        let mut handle = OpenFile::new(VirtualFile::from("0123456789"), OpenMode::Read);

        assert_eq!(handle.seek(3, Whence::Set).unwrap(), 3);
        assert_eq!(handle.seek(2, Whence::Cur).unwrap(), 5);
        assert_eq!(handle.seek(-1, Whence::End).unwrap(), 9);
        assert_eq!(handle.seek(5, Whence::End).unwrap(), 15);
    }

    #[test]
    fn test_negative_seek_is_rejected() {
        let mut handle = OpenFile::new(VirtualFile::from("abc"), OpenMode::Read);
        handle.seek(1, Whence::Set).unwrap();

        let err = handle.seek(-2, Whence::Cur).unwrap_err();
        assert_eq!(
            err,
            VfsError::InvalidOffset {
                offset: -2,
                whence: Whence::Cur
            }
        );
        // The cursor is untouched after a failed seek.
        assert_eq!(handle.tell(), 1);
        assert!(handle.seek(-4, Whence::End).is_err());
        assert!(handle.seek(-1, Whence::Set).is_err());
    }

    #[test]
    fn test_write_beyond_max_size_fails() {
        let mut handle = OpenFile::new(VirtualFile::empty(), OpenMode::Read);
        handle.seek(MAX_FILE_SIZE as i64, Whence::Set).unwrap();

        let err = handle.write(b"x").unwrap_err();
        assert!(matches!(err, VfsError::FileTooLarge { .. }));
        assert!(handle.file().is_empty());
    }

    #[test]
    fn test_write_past_handle_cap_fails() {
        let file = VirtualFile::from("abc");
        let mut handle = OpenFile::new(file.clone(), OpenMode::Read).with_max_size(8);
        assert_eq!(handle.max_size(), 8);

        handle.seek(5, Whence::Set).unwrap();
        assert_eq!(handle.write(b"xyz").unwrap(), 3);
        assert_eq!(file.len(), 8);

        let err = handle.write(b"!").unwrap_err();
        assert_eq!(err, VfsError::FileTooLarge { requested: 9 });
        assert_eq!(file.len(), 8);

        handle.seek(1 << 30, Whence::Set).unwrap();
        assert!(handle.write(b"!").is_err());
        assert_eq!(file.len(), 8);

        let unbounded =
            OpenFile::new(VirtualFile::empty(), OpenMode::Read).with_max_size(u64::MAX);
        assert_eq!(unbounded.max_size(), MAX_FILE_SIZE);
    }

    #[test]
    fn test_ptr_eq_and_truncate() {
        let file = VirtualFile::from("data");
        let alias = file.clone();
        let other = VirtualFile::from("data");

        assert!(file.ptr_eq(&alias));
        assert!(!file.ptr_eq(&other));

        alias.truncate();
        assert!(file.is_empty());
    }

    #[test]
    fn test_whence_from_raw() {
        assert_eq!(Whence::from_raw(0), Some(Whence::Set));
        assert_eq!(Whence::from_raw(2), Some(Whence::End));
        assert_eq!(Whence::from_raw(3), None);
    }
}
