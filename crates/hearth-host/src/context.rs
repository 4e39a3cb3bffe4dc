//! Host function execution context.
//!
//! `HostContext` wraps a Wasmtime caller so a syscall can borrow guest
//! memory and its store data together.

use wasmtime::Caller;

use crate::error::{HostError, HostResult};

/// Context available to host function implementations.
///
/// Every syscall goes through [`HostContext::split`].
pub struct HostContext<'a, T> {
    /// The Wasmtime caller.
    caller: Caller<'a, T>,
}

impl<'a, T> HostContext<'a, T> {
    /// Create a new host context.
    pub fn new(caller: Caller<'a, T>) -> Self {
        Self { caller }
    }

    /// Access the store data mutably.
    pub fn data_mut(&mut self) -> &mut T {
        self.caller.data_mut()
    }

    fn memory(&mut self) -> HostResult<wasmtime::Memory> {
        self.caller
            .get_export("memory")
            .and_then(|e| e.into_memory())
            .ok_or(HostError::MemoryNotFound)
    }

    /// Borrow guest memory and store data at the same time.
    pub fn split(&mut self) -> HostResult<(GuestMemory<'_>, &mut T)> {
        let memory = self.memory()?;
        let (data, state) = memory.data_and_store_mut(&mut self.caller);
        Ok((GuestMemory::new(data), state))
    }
}

impl<'a, T> std::fmt::Debug for HostContext<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext").finish_non_exhaustive()
    }
}

/// Extension trait for creating host contexts from callers.
pub trait IntoHostContext<'a, T> {
    /// Convert into a host context.
    fn into_context(self) -> HostContext<'a, T>;
}

impl<'a, T> IntoHostContext<'a, T> for Caller<'a, T> {
    fn into_context(self) -> HostContext<'a, T> {
        HostContext::new(self)
    }
}

/// Bounds-checked view of a guest's linear memory.
///
/// Guest pointers are 32-bit offsets. Integers are little-endian; alignment
/// is not enforced.
pub struct GuestMemory<'m> {
    data: &'m mut [u8],
}

impl<'m> GuestMemory<'m> {
    /// Wrap a memory slice.
    pub fn new(data: &'m mut [u8]) -> Self {
        Self { data }
    }

    /// Current memory size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the memory has no pages.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn range(&self, offset: u32, len: u32) -> HostResult<std::ops::Range<usize>> {
        let start = offset as usize;
        let len = len as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(HostError::MemoryAccessOutOfBounds {
                offset: start,
                len,
                memory_size: self.data.len(),
            }),
        }
    }

    /// Borrow `len` bytes at `offset`.
    pub fn slice(&self, offset: u32, len: u32) -> HostResult<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.data[range])
    }

    /// Mutably borrow `len` bytes at `offset`.
    pub fn slice_mut(&mut self, offset: u32, len: u32) -> HostResult<&mut [u8]> {
        let range = self.range(offset, len)?;
        Ok(&mut self.data[range])
    }

    /// Copy `bytes` into memory at `offset`.
    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> HostResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| HostError::MemoryAccessOutOfBounds {
            offset: offset as usize,
            len: bytes.len(),
            memory_size: self.data.len(),
        })?;
        self.slice_mut(offset, len)?.copy_from_slice(bytes);
        Ok(())
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&self, offset: u32) -> HostResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.slice(offset, 4)?);
        Ok(u32::from_le_bytes(raw))
    }

    /// Write a little-endian `u32`.
    pub fn write_u32(&mut self, offset: u32, value: u32) -> HostResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Write a little-endian `u64`.
    pub fn write_u64(&mut self, offset: u32, value: u64) -> HostResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Read a UTF-8 string of exactly `len` bytes.
    pub fn read_str(&self, offset: u32, len: u32) -> HostResult<&str> {
        std::str::from_utf8(self.slice(offset, len)?)
            .map_err(|e| HostError::InvalidUtf8(e.to_string()))
    }

    /// Read an array of `count` iovecs (`{ buf: u32, buf_len: u32 }`).
    pub fn iovecs(&self, offset: u32, count: u32) -> HostResult<Vec<(u32, u32)>> {
        let bytes = self.slice(offset, count.saturating_mul(8))?;
        Ok(bytes
            .chunks_exact(8)
            .map(|iov| {
                let buf = u32::from_le_bytes([iov[0], iov[1], iov[2], iov[3]]);
                let len = u32::from_le_bytes([iov[4], iov[5], iov[6], iov[7]]);
                (buf, len)
            })
            .collect())
    }

    /// Lay out `entries` the way `args_get` and `environ_get` return them.
    ///
    /// Each entry is copied NUL-terminated into the buffer at `buf`, and its
    /// address is stored in the pointer array at `ptrs`.
    pub fn write_string_vector(
        &mut self,
        ptrs: u32,
        buf: u32,
        entries: &[String],
    ) -> HostResult<()> {
        let mut cursor = buf;
        for (index, entry) in entries.iter().enumerate() {
            let slot = u32::try_from(index)
                .ok()
                .and_then(|index| index.checked_mul(4))
                .and_then(|offset| ptrs.checked_add(offset))
                .ok_or_else(|| self.overflow(ptrs, 4))?;
            self.write_u32(slot, cursor)?;

            let len = u32::try_from(entry.len()).map_err(|_| self.overflow(cursor, u32::MAX))?;
            self.write_bytes(cursor, entry.as_bytes())?;
            let nul = cursor.checked_add(len).ok_or_else(|| self.overflow(cursor, len))?;
            self.write_bytes(nul, &[0])?;
            cursor = nul.checked_add(1).ok_or_else(|| self.overflow(nul, 1))?;
        }
        Ok(())
    }

    fn overflow(&self, offset: u32, len: u32) -> HostError {
        HostError::MemoryAccessOutOfBounds {
            offset: offset as usize,
            len: len as usize,
            memory_size: self.data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_checks() {
        let mut data = vec![0u8; 16];
        let mut memory = GuestMemory::new(&mut data);

        assert!(memory.write_u32(12, 7).is_ok());
        assert_eq!(memory.read_u32(12).unwrap(), 7);
        assert!(matches!(
            memory.write_u32(13, 7),
            Err(HostError::MemoryAccessOutOfBounds { offset: 13, len: 4, memory_size: 16 })
        ));
        assert!(memory.slice(u32::MAX, 2).is_err());
    }

    #[test]
    fn test_iovecs() {
        let mut data = vec![0u8; 32];
        let mut memory = GuestMemory::new(&mut data);
        memory.write_u32(0, 100).unwrap();
        memory.write_u32(4, 5).unwrap();
        memory.write_u32(8, 200).unwrap();
        memory.write_u32(12, 6).unwrap();

        assert_eq!(memory.iovecs(0, 2).unwrap(), vec![(100, 5), (200, 6)]);
        assert!(memory.iovecs(24, 2).is_err());
    }

    #[test]
    fn test_write_string_vector() {
        let mut data = vec![0u8; 64];
        let mut memory = GuestMemory::new(&mut data);
        let entries = vec!["FOO=bar".to_string(), "X=".to_string()];

        memory.write_string_vector(0, 16, &entries).unwrap();

        assert_eq!(memory.read_u32(0).unwrap(), 16);
        assert_eq!(memory.read_u32(4).unwrap(), 24);
        assert_eq!(memory.slice(16, 11).unwrap(), b"FOO=bar\0X=\0");
    }

    #[test]
    fn test_read_str_rejects_invalid_utf8() {
        let mut data = vec![0xff, 0xfe, b'a'];
        let memory = GuestMemory::new(&mut data);
        assert!(matches!(memory.read_str(0, 2), Err(HostError::InvalidUtf8(_))));
        assert_eq!(memory.read_str(2, 1).unwrap(), "a");
    }
}
