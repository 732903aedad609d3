use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("offset {offset:#x} is not 16-bit aligned")]
    Misaligned { offset: usize },

    #[error("range {offset:#x}+{len:#x} exceeds core memory of {size:#x} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
}

/// Read-only view of the core's linear memory.
///
/// All offset arithmetic for data coming out of the core goes through here so
/// that a bad offset from the core turns into an error instead of a panic.
#[derive(Clone, Copy, Debug)]
pub struct LinearMemory<'a> {
    bytes: &'a [u8],
}

impl<'a> LinearMemory<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], MemoryError> {
        let bytes = self.bytes;
        checked_range(offset, len, bytes.len()).map(|r| &bytes[r])
    }

    /// Iterates `count` little-endian 16-bit words starting at `offset`.
    pub fn words(
        self,
        offset: usize,
        count: usize,
    ) -> Result<impl Iterator<Item = u16> + 'a, MemoryError> {
        if offset % 2 != 0 {
            return Err(MemoryError::Misaligned { offset });
        }
        let Some(len) = count.checked_mul(2) else {
            return Err(MemoryError::OutOfBounds {
                offset,
                len: usize::MAX,
                size: self.bytes.len(),
            });
        };
        let raw = self.bytes(offset, len)?;
        Ok(raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]])))
    }
}

/// Writable view of the core's linear memory, used when the host fills a
/// buffer the core handed out (ROM image, save memory).
#[derive(Debug)]
pub struct LinearMemoryMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> LinearMemoryMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], MemoryError> {
        let range = checked_range(offset, len, self.bytes.len())?;
        Ok(&mut self.bytes[range])
    }
}

fn checked_range(
    offset: usize,
    len: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, MemoryError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(MemoryError::OutOfBounds { offset, len, size }),
    }
}
