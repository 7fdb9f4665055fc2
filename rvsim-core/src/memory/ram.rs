//! The single physical RAM window backing non-MMIO loads and stores.

/// A contiguous, byte-addressable RAM region.
///
/// Only one window is supported; it is sized once at construction and never resized.
#[derive(Debug, Clone)]
pub struct Ram {
    bytes: Vec<u8>,
}

impl Ram {
    /// Creates a zero-initialized RAM window of `len` bytes.
    pub fn new(len: u32) -> Self {
        Self {
            bytes: vec![0; len as usize],
        }
    }

    /// The size of this window in bytes.
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Resets every byte to zero, in place.
    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }

    /// Reads `buf.len()` bytes starting at `offset`. Bytes that fall outside the window are left
    /// at their existing value in `buf` (callers pre-zero when OOB should read as zero).
    pub fn read(&self, offset: u32, buf: &mut [u8]) {
        let offset = offset as usize;
        for (i, slot) in buf.iter_mut().enumerate() {
            if let Some(byte) = self.bytes.get(offset + i) {
                *slot = *byte;
            }
        }
    }

    /// Writes `buf` starting at `offset`. Bytes that fall outside the window are silently
    /// dropped.
    pub fn write(&mut self, offset: u32, buf: &[u8]) {
        let offset = offset as usize;
        for (i, byte) in buf.iter().enumerate() {
            if let Some(slot) = self.bytes.get_mut(offset + i) {
                *slot = *byte;
            }
        }
    }

    /// Copies `data` into the window starting at `offset`, used by the ELF loader to place
    /// `PT_LOAD` segment contents. Bytes beyond the window are silently dropped, mirroring
    /// [`Self::write`].
    pub fn load(&mut self, offset: u32, data: &[u8]) {
        self.write(offset, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let mut ram = Ram::new(16);
        ram.write(4, &[1, 2, 3, 4]);
        let mut buf = [0u8; 4];
        ram.read(4, &mut buf);
        assert_eq!([1, 2, 3, 4], buf);
    }

    #[test]
    fn out_of_bounds_access_is_dropped_not_panicking() {
        let mut ram = Ram::new(4);
        ram.write(2, &[1, 2, 3, 4]);
        let mut buf = [0xFFu8; 4];
        ram.read(2, &mut buf);
        assert_eq!([1, 2, 0xFF, 0xFF], buf);
    }

    #[test]
    fn reset_clears_contents() {
        let mut ram = Ram::new(4);
        ram.write(0, &[1, 2, 3, 4]);
        ram.reset();
        let mut buf = [0xFFu8; 4];
        ram.read(0, &mut buf);
        assert_eq!([0, 0, 0, 0], buf);
    }
}
