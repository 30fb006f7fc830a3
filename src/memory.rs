use thiserror::Error;

/// Value seen on the data bus when the CPU reads an address the store does not back.
pub const OPEN_BUS: u8 = 0xFF;

/// Largest store a 16-bit address bus can reach.
pub const MAX_MEMORY_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address ${address:04X} outside {size}-byte memory")]
    OutOfRange { address: u16, size: usize },
}

/// Byte-addressable memory served to the CPU, bounds-checked against a
/// configurable size. Addresses at or above the size are not stored.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new(size: usize) -> Self {
        MemoryStore {
            data: vec![0; size.min(MAX_MEMORY_SIZE)],
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn read(&self, address: u16) -> Result<u8, MemoryError> {
        self.data
            .get(address as usize)
            .copied()
            .ok_or(MemoryError::OutOfRange {
                address,
                size: self.data.len(),
            })
    }

    /// Read for the bus path, where an unbacked address yields `OPEN_BUS`.
    pub fn read_or_open_bus(&self, address: u16) -> u8 {
        self.read(address).unwrap_or(OPEN_BUS)
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        let size = self.data.len();
        match self.data.get_mut(address as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MemoryError::OutOfRange { address, size }),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
