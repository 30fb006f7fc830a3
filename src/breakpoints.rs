use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BreakpointError {
    #[error("breakpoint set already holds {capacity} entries")]
    CapacityExceeded { capacity: usize },
}

/// Fixed-capacity, insertion-ordered list of watched addresses.
///
/// Duplicates are kept. Entries live until power-off; there is no removal.
#[derive(Debug, Clone)]
pub struct BreakpointSet {
    addresses: Vec<u16>,
    capacity: usize,
}

impl BreakpointSet {
    pub fn new(capacity: usize) -> Self {
        BreakpointSet {
            addresses: Vec::new(),
            capacity,
        }
    }

    pub fn add(&mut self, address: u16) -> Result<(), BreakpointError> {
        if self.addresses.len() >= self.capacity {
            return Err(BreakpointError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.addresses.push(address);
        Ok(())
    }

    // Checked once per bus cycle.
    pub fn contains(&self, address: u16) -> bool {
        self.addresses.iter().any(|&bp| bp == address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.addresses.iter().copied()
    }
}
