use thiserror::Error;

use crate::breakpoints::BreakpointError;
use crate::memory::MemoryError;

/// Failures reported back to the host by the command protocol.
///
/// The `Display` text is exactly what follows `Error: ` on the wire, so the
/// dispatcher can format every reply from the error itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid address.")]
    OutOfRangeAddress { address: u16 },

    #[error("Maximum number of breakpoints reached.")]
    BreakpointCapacityExceeded { capacity: usize },

    #[error("Invalid address during load.")]
    LoadAborted { address: u16, index: u16, size: u16 },

    #[error("Register reading not supported.")]
    RegistersUnsupported,

    #[error("Unknown command.")]
    UnknownCommand { byte: u8 },
}

impl CommandError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::OutOfRangeAddress { .. } => "out_of_range_address",
            CommandError::BreakpointCapacityExceeded { .. } => "breakpoint_capacity_exceeded",
            CommandError::LoadAborted { .. } => "load_aborted",
            CommandError::RegistersUnsupported => "registers_unsupported",
            CommandError::UnknownCommand { .. } => "unknown_command",
        }
    }
}

impl From<MemoryError> for CommandError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfRange { address, .. } => {
                CommandError::OutOfRangeAddress { address }
            }
        }
    }
}

impl From<BreakpointError> for CommandError {
    fn from(err: BreakpointError) -> Self {
        match err {
            BreakpointError::CapacityExceeded { capacity } => {
                CommandError::BreakpointCapacityExceeded { capacity }
            }
        }
    }
}

/// Transport failures of the byte channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("byte channel closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("memory size must be between 1 and 65536 bytes, got {0}")]
    InvalidMemorySize(usize),

    #[error("breakpoint capacity must be at least 1")]
    ZeroBreakpointCapacity,
}
