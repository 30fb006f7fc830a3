//! # MOS 6502 Bus Monitor
//!
//! Turns a microcontroller (or, on a host, a simulated bus) into the memory
//! and bus-level debugger of a physical 6502. The monitor samples the CPU's
//! address, data and control lines, answers every read and write cycle from
//! its own memory, and takes commands from a host over a byte channel.
//!
//! ## Host commands
//!
//! | Byte | Arguments | Effect |
//! |------|-----------|--------|
//! | `R` | | pulse RESET, start servicing cycles |
//! | `H` | | stop servicing cycles |
//! | `C` | | resume servicing cycles |
//! | `S` | | clock through one instruction |
//! | `W` | addr (2), data | write one byte |
//! | `M` | addr (2) | read one byte, answered raw |
//! | `L` | addr (2), size (2), data... | bulk write |
//! | `B` | addr (2) | add a breakpoint |
//! | `G` | | unsupported |
//!
//! Addresses and sizes are big-endian. Every reply is a newline-terminated
//! ASCII line except a successful `M`, which is the bare byte.
//!
//! ## Example
//!
//! ```rust
//! use mos6502_bus_monitor::channel::QueueChannel;
//! use mos6502_bus_monitor::config::Timing;
//! use mos6502_bus_monitor::testing::ScriptedBus;
//! use mos6502_bus_monitor::Emulator;
//!
//! let channel = QueueChannel::with_input(&[b'W', 0x00, 0x02, 0x55, b'M', 0x00, 0x02]);
//! let mut emulator = Emulator::new(ScriptedBus::new(), channel, 4096, 10, Timing::default());
//!
//! emulator.handle_command().unwrap();
//! emulator.channel_mut().take_output();
//! emulator.handle_command().unwrap();
//!
//! assert_eq!(emulator.channel().output(), &[0x55]);
//! ```

pub mod breakpoints;
pub mod bus;
pub mod channel;
pub mod config;
pub mod cpu;
pub mod emulator;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod protocol;
pub mod sampler;
pub mod server;
pub mod sim;
pub mod testing;

pub use breakpoints::BreakpointSet;
pub use bus::{BusCycle, ControlLine, Direction, HardwareBus, Level};
pub use channel::ByteChannel;
pub use cpu::RunState;
pub use emulator::Emulator;
pub use memory::MemoryStore;
pub use protocol::Command;
