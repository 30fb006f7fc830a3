use std::time::Duration;

/// CPU control lines wired to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlLine {
    /// Active low, driven by the monitor.
    Reset,
    /// High while the CPU reads, low while it writes. Input.
    ReadWrite,
    /// Active low, driven by the monitor (held inactive).
    Irq,
    /// Active low, driven by the monitor (held inactive).
    Nmi,
    /// High during opcode fetch. Input.
    Sync,
    /// Phase 0 clock, driven by the monitor when stepping.
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

/// One observed bus transaction. Lives only for the cycle that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCycle {
    pub address: u16,
    pub direction: Direction,
    pub data: u8,
}

/// Pin-level access to the 6502's address, data and control lines.
///
/// Implemented by a platform adapter. Every method must complete within
/// the CPU's clock half-period except `delay`, which blocks for exactly the
/// requested settle time.
pub trait HardwareBus {
    /// Both halves of the address bus, sampled as one coherent value.
    fn read_address(&mut self) -> u16;

    /// Switch the data bus to input and sample it.
    fn read_data(&mut self) -> u8;

    /// Switch the data bus to output and drive `value`.
    fn drive_data(&mut self, value: u8);

    /// Return the data bus to high impedance.
    fn release_data(&mut self);

    fn read_control(&mut self, line: ControlLine) -> Level;

    fn set_control(&mut self, line: ControlLine, level: Level);

    fn delay(&mut self, duration: Duration);
}

impl<B: HardwareBus + ?Sized> HardwareBus for &mut B {
    fn read_address(&mut self) -> u16 {
        (**self).read_address()
    }

    fn read_data(&mut self) -> u8 {
        (**self).read_data()
    }

    fn drive_data(&mut self, value: u8) {
        (**self).drive_data(value)
    }

    fn release_data(&mut self) {
        (**self).release_data()
    }

    fn read_control(&mut self, line: ControlLine) -> Level {
        (**self).read_control(line)
    }

    fn set_control(&mut self, line: ControlLine, level: Level) {
        (**self).set_control(line, level)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}
