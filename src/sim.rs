use std::time::{Duration, Instant};

use crate::bus::{ControlLine, HardwareBus, Level};

/// Data bus value when nothing drives it (pull-ups).
const FLOATING_DATA: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SledPhase {
    OpcodeFetch,
    DummyRead,
}

/// Host-side stand-in for the 6502 and its wiring.
///
/// The simulated CPU executes an endless NOP sled from `start_address`:
/// every instruction is an opcode fetch with SYNC high followed by a dummy
/// read of the next byte, then the program counter advances by one. Only
/// bus timing is modelled; the bytes served back are recorded but never
/// decoded.
///
/// A falling clock edge from the monitor advances one cycle. With
/// `free_running` set, a sample taken without a preceding edge also
/// advances, as if an external oscillator were clocking the CPU.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    start_address: u16,
    free_running: bool,
    pc: u16,
    address: u16,
    sync: bool,
    phase: SledPhase,
    reset: Level,
    clock: Level,
    irq: Level,
    nmi: Level,
    pending_edge: bool,
    driving: Option<u8>,
    last_driven: Option<u8>,
    cycles: u64,
}

impl SimulatedBus {
    pub fn new(start_address: u16, free_running: bool) -> Self {
        SimulatedBus {
            start_address,
            free_running,
            pc: start_address,
            address: start_address,
            sync: false,
            phase: SledPhase::OpcodeFetch,
            reset: Level::Low,
            clock: Level::Low,
            irq: Level::High,
            nmi: Level::High,
            pending_edge: false,
            driving: None,
            last_driven: None,
            cycles: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn in_reset(&self) -> bool {
        self.reset == Level::Low
    }

    pub fn is_driving(&self) -> bool {
        self.driving.is_some()
    }

    pub fn last_driven(&self) -> Option<u8> {
        self.last_driven
    }

    fn advance(&mut self) {
        match self.phase {
            SledPhase::OpcodeFetch => {
                self.address = self.pc;
                self.sync = true;
                self.phase = SledPhase::DummyRead;
            }
            SledPhase::DummyRead => {
                self.address = self.pc.wrapping_add(1);
                self.sync = false;
                self.pc = self.pc.wrapping_add(1);
                self.phase = SledPhase::OpcodeFetch;
            }
        }
        self.cycles += 1;
    }

    fn restart(&mut self) {
        self.pc = self.start_address;
        self.address = self.start_address;
        self.sync = false;
        self.phase = SledPhase::OpcodeFetch;
        self.pending_edge = false;
    }
}

impl HardwareBus for SimulatedBus {
    fn read_address(&mut self) -> u16 {
        if !self.in_reset() && (self.pending_edge || self.free_running) {
            self.advance();
        }
        self.pending_edge = false;
        self.address
    }

    fn read_data(&mut self) -> u8 {
        self.driving = None;
        FLOATING_DATA
    }

    fn drive_data(&mut self, value: u8) {
        self.driving = Some(value);
        self.last_driven = Some(value);
    }

    fn release_data(&mut self) {
        self.driving = None;
    }

    fn read_control(&mut self, line: ControlLine) -> Level {
        match line {
            // The sled only ever reads.
            ControlLine::ReadWrite => Level::High,
            ControlLine::Sync => Level::from(self.sync),
            ControlLine::Reset => self.reset,
            ControlLine::Clock => self.clock,
            ControlLine::Irq => self.irq,
            ControlLine::Nmi => self.nmi,
        }
    }

    fn set_control(&mut self, line: ControlLine, level: Level) {
        match line {
            ControlLine::Reset => {
                if self.reset == Level::Low && level == Level::High {
                    self.restart();
                }
                self.reset = level;
            }
            ControlLine::Clock => {
                if self.clock == Level::High && level == Level::Low {
                    self.pending_edge = true;
                }
                self.clock = level;
            }
            ControlLine::Irq => self.irq = level,
            ControlLine::Nmi => self.nmi = level,
            // Inputs on the monitor side.
            ControlLine::ReadWrite | ControlLine::Sync => {}
        }
    }

    fn delay(&mut self, duration: Duration) {
        if duration >= Duration::from_millis(1) {
            std::thread::sleep(duration);
            return;
        }
        let until = Instant::now() + duration;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}
