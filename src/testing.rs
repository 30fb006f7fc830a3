//! A scripted `HardwareBus` for exercising the monitor without hardware.
//!
//! Each call to `read_address` starts the next scripted cycle; once the
//! script runs out the bus keeps presenting the last cycle, like a CPU
//! whose clock has stopped.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::bus::{ControlLine, HardwareBus, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedCycle {
    pub address: u16,
    pub cpu_reads: bool,
    /// Value the CPU places on the bus for a write cycle.
    pub data: u8,
    pub sync: bool,
}

impl ScriptedCycle {
    pub fn with_sync(&mut self, sync: bool) -> &mut Self {
        self.sync = sync;
        self
    }
}

/// Pin activity recorded by the scripted bus. Address and control-line
/// reads are not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Drive(u8),
    Release,
    SampleData(u8),
    SetControl(ControlLine, Level),
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct ScriptedBus {
    script: VecDeque<ScriptedCycle>,
    current: Option<ScriptedCycle>,
    lines: HashMap<ControlLine, Level>,
    driving: Option<u8>,
    events: Vec<BusEvent>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_read(&mut self, address: u16) -> &mut ScriptedCycle {
        self.push(ScriptedCycle {
            address,
            cpu_reads: true,
            data: 0,
            sync: false,
        })
    }

    pub fn push_write(&mut self, address: u16, data: u8) -> &mut ScriptedCycle {
        self.push(ScriptedCycle {
            address,
            cpu_reads: false,
            data,
            sync: false,
        })
    }

    fn push(&mut self, cycle: ScriptedCycle) -> &mut ScriptedCycle {
        self.script.push_back(cycle);
        let last = self.script.len() - 1;
        &mut self.script[last]
    }

    pub fn pending_cycles(&self) -> usize {
        self.script.len()
    }

    /// Last level the monitor set on an output line.
    pub fn line(&self, line: ControlLine) -> Option<Level> {
        self.lines.get(&line).copied()
    }

    pub fn is_driving(&self) -> bool {
        self.driving.is_some()
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Every byte driven onto the data bus, in order.
    pub fn driven(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BusEvent::Drive(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    fn current(&self) -> ScriptedCycle {
        self.current.unwrap_or(ScriptedCycle {
            address: 0,
            cpu_reads: true,
            data: 0,
            sync: false,
        })
    }
}

impl HardwareBus for ScriptedBus {
    fn read_address(&mut self) -> u16 {
        if let Some(next) = self.script.pop_front() {
            self.current = Some(next);
        }
        self.current().address
    }

    fn read_data(&mut self) -> u8 {
        self.driving = None;
        let data = self.current().data;
        self.events.push(BusEvent::SampleData(data));
        data
    }

    fn drive_data(&mut self, value: u8) {
        self.driving = Some(value);
        self.events.push(BusEvent::Drive(value));
    }

    fn release_data(&mut self) {
        self.driving = None;
        self.events.push(BusEvent::Release);
    }

    fn read_control(&mut self, line: ControlLine) -> Level {
        match line {
            ControlLine::ReadWrite => Level::from(self.current().cpu_reads),
            ControlLine::Sync => Level::from(self.current().sync),
            other => self.lines.get(&other).copied().unwrap_or(Level::Low),
        }
    }

    fn set_control(&mut self, line: ControlLine, level: Level) {
        self.lines.insert(line, level);
        self.events.push(BusEvent::SetControl(line, level));
    }

    fn delay(&mut self, duration: Duration) {
        self.events.push(BusEvent::Delay(duration));
    }
}
