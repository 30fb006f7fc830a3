use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::breakpoints::BreakpointSet;
use crate::bus::{BusCycle, HardwareBus};
use crate::channel::ByteChannel;
use crate::config::{Config, Timing};
use crate::cpu::RunState;
use crate::error::ChannelError;
use crate::memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakpointHit {
    pub address: u16,
    pub at: DateTime<Utc>,
}

/// Counters kept alongside the emulator state for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub bus_reads: u64,
    pub bus_writes: u64,
    pub commands_handled: u64,
    pub breakpoint_hits: u64,
    pub last_breakpoint: Option<BreakpointHit>,
}

/// What one pass through the top-level loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick {
    pub command_handled: bool,
    pub cycle: Option<BusCycle>,
}

/// Everything the monitor owns: the memory it serves, the watched
/// addresses, the run state, and the bus and host channel it drives.
///
/// Bus sampling (`sampler`), run control (`cpu`) and command dispatch
/// (`protocol`) are implemented on this type in their own modules.
#[derive(Debug)]
pub struct Emulator<B, C> {
    pub(crate) bus: B,
    pub(crate) channel: C,
    pub(crate) memory: MemoryStore,
    pub(crate) breakpoints: BreakpointSet,
    pub(crate) run_state: RunState,
    pub(crate) timing: Timing,
    pub(crate) stats: CycleStats,
}

impl<B: HardwareBus, C: ByteChannel> Emulator<B, C> {
    /// A freshly powered monitor. The run state stays `Halted` until the
    /// first `reset`.
    pub fn new(
        bus: B,
        channel: C,
        memory_size: usize,
        max_breakpoints: usize,
        timing: Timing,
    ) -> Self {
        Emulator {
            bus,
            channel,
            memory: MemoryStore::new(memory_size),
            breakpoints: BreakpointSet::new(max_breakpoints),
            run_state: RunState::Halted,
            timing,
            stats: CycleStats::default(),
        }
    }

    pub fn from_config(bus: B, channel: C, config: &Config) -> Self {
        Self::new(
            bus,
            channel,
            config.memory_size,
            config.max_breakpoints,
            config.timing(),
        )
    }

    /// Poll for a command byte and dispatch it, then service one bus cycle
    /// if running.
    ///
    /// A command blocks until all of its bytes arrive, and cycles the CPU
    /// performs meanwhile are missed.
    pub fn run_once(&mut self) -> Result<Tick, ChannelError> {
        let mut tick = Tick::default();

        if self.channel.byte_available()? {
            self.handle_command()?;
            tick.command_handled = true;
        }

        if self.run_state == RunState::Running {
            tick.cycle = Some(self.sample_bus()?);
        }

        Ok(tick)
    }

    /// Run until the channel closes.
    pub fn run(&mut self) {
        while self.run_once().is_ok() {}
        tracing::debug!("byte channel closed");
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}
