use serde::Serialize;

use crate::bus::{ControlLine, HardwareBus, Level};
use crate::channel::ByteChannel;
use crate::emulator::Emulator;
use crate::error::ChannelError;
use crate::metrics::{record_cpu_reset, record_step, set_run_state};

/// Whether bus cycles are serviced automatically by the top-level loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Halted,
    Running,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Halted => "halted",
            RunState::Running => "running",
        }
    }
}

// Clock generation and run control.
impl<B: HardwareBus, C: ByteChannel> Emulator<B, C> {
    /// Put the control lines in their power-on state: CPU held in reset,
    /// interrupts inactive, clock low, data bus released.
    pub fn power_on(&mut self) {
        self.bus.release_data();
        self.bus.set_control(ControlLine::Reset, Level::Low);
        self.bus.set_control(ControlLine::Irq, Level::High);
        self.bus.set_control(ControlLine::Nmi, Level::High);
        self.bus.set_control(ControlLine::Clock, Level::Low);
    }

    /// Pulse RESET low for the configured hold time and start running.
    pub fn reset(&mut self) {
        self.bus.set_control(ControlLine::Reset, Level::Low);
        self.bus.delay(self.timing.reset_hold);
        self.bus.set_control(ControlLine::Reset, Level::High);
        self.set_run_state(RunState::Running);
        record_cpu_reset();
        tracing::info!(hold = ?self.timing.reset_hold, "CPU reset");
    }

    pub fn halt(&mut self) {
        self.set_run_state(RunState::Halted);
    }

    pub fn release(&mut self) {
        self.set_run_state(RunState::Running);
    }

    /// One full clock period: high for a half period, then low.
    pub fn clock_pulse(&mut self) {
        self.bus.set_control(ControlLine::Clock, Level::High);
        self.bus.delay(self.timing.clock_half_period);
        self.bus.set_control(ControlLine::Clock, Level::Low);
        self.bus.delay(self.timing.clock_half_period);
    }

    /// Clock the CPU through exactly one instruction, servicing each cycle.
    ///
    /// Pulses continue until SYNC has been seen high and then low again,
    /// which brackets the cycles of one instruction. There is no pulse
    /// limit: a CPU that never toggles SYNC keeps this looping. Returns the
    /// number of pulses generated; the run state is left `Halted`.
    pub fn step(&mut self) -> Result<u32, ChannelError> {
        self.halt();

        let mut entered_instruction = false;
        let mut pulses = 0u32;
        loop {
            self.clock_pulse();
            pulses = pulses.wrapping_add(1);
            self.sample_bus()?;

            if self.bus.read_control(ControlLine::Sync).is_high() {
                entered_instruction = true;
            } else if entered_instruction {
                break;
            }
        }

        record_step(pulses);
        tracing::debug!(pulses, "stepped one instruction");
        Ok(pulses)
    }

    fn set_run_state(&mut self, state: RunState) {
        if self.run_state != state {
            tracing::debug!(
                from = self.run_state.as_str(),
                to = state.as_str(),
                "run state changed"
            );
        }
        self.run_state = state;
        set_run_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueChannel;
    use crate::config::Timing;
    use crate::testing::{BusEvent, ScriptedBus};
    use std::time::Duration;

    fn emulator(bus: ScriptedBus) -> Emulator<ScriptedBus, QueueChannel> {
        Emulator::new(bus, QueueChannel::new(), 4096, 10, Timing::default())
    }

    #[test]
    fn test_starts_halted_until_reset() {
        let mut emu = emulator(ScriptedBus::new());
        assert_eq!(emu.run_state(), RunState::Halted);

        emu.reset();
        assert_eq!(emu.run_state(), RunState::Running);
    }

    #[test]
    fn test_power_on_holds_cpu_in_reset() {
        let mut emu = emulator(ScriptedBus::new());
        emu.power_on();

        assert_eq!(emu.bus().line(ControlLine::Reset), Some(Level::Low));
        assert_eq!(emu.bus().line(ControlLine::Irq), Some(Level::High));
        assert_eq!(emu.bus().line(ControlLine::Nmi), Some(Level::High));
        assert_eq!(emu.bus().line(ControlLine::Clock), Some(Level::Low));
        assert!(!emu.bus().is_driving());
    }

    #[test]
    fn test_reset_holds_line_for_settle_time() {
        let mut emu = emulator(ScriptedBus::new());
        emu.halt();
        emu.reset();

        assert_eq!(
            emu.bus().events(),
            &[
                BusEvent::SetControl(ControlLine::Reset, Level::Low),
                BusEvent::Delay(Duration::from_millis(10)),
                BusEvent::SetControl(ControlLine::Reset, Level::High),
            ]
        );
        assert_eq!(emu.run_state(), RunState::Running);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut emu = emulator(ScriptedBus::new());
        emu.reset();
        emu.reset();

        assert_eq!(emu.run_state(), RunState::Running);
        assert_eq!(emu.bus().line(ControlLine::Reset), Some(Level::High));
    }

    #[test]
    fn test_halt_and_release_are_idempotent() {
        let mut emu = emulator(ScriptedBus::new());
        emu.reset();

        emu.halt();
        emu.halt();
        assert_eq!(emu.run_state(), RunState::Halted);

        emu.release();
        emu.release();
        assert_eq!(emu.run_state(), RunState::Running);
    }

    #[test]
    fn test_clock_pulse_shape() {
        let mut emu = emulator(ScriptedBus::new());
        emu.clock_pulse();

        let half = Duration::from_micros(1);
        assert_eq!(
            emu.bus().events(),
            &[
                BusEvent::SetControl(ControlLine::Clock, Level::High),
                BusEvent::Delay(half),
                BusEvent::SetControl(ControlLine::Clock, Level::Low),
                BusEvent::Delay(half),
            ]
        );
    }

    #[test]
    fn test_step_brackets_one_instruction() {
        // SYNC per pulse: low, low, high, high, low, high.
        let mut bus = ScriptedBus::new();
        for sync in [false, false, true, true, false, true] {
            bus.push_read(0x0000).with_sync(sync);
        }
        let mut emu = emulator(bus);
        emu.reset();

        let pulses = emu.step().unwrap();

        assert_eq!(pulses, 5);
        assert_eq!(emu.bus().pending_cycles(), 1);
        assert_eq!(emu.run_state(), RunState::Halted);
        assert_eq!(emu.stats().bus_reads, 5);
    }

    #[test]
    fn test_step_from_halted_state() {
        let mut bus = ScriptedBus::new();
        bus.push_read(0x0010).with_sync(true);
        bus.push_read(0x0011).with_sync(false);
        let mut emu = emulator(bus);

        assert_eq!(emu.step().unwrap(), 2);
        assert_eq!(emu.run_state(), RunState::Halted);
    }
}
