use chrono::Utc;

use crate::bus::{BusCycle, ControlLine, Direction, HardwareBus};
use crate::channel::{hex_u16, ByteChannel};
use crate::emulator::{BreakpointHit, Emulator};
use crate::error::ChannelError;
use crate::metrics::{record_breakpoint_hit, record_bus_cycle};

// Bus cycle servicing. Runs under the CPU's clock half-period deadline.
impl<B: HardwareBus, C: ByteChannel> Emulator<B, C> {
    /// Service the bus cycle the CPU is currently presenting.
    ///
    /// A breakpoint on the address halts automatic sampling, but the cycle
    /// that hit it is still completed. The data bus is always released after
    /// a driven read, including for addresses outside memory.
    pub fn sample_bus(&mut self) -> Result<BusCycle, ChannelError> {
        let address = self.bus.read_address();

        let notified = if self.breakpoints.contains(address) {
            self.breakpoint_hit(address)
        } else {
            Ok(())
        };

        let cycle = if self.bus.read_control(ControlLine::ReadWrite).is_high() {
            let data = self.memory.read_or_open_bus(address);
            self.bus.drive_data(data);
            self.bus.delay(self.timing.bus_hold);
            self.bus.release_data();
            self.stats.bus_reads += 1;
            BusCycle {
                address,
                direction: Direction::Read,
                data,
            }
        } else {
            let data = self.bus.read_data();
            // Writes outside memory are dropped without telling the host.
            if self.memory.write(address, data).is_err() {
                tracing::trace!(
                    address = %hex_u16(address),
                    data,
                    "CPU write outside memory ignored"
                );
            }
            self.stats.bus_writes += 1;
            BusCycle {
                address,
                direction: Direction::Write,
                data,
            }
        };

        record_bus_cycle(cycle.direction);
        tracing::trace!(
            address = %hex_u16(cycle.address),
            direction = cycle.direction.as_str(),
            data = cycle.data,
            "bus cycle"
        );

        notified.map(|()| cycle)
    }

    fn breakpoint_hit(&mut self, address: u16) -> Result<(), ChannelError> {
        self.halt();
        self.stats.breakpoint_hits += 1;
        self.stats.last_breakpoint = Some(BreakpointHit {
            address,
            at: Utc::now(),
        });
        record_breakpoint_hit();
        tracing::info!(address = %hex_u16(address), "breakpoint reached");

        self.channel
            .send_str(&format!("Breakpoint reached at address: 0x{}\n", hex_u16(address)))
    }
}
