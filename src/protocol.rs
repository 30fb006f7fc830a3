use crate::bus::HardwareBus;
use crate::channel::{hex_u16, ByteChannel};
use crate::emulator::Emulator;
use crate::error::{ChannelError, CommandError};
use crate::metrics::{record_command, record_command_error, Timer};

/// Host commands. Each is one ASCII byte followed by a fixed number of
/// argument bytes; 16-bit arguments are sent high byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `R`: pulse RESET and run.
    Reset,
    /// `H`: stop servicing bus cycles.
    Halt,
    /// `C`: resume servicing bus cycles.
    Continue,
    /// `S`: clock through one instruction.
    Step,
    /// `W addrHi addrLo data`
    WriteMemory,
    /// `M addrHi addrLo`, answered with one raw byte.
    ReadMemory,
    /// `L addrHi addrLo sizeHi sizeLo data...`
    Load,
    /// `B addrHi addrLo`
    SetBreakpoint,
    /// `G`: not supported.
    Registers,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            b'R' => Some(Command::Reset),
            b'H' => Some(Command::Halt),
            b'C' => Some(Command::Continue),
            b'S' => Some(Command::Step),
            b'W' => Some(Command::WriteMemory),
            b'M' => Some(Command::ReadMemory),
            b'L' => Some(Command::Load),
            b'B' => Some(Command::SetBreakpoint),
            b'G' => Some(Command::Registers),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Reset => "reset",
            Command::Halt => "halt",
            Command::Continue => "continue",
            Command::Step => "step",
            Command::WriteMemory => "write_memory",
            Command::ReadMemory => "read_memory",
            Command::Load => "load",
            Command::SetBreakpoint => "set_breakpoint",
            Command::Registers => "registers",
        }
    }
}

/// Successful reply. Text replies go out newline-terminated; a memory read
/// answers with the bare byte and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Byte(u8),
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

// Command dispatch.
impl<B: HardwareBus, C: ByteChannel> Emulator<B, C> {
    /// Receive one command with its arguments, carry it out and reply.
    ///
    /// Command failures are answered on the channel and do not end the
    /// loop; only channel errors are returned. Returns the command, or
    /// `None` if the byte was not a known command.
    pub fn handle_command(&mut self) -> Result<Option<Command>, ChannelError> {
        let byte = self.channel.receive_byte()?;
        let timer = Timer::new();
        let command = Command::from_byte(byte);

        let outcome = match command {
            Some(command) => {
                tracing::debug!(command = command.name(), "host command");
                self.execute(command)?
            }
            None => Err(CommandError::UnknownCommand { byte }),
        };

        match outcome {
            Ok(Reply::Text(text)) => {
                self.channel.send_str(&text)?;
                self.channel.send_byte(b'\n')?;
            }
            Ok(Reply::Byte(value)) => self.channel.send_byte(value)?,
            Err(err) => {
                tracing::warn!(kind = err.kind(), ?err, "command rejected");
                record_command_error(err.kind());
                self.channel.send_str(&format!("Error: {}\n", err))?;
            }
        }

        self.stats.commands_handled += 1;
        record_command(command.map_or("unknown", Command::name), timer.elapsed());
        Ok(command)
    }

    fn execute(&mut self, command: Command) -> Result<Result<Reply, CommandError>, ChannelError> {
        let outcome = match command {
            Command::Reset => {
                self.reset();
                Ok(Reply::text("CPU reset."))
            }
            Command::Halt => {
                self.halt();
                Ok(Reply::text("CPU halted."))
            }
            Command::Continue => {
                self.release();
                Ok(Reply::text("CPU continued."))
            }
            Command::Step => {
                self.step()?;
                Ok(Reply::text("CPU stepped one instruction."))
            }
            Command::WriteMemory => {
                let address = self.channel.receive_u16()?;
                let data = self.channel.receive_byte()?;
                let written = format!("Memory written at address 0x{}.", hex_u16(address));
                self.memory
                    .write(address, data)
                    .map(|()| Reply::Text(written))
                    .map_err(CommandError::from)
            }
            Command::ReadMemory => {
                let address = self.channel.receive_u16()?;
                self.memory.read(address).map(Reply::Byte).map_err(CommandError::from)
            }
            Command::Load => self.load()?,
            Command::SetBreakpoint => {
                let address = self.channel.receive_u16()?;
                let set = format!("Breakpoint set at address 0x{}.", hex_u16(address));
                self.breakpoints
                    .add(address)
                    .map(|()| Reply::Text(set))
                    .map_err(CommandError::from)
            }
            Command::Registers => Err(CommandError::RegistersUnsupported),
        };
        Ok(outcome)
    }

    /// Bulk write, one byte at a time as it arrives.
    ///
    /// Stops at the first address outside memory. Data bytes the host has
    /// not yet had consumed stay in the channel and will be read as the
    /// next command.
    fn load(&mut self) -> Result<Result<Reply, CommandError>, ChannelError> {
        let address = self.channel.receive_u16()?;
        let size = self.channel.receive_u16()?;

        for index in 0..size {
            let data = self.channel.receive_byte()?;
            let target = address.wrapping_add(index);
            if self.memory.write(target, data).is_err() {
                return Ok(Err(CommandError::LoadAborted {
                    address: target,
                    index,
                    size,
                }));
            }
        }

        tracing::debug!(address = %hex_u16(address), size, "load complete");
        Ok(Ok(Reply::text("Data loaded successfully.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueChannel;
    use crate::config::Timing;
    use crate::cpu::RunState;
    use crate::testing::ScriptedBus;

    fn emulator(input: &[u8]) -> Emulator<ScriptedBus, QueueChannel> {
        let channel = QueueChannel::with_input(input);
        Emulator::new(ScriptedBus::new(), channel, 4096, 10, Timing::default())
    }

    fn reply(emu: &mut Emulator<ScriptedBus, QueueChannel>) -> Vec<u8> {
        emu.channel_mut().take_output()
    }

    #[test]
    fn test_command_bytes_decode() {
        let decoded: Vec<_> = b"RHCSWMLBG"
            .iter()
            .filter_map(|&byte| Command::from_byte(byte))
            .collect();

        assert_eq!(
            decoded,
            vec![
                Command::Reset,
                Command::Halt,
                Command::Continue,
                Command::Step,
                Command::WriteMemory,
                Command::ReadMemory,
                Command::Load,
                Command::SetBreakpoint,
                Command::Registers,
            ]
        );
        assert_eq!(Command::from_byte(b'r'), None);
    }

    #[test]
    fn test_run_control_replies() {
        let mut emu = emulator(b"RHC");

        assert_eq!(emu.handle_command().unwrap(), Some(Command::Reset));
        assert_eq!(reply(&mut emu), b"CPU reset.\n");
        assert_eq!(emu.run_state(), RunState::Running);

        emu.handle_command().unwrap();
        assert_eq!(reply(&mut emu), b"CPU halted.\n");
        assert_eq!(emu.run_state(), RunState::Halted);

        emu.handle_command().unwrap();
        assert_eq!(reply(&mut emu), b"CPU continued.\n");
        assert_eq!(emu.run_state(), RunState::Running);
    }

    #[test]
    fn test_write_memory_reply() {
        let mut emu = emulator(&[b'W', 0x01, 0x2F, 0x99]);

        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Memory written at address 0x012F.\n");
        assert_eq!(emu.memory().read(0x012F), Ok(0x99));
    }

    #[test]
    fn test_write_memory_out_of_range() {
        let mut emu = emulator(&[b'W', 0x10, 0x00, 0x99]);

        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Error: Invalid address.\n");
        assert_eq!(emu.channel().pending_input(), 0);
    }

    #[test]
    fn test_read_memory_is_one_raw_byte() {
        let mut emu = emulator(&[b'W', 0x00, 0x02, 0x55, b'M', 0x00, 0x02]);

        emu.handle_command().unwrap();
        reply(&mut emu);
        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), vec![0x55]);
    }

    #[test]
    fn test_read_memory_out_of_range() {
        let mut emu = emulator(&[b'M', 0xFF, 0xFC]);

        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Error: Invalid address.\n");
    }

    #[test]
    fn test_load_writes_sequentially() {
        let mut emu = emulator(&[b'L', 0x00, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03]);

        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Data loaded successfully.\n");
        assert_eq!(&emu.memory().as_slice()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_load_of_zero_bytes() {
        let mut emu = emulator(&[b'L', 0x02, 0x00, 0x00, 0x00]);

        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Data loaded successfully.\n");
    }

    #[test]
    fn test_load_aborts_and_leaves_rest_unconsumed() {
        // Four bytes declared at $0FFE; only $0FFE and $0FFF exist.
        let mut emu = emulator(&[b'L', 0x0F, 0xFE, 0x00, 0x04, 0xAA, 0xBB, 0xCC, 0xDD]);

        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Error: Invalid address during load.\n");
        assert_eq!(emu.memory().read(0x0FFE), Ok(0xAA));
        assert_eq!(emu.memory().read(0x0FFF), Ok(0xBB));
        // 0xCC was consumed by the failing write; 0xDD is still waiting.
        assert_eq!(emu.channel().pending_input(), 1);
    }

    #[test]
    fn test_unconsumed_load_data_is_read_as_next_command() {
        let mut emu = emulator(&[b'L', 0x0F, 0xFF, 0x00, 0x03, 0x11, 0x22, b'H']);

        emu.handle_command().unwrap();
        reply(&mut emu);

        assert_eq!(emu.handle_command().unwrap(), Some(Command::Halt));
    }

    #[test]
    fn test_set_breakpoint_and_capacity() {
        let mut input = Vec::new();
        for i in 0..11u8 {
            input.extend_from_slice(&[b'B', 0x02, i]);
        }
        let mut emu = emulator(&input);

        for i in 0..10u8 {
            emu.handle_command().unwrap();
            assert_eq!(
                reply(&mut emu),
                format!("Breakpoint set at address 0x02{:02X}.\n", i).into_bytes()
            );
        }
        emu.handle_command().unwrap();

        assert_eq!(reply(&mut emu), b"Error: Maximum number of breakpoints reached.\n");
        assert_eq!(emu.breakpoints().len(), 10);
        assert!(!emu.breakpoints().contains(0x020A));
        assert_eq!(emu.channel().pending_input(), 0);
    }

    #[test]
    fn test_breakpoint_during_step_reported_before_ack() {
        let mut bus = ScriptedBus::new();
        bus.push_read(0x0300).with_sync(true);
        bus.push_read(0x0301);
        let channel = QueueChannel::with_input(&[b'B', 0x03, 0x00, b'S']);
        let mut emu = Emulator::new(bus, channel, 4096, 10, Timing::default());
        emu.memory_mut().write(0x0300, 0xEA).unwrap();

        emu.handle_command().unwrap();
        reply(&mut emu);
        assert_eq!(emu.handle_command().unwrap(), Some(Command::Step));

        assert_eq!(
            reply(&mut emu),
            b"Breakpoint reached at address: 0x0300\nCPU stepped one instruction.\n"
        );
        assert_eq!(emu.run_state(), RunState::Halted);
        // The step still completes the instruction past the breakpoint.
        assert_eq!(emu.bus().pending_cycles(), 0);
        assert_eq!(emu.bus().driven(), vec![0xEA, 0x00]);
    }

    #[test]
    fn test_registers_unsupported() {
        let mut emu = emulator(b"G");

        assert_eq!(emu.handle_command().unwrap(), Some(Command::Registers));
        assert_eq!(reply(&mut emu), b"Error: Register reading not supported.\n");
    }

    #[test]
    fn test_unknown_command_changes_nothing() {
        let mut emu = emulator(b"Z");
        emu.reset();
        let memory_before = emu.memory().as_slice().to_vec();

        assert_eq!(emu.handle_command().unwrap(), None);

        assert_eq!(reply(&mut emu), b"Error: Unknown command.\n");
        assert_eq!(emu.memory().as_slice(), &memory_before[..]);
        assert!(emu.breakpoints().is_empty());
        assert_eq!(emu.run_state(), RunState::Running);
    }

    #[test]
    fn test_truncated_arguments_surface_channel_error() {
        let mut emu = emulator(&[b'W', 0x00]);

        assert!(matches!(emu.handle_command(), Err(ChannelError::Closed)));
        assert!(emu.channel().output().is_empty());
    }
}
