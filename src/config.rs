use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::error::ConfigError;
use crate::memory::MAX_MEMORY_SIZE;

pub const DEFAULT_MEMORY_SIZE: usize = 4096;
pub const DEFAULT_MAX_BREAKPOINTS: usize = 10;
pub const DEFAULT_RESET_HOLD_MS: u64 = 10;
pub const DEFAULT_BUS_HOLD_US: u64 = 1;
pub const DEFAULT_CLOCK_HALF_PERIOD_US: u64 = 1;

/// Fixed waits used on the bus. These are the only delays the monitor makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long RESET is held low.
    pub reset_hold: Duration,
    /// How long a byte stays driven on the data bus for a CPU read.
    pub bus_hold: Duration,
    /// Each half of a generated clock pulse.
    pub clock_half_period: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            reset_hold: Duration::from_millis(DEFAULT_RESET_HOLD_MS),
            bus_hold: Duration::from_micros(DEFAULT_BUS_HOLD_US),
            clock_half_period: Duration::from_micros(DEFAULT_CLOCK_HALF_PERIOD_US),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "mos6502_bus_monitor",
    version,
    about = "Serve memory to a 6502 bus and debug it over a byte-oriented serial protocol"
)]
pub struct Config {
    /// TCP address standing in for the serial port
    #[arg(long, env = "BUSMON_SERIAL_ADDR", default_value = "127.0.0.1:6502")]
    pub serial_addr: SocketAddr,

    /// HTTP address for /status, /metrics and /health
    #[arg(long, env = "BUSMON_HTTP_ADDR", default_value = "127.0.0.1:3030")]
    pub http_addr: SocketAddr,

    /// Bytes of emulated memory, starting at $0000
    #[arg(long, env = "BUSMON_MEMORY_SIZE", default_value_t = DEFAULT_MEMORY_SIZE)]
    pub memory_size: usize,

    #[arg(long, env = "BUSMON_MAX_BREAKPOINTS", default_value_t = DEFAULT_MAX_BREAKPOINTS)]
    pub max_breakpoints: usize,

    #[arg(long, env = "BUSMON_RESET_HOLD_MS", default_value_t = DEFAULT_RESET_HOLD_MS)]
    pub reset_hold_ms: u64,

    #[arg(long, env = "BUSMON_BUS_HOLD_US", default_value_t = DEFAULT_BUS_HOLD_US)]
    pub bus_hold_us: u64,

    #[arg(
        long,
        env = "BUSMON_CLOCK_HALF_PERIOD_US",
        default_value_t = DEFAULT_CLOCK_HALF_PERIOD_US
    )]
    pub clock_half_period_us: u64,

    /// Where the simulated CPU starts its NOP sled after reset (0x/$ hex or decimal)
    #[arg(
        long,
        env = "BUSMON_START_ADDRESS",
        default_value = "0x0000",
        value_parser = parse_address
    )]
    pub start_address: u16,

    /// Let the simulated CPU clock itself while the monitor is running
    #[arg(long, env = "BUSMON_FREE_RUN", default_value_t = true, action = ArgAction::Set)]
    pub free_run: bool,

    /// tracing filter directive, e.g. "info" or "mos6502_bus_monitor=debug"
    #[arg(long, env = "BUSMON_LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial_addr: SocketAddr::from(([127, 0, 0, 1], 6502)),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            memory_size: DEFAULT_MEMORY_SIZE,
            max_breakpoints: DEFAULT_MAX_BREAKPOINTS,
            reset_hold_ms: DEFAULT_RESET_HOLD_MS,
            bus_hold_us: DEFAULT_BUS_HOLD_US,
            clock_half_period_us: DEFAULT_CLOCK_HALF_PERIOD_US,
            start_address: 0x0000,
            free_run: true,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 || self.memory_size > MAX_MEMORY_SIZE {
            return Err(ConfigError::InvalidMemorySize(self.memory_size));
        }
        if self.max_breakpoints == 0 {
            return Err(ConfigError::ZeroBreakpointCapacity);
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            reset_hold: Duration::from_millis(self.reset_hold_ms),
            bus_hold: Duration::from_micros(self.bus_hold_us),
            clock_half_period: Duration::from_micros(self.clock_half_period_us),
        }
    }
}

fn parse_address(text: &str) -> Result<u16, String> {
    let text = text.trim();
    let parsed = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
    {
        u16::from_str_radix(hex, 16)
    } else {
        text.parse::<u16>()
    };
    parsed.map_err(|err| format!("invalid 16-bit address {:?}: {}", text, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_hardware() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.memory_size, 4096);
        assert_eq!(config.max_breakpoints, 10);
        assert_eq!(config.timing(), Timing::default());
        assert_eq!(config.timing().reset_hold, Duration::from_millis(10));
    }

    #[test]
    fn test_parse_command_line() {
        let config = Config::parse_from([
            "mos6502_bus_monitor",
            "--memory-size",
            "65536",
            "--start-address",
            "$E000",
            "--free-run",
            "false",
            "--serial-addr",
            "0.0.0.0:7000",
        ]);

        assert!(config.validate().is_ok());
        assert_eq!(config.memory_size, 65536);
        assert_eq!(config.start_address, 0xE000);
        assert!(!config.free_run);
        assert_eq!(config.serial_addr.port(), 7000);
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let mut config = Config::default();
        config.memory_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMemorySize(0)));

        config.memory_size = 65537;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMemorySize(65537)));

        config.memory_size = 4096;
        config.max_breakpoints = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroBreakpointCapacity));
    }

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("0x0200"), Ok(0x0200));
        assert_eq!(parse_address("$FFFC"), Ok(0xFFFC));
        assert_eq!(parse_address("512"), Ok(512));
        assert!(parse_address("0x10000").is_err());
    }
}
