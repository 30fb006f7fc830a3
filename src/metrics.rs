use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::sync::Once;
use std::time::{Duration, Instant};

use crate::bus::Direction;
use crate::cpu::RunState;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Commands received from the host, by command name
    pub static ref COMMANDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("busmon_commands_total", "Total number of host commands handled"),
        &["command"]
    ).expect("Failed to create commands counter");

    /// Error replies sent to the host, by error kind
    pub static ref COMMAND_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "busmon_command_errors_total",
            "Total number of host commands answered with an error"
        ),
        &["kind"]
    ).expect("Failed to create command errors counter");

    /// Time from command byte to reply, including argument bytes
    pub static ref COMMAND_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("busmon_command_duration_seconds", "Time spent handling host commands")
            .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0, 10.0]),
        &["command"]
    ).expect("Failed to create command duration histogram");

    /// Bus cycles serviced, by direction
    pub static ref BUS_CYCLES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("busmon_bus_cycles_total", "Total number of CPU bus cycles serviced"),
        &["direction"]
    ).expect("Failed to create bus cycles counter");

    pub static ref BREAKPOINT_HITS_TOTAL: Counter = Counter::new(
        "busmon_breakpoint_hits_total", "Total number of breakpoint hits"
    ).expect("Failed to create breakpoint hits counter");

    pub static ref STEP_PULSES_TOTAL: Counter = Counter::new(
        "busmon_step_pulses_total", "Total number of clock pulses generated while stepping"
    ).expect("Failed to create step pulses counter");

    /// Clock pulses needed per single step
    pub static ref STEP_PULSES: Histogram = Histogram::with_opts(
        HistogramOpts::new("busmon_step_pulses", "Clock pulses per stepped instruction")
            .buckets(vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
    ).expect("Failed to create step pulses histogram");

    pub static ref CPU_RESETS_TOTAL: Counter = Counter::new(
        "busmon_cpu_resets_total", "Total number of CPU resets"
    ).expect("Failed to create CPU resets counter");

    /// 1 while bus cycles are serviced automatically, 0 while halted
    pub static ref RUN_STATE: Gauge = Gauge::new(
        "busmon_run_state", "Current run state (1 = running, 0 = halted)"
    ).expect("Failed to create run state gauge");

    pub static ref HOST_CONNECTIONS_TOTAL: Counter = Counter::new(
        "busmon_host_connections_total", "Total number of host connections accepted"
    ).expect("Failed to create host connections counter");
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(COMMANDS_TOTAL.clone()))
            .expect("Failed to register commands counter");

        REGISTRY
            .register(Box::new(COMMAND_ERRORS_TOTAL.clone()))
            .expect("Failed to register command errors counter");

        REGISTRY
            .register(Box::new(COMMAND_DURATION.clone()))
            .expect("Failed to register command duration histogram");

        REGISTRY
            .register(Box::new(BUS_CYCLES_TOTAL.clone()))
            .expect("Failed to register bus cycles counter");

        REGISTRY
            .register(Box::new(BREAKPOINT_HITS_TOTAL.clone()))
            .expect("Failed to register breakpoint hits counter");

        REGISTRY
            .register(Box::new(STEP_PULSES_TOTAL.clone()))
            .expect("Failed to register step pulses counter");

        REGISTRY
            .register(Box::new(STEP_PULSES.clone()))
            .expect("Failed to register step pulses histogram");

        REGISTRY
            .register(Box::new(CPU_RESETS_TOTAL.clone()))
            .expect("Failed to register CPU resets counter");

        REGISTRY
            .register(Box::new(RUN_STATE.clone()))
            .expect("Failed to register run state gauge");

        REGISTRY
            .register(Box::new(HOST_CONNECTIONS_TOTAL.clone()))
            .expect("Failed to register host connections counter");
    });
}

/// Record a handled host command
pub fn record_command(command: &str, duration: Duration) {
    COMMANDS_TOTAL.with_label_values(&[command]).inc();

    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
}

/// Record an error reply
pub fn record_command_error(kind: &str) {
    COMMAND_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_bus_cycle(direction: Direction) {
    BUS_CYCLES_TOTAL.with_label_values(&[direction.as_str()]).inc();
}

pub fn record_breakpoint_hit() {
    BREAKPOINT_HITS_TOTAL.inc();
}

/// Record a completed single step
pub fn record_step(pulses: u32) {
    STEP_PULSES_TOTAL.inc_by(pulses as f64);
    STEP_PULSES.observe(pulses as f64);
}

pub fn record_cpu_reset() {
    CPU_RESETS_TOTAL.inc();
}

pub fn set_run_state(state: RunState) {
    RUN_STATE.set(match state {
        RunState::Running => 1.0,
        RunState::Halted => 0.0,
    });
}

pub fn record_host_connection() {
    HOST_CONNECTIONS_TOTAL.inc();
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
