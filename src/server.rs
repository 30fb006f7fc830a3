use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;
use warp::Filter;

use crate::bus::HardwareBus;
use crate::channel::{hex_u16, BridgeChannel, ByteChannel};
use crate::config::Config;
use crate::cpu::RunState;
use crate::emulator::Emulator;
use crate::error::ChannelError;
use crate::metrics::{init_metrics, record_host_connection, REGISTRY};
use crate::sim::SimulatedBus;

/// Pause between polls while halted with no host input.
const IDLE_BACKOFF: Duration = Duration::from_micros(200);

/// Free-running cycles between `/status` refreshes.
const STATUS_PUBLISH_CYCLES: u64 = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct LastBreakpoint {
    pub address: String,
    pub at: DateTime<Utc>,
}

/// Snapshot served on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub run_state: RunState,
    pub memory_size: usize,
    pub breakpoints: Vec<String>,
    pub breakpoint_capacity: usize,
    pub bus_reads: u64,
    pub bus_writes: u64,
    pub commands_handled: u64,
    pub last_breakpoint: Option<LastBreakpoint>,
    pub session_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
}

impl MonitorStatus {
    fn new(config: &Config) -> Self {
        MonitorStatus {
            run_state: RunState::Halted,
            memory_size: config.memory_size,
            breakpoints: Vec::new(),
            breakpoint_capacity: config.max_breakpoints,
            bus_reads: 0,
            bus_writes: 0,
            commands_handled: 0,
            last_breakpoint: None,
            session_id: None,
            started_at: Utc::now(),
        }
    }

    /// Copy the emulator-owned fields; the session is tracked by the bridge.
    fn update_from<B: HardwareBus, C: ByteChannel>(&mut self, emulator: &Emulator<B, C>) {
        let stats = emulator.stats();
        self.run_state = emulator.run_state();
        self.memory_size = emulator.memory().size();
        self.breakpoints = emulator.breakpoints().iter().map(hex_u16).collect();
        self.breakpoint_capacity = emulator.breakpoints().capacity();
        self.bus_reads = stats.bus_reads;
        self.bus_writes = stats.bus_writes;
        self.commands_handled = stats.commands_handled;
        self.last_breakpoint = stats.last_breakpoint.map(|hit| LastBreakpoint {
            address: hex_u16(hit.address),
            at: hit.at,
        });
    }
}

pub type SharedStatus = Arc<Mutex<MonitorStatus>>;

fn lock_status(status: &SharedStatus) -> MutexGuard<'_, MonitorStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ServerHandle {
    serial_addr: SocketAddr,
    http_addr: SocketAddr,
    status: SharedStatus,
    stop_firmware: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    firmware: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn serial_addr(&self) -> SocketAddr {
        self.serial_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn status(&self) -> MonitorStatus {
        lock_status(&self.status).clone()
    }

    pub async fn shutdown(mut self) {
        self.stop_firmware.store(true, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        if let Some(firmware) = self.firmware.take() {
            let _ = tokio::task::spawn_blocking(move || firmware.join()).await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop_firmware.store(true, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Bind the serial bridge and the HTTP endpoints, and start the firmware
/// loop on its own thread.
pub async fn start_server(config: Config) -> std::io::Result<ServerHandle> {
    init_metrics();

    let serial_listener = TcpListener::bind(config.serial_addr).await?;
    let serial_addr = serial_listener.local_addr()?;

    let status: SharedStatus = Arc::new(Mutex::new(MonitorStatus::new(&config)));
    let stop_firmware = Arc::new(AtomicBool::new(false));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (to_firmware, firmware_rx) = mpsc::channel::<u8>();
    let (firmware_tx, from_firmware) = tokio::sync::mpsc::unbounded_channel::<u8>();
    let channel = BridgeChannel::new(firmware_rx, firmware_tx, stop_firmware.clone());
    let bus = SimulatedBus::new(config.start_address, config.free_run);
    let emulator = Emulator::from_config(bus, channel, &config);

    let mut http_shutdown = shutdown_rx.clone();
    let (http_addr, http_server) = warp::serve(routes(status.clone()))
        .try_bind_with_graceful_shutdown(config.http_addr, async move {
            let _ = http_shutdown.changed().await;
        })
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::AddrInUse, err))?;

    let firmware_status = status.clone();
    let firmware = thread::Builder::new()
        .name("firmware".to_string())
        .spawn(move || run_firmware(emulator, firmware_status))?;

    let serial_task = tokio::spawn(serve_serial(
        serial_listener,
        to_firmware,
        from_firmware,
        status.clone(),
        shutdown_rx,
    ));
    let http_task = tokio::spawn(http_server);

    tracing::info!(
        %serial_addr,
        %http_addr,
        memory_size = config.memory_size,
        "bus monitor started"
    );

    Ok(ServerHandle {
        serial_addr,
        http_addr,
        status,
        stop_firmware,
        shutdown_tx,
        tasks: vec![serial_task, http_task],
        firmware: Some(firmware),
    })
}

/// Run until Ctrl+C.
pub async fn run_server(config: Config) -> std::io::Result<()> {
    let handle = start_server(config).await?;
    tracing::info!("serial bridge on tcp://{}", handle.serial_addr());
    tracing::info!(
        "status on http://{addr}/status, metrics on http://{addr}/metrics",
        addr = handle.http_addr()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    handle.shutdown().await;
    Ok(())
}

/// The single cooperative execution context: alternate between host
/// commands and bus cycles until the channel closes.
fn run_firmware(mut emulator: Emulator<SimulatedBus, BridgeChannel>, status: SharedStatus) {
    emulator.power_on();
    emulator.reset();
    lock_status(&status).update_from(&emulator);

    let mut cycles_since_publish = 0u64;
    loop {
        let before = emulator.run_state();
        match emulator.run_once() {
            Ok(tick) => {
                if tick.cycle.is_some() {
                    cycles_since_publish += 1;
                }
                if tick.command_handled
                    || emulator.run_state() != before
                    || cycles_since_publish >= STATUS_PUBLISH_CYCLES
                {
                    cycles_since_publish = 0;
                    lock_status(&status).update_from(&emulator);
                } else if tick.cycle.is_none() {
                    // Halted and idle.
                    thread::sleep(IDLE_BACKOFF);
                }
            }
            Err(ChannelError::Closed) => break,
        }
    }

    lock_status(&status).update_from(&emulator);
    tracing::info!("firmware loop stopped");
}

async fn serve_serial(
    listener: TcpListener,
    to_firmware: mpsc::Sender<u8>,
    mut from_firmware: UnboundedReceiver<u8>,
    status: SharedStatus,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    tracing::warn!("failed to accept host connection: {err}");
                    continue;
                }
            },
            _ = shutdown_rx.changed() => break,
        };

        let session = Uuid::new_v4();
        record_host_connection();
        lock_status(&status).session_id = Some(session);
        tracing::info!(%peer, %session, "host connected");

        // Replies nobody was connected to read are dropped.
        while from_firmware.try_recv().is_ok() {}

        let served =
            serve_connection(stream, &to_firmware, &mut from_firmware, &mut shutdown_rx).await;
        if let Err(err) = served {
            tracing::warn!(%session, "host connection error: {err}");
        }

        lock_status(&status).session_id = None;
        tracing::info!(%session, "host disconnected");

        if *shutdown_rx.borrow() {
            break;
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    to_firmware: &mpsc::Sender<u8>,
    from_firmware: &mut UnboundedReceiver<u8>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = [0u8; 256];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                for &byte in &buf[..n] {
                    if to_firmware.send(byte).is_err() {
                        return Ok(());
                    }
                }
            }
            byte = from_firmware.recv() => {
                let Some(byte) = byte else {
                    return Ok(());
                };
                let mut out = vec![byte];
                while let Ok(more) = from_firmware.try_recv() {
                    out.push(more);
                }
                writer.write_all(&out).await?;
            }
            _ = shutdown_rx.changed() => return Ok(()),
        }
    }
}

pub fn routes(
    status: SharedStatus,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let get_status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_status(status))
        .map(|status: SharedStatus| {
            let snapshot = lock_status(&status).clone();
            warp::reply::json(&snapshot)
        });

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(metrics_handler);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "ok");

    get_status.or(metrics).or(health)
}

fn with_status(
    status: SharedStatus,
) -> impl Filter<Extract = (SharedStatus,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || status.clone())
}

async fn metrics_handler() -> Result<impl warp::Reply, warp::Rejection> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => Ok(warp::reply::with_header(
            metrics_text,
            "content-type",
            "text/plain; version=0.0.4",
        )),
        Err(err) => {
            tracing::warn!("failed to encode metrics: {err}");
            Ok(warp::reply::with_header(
                "Error encoding metrics".to_string(),
                "content-type",
                "text/plain",
            ))
        }
    }
}
