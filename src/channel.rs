use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::ChannelError;

/// How often a blocked receive re-checks for shutdown.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Reliable, in-order byte transport to the host (the serial line).
///
/// `receive_byte` blocks until a byte arrives; there is no timeout.
pub trait ByteChannel {
    /// Non-blocking check for a pending command byte.
    fn byte_available(&mut self) -> Result<bool, ChannelError>;

    fn receive_byte(&mut self) -> Result<u8, ChannelError>;

    fn send_byte(&mut self, byte: u8) -> Result<(), ChannelError>;

    fn send_str(&mut self, text: &str) -> Result<(), ChannelError> {
        for byte in text.bytes() {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    /// Two bytes, high byte first.
    fn receive_u16(&mut self) -> Result<u16, ChannelError> {
        let high = self.receive_byte()? as u16;
        let low = self.receive_byte()? as u16;
        Ok((high << 8) | low)
    }
}

/// Upper-case hex, high byte first, no prefix.
pub fn hex_u16(value: u16) -> String {
    format!("{:04X}", value)
}

/// In-memory channel: bytes pushed by the caller are received in order,
/// everything sent is collected for inspection.
///
/// A blocking receive on drained input reports `Closed`. Polling a drained
/// channel reports no byte until `close` is called, after which it reports
/// `Closed` too.
#[derive(Debug, Default)]
pub struct QueueChannel {
    input: VecDeque<u8>,
    output: Vec<u8>,
    closed: bool,
}

impl QueueChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(bytes: &[u8]) -> Self {
        let mut channel = Self::new();
        channel.push_input(bytes);
        channel
    }

    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// No more input will be pushed; the host end has hung up.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl ByteChannel for QueueChannel {
    fn byte_available(&mut self) -> Result<bool, ChannelError> {
        if self.input.is_empty() && self.closed {
            return Err(ChannelError::Closed);
        }
        Ok(!self.input.is_empty())
    }

    fn receive_byte(&mut self) -> Result<u8, ChannelError> {
        self.input.pop_front().ok_or(ChannelError::Closed)
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), ChannelError> {
        self.output.push(byte);
        Ok(())
    }
}

/// Channel between the firmware thread and the async host bridge.
///
/// Incoming bytes arrive on a blocking std queue; outgoing bytes go to an
/// unbounded tokio queue drained by the socket writer.
#[derive(Debug)]
pub struct BridgeChannel {
    incoming: mpsc::Receiver<u8>,
    outgoing: UnboundedSender<u8>,
    peeked: Option<u8>,
    shutdown: Arc<AtomicBool>,
}

impl BridgeChannel {
    pub fn new(
        incoming: mpsc::Receiver<u8>,
        outgoing: UnboundedSender<u8>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        BridgeChannel {
            incoming,
            outgoing,
            peeked: None,
            shutdown,
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl ByteChannel for BridgeChannel {
    fn byte_available(&mut self) -> Result<bool, ChannelError> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        match self.incoming.try_recv() {
            Ok(byte) => {
                self.peeked = Some(byte);
                Ok(true)
            }
            Err(mpsc::TryRecvError::Empty) if self.shutting_down() => Err(ChannelError::Closed),
            Err(mpsc::TryRecvError::Empty) => Ok(false),
            Err(mpsc::TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    fn receive_byte(&mut self) -> Result<u8, ChannelError> {
        if let Some(byte) = self.peeked.take() {
            return Ok(byte);
        }
        loop {
            if self.shutting_down() {
                return Err(ChannelError::Closed);
            }
            match self.incoming.recv_timeout(RECEIVE_POLL_INTERVAL) {
                Ok(byte) => return Ok(byte),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(ChannelError::Closed),
            }
        }
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), ChannelError> {
        self.outgoing.send(byte).map_err(|_| ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_channel_order() {
        let mut channel = QueueChannel::with_input(&[0x12, 0x34, 0x56]);

        assert!(channel.byte_available().unwrap());
        assert_eq!(channel.receive_u16().unwrap(), 0x1234);
        assert_eq!(channel.receive_byte().unwrap(), 0x56);
        assert!(!channel.byte_available().unwrap());
        assert!(matches!(channel.receive_byte(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_queue_channel_close() {
        let mut channel = QueueChannel::with_input(b"R");
        channel.close();

        assert!(channel.byte_available().unwrap());
        assert_eq!(channel.receive_byte().unwrap(), b'R');
        assert!(matches!(channel.byte_available(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_send_str() {
        let mut channel = QueueChannel::new();

        channel.send_str("CPU halted.\n").unwrap();
        channel.send_byte(0x55).unwrap();

        assert_eq!(channel.take_output(), b"CPU halted.\n\x55".to_vec());
        assert!(channel.output().is_empty());
    }

    #[test]
    fn test_hex_u16() {
        assert_eq!(hex_u16(0x00AB), "00AB");
        assert_eq!(hex_u16(0xFFFC), "FFFC");
    }

    #[test]
    fn test_bridge_channel_peek_then_receive() {
        let (tx, rx) = mpsc::channel();
        let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut channel = BridgeChannel::new(rx, out_tx, shutdown.clone());

        assert!(!channel.byte_available().unwrap());
        tx.send(b'H').unwrap();
        assert!(channel.byte_available().unwrap());
        assert_eq!(channel.receive_byte().unwrap(), b'H');

        channel.send_byte(b'!').unwrap();
        assert_eq!(out_rx.try_recv().unwrap(), b'!');

        shutdown.store(true, Ordering::Relaxed);
        assert!(matches!(channel.byte_available(), Err(ChannelError::Closed)));
        assert!(matches!(channel.receive_byte(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_bridge_channel_disconnect() {
        let (tx, rx) = mpsc::channel::<u8>();
        let (out_tx, _out_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut channel = BridgeChannel::new(rx, out_tx, Arc::new(AtomicBool::new(false)));

        drop(tx);
        assert!(matches!(channel.receive_byte(), Err(ChannelError::Closed)));
    }
}
