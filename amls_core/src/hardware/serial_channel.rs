use super::ring_buffer::ByteRing;
use crate::hal::SerialTransport;
use log::{debug, warn};
use serde::Serialize;

/// Per-cycle serial fault flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SerialFaults {
    /// Inbound bytes arrived faster than they were read; the oldest were dropped
    pub rx_overflow: bool,
    /// A write was only partially accepted
    pub tx_overflow: bool,
    /// The transport reported an error while polling or flushing
    pub transport_error: bool,
}

impl SerialFaults {
    pub fn any(&self) -> bool {
        self.rx_overflow || self.tx_overflow || self.transport_error
    }
}

/// Running byte counters, kept for the lifetime of the channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SerialStats {
    pub bytes_received: u64,
    pub bytes_transmitted: u64,
    /// Inbound bytes lost to RX overflow
    pub rx_dropped: u64,
    /// Outbound bytes rejected by a full TX ring
    pub tx_rejected: u64,
    pub transport_errors: u64,
}

/// Bidirectional telemetry/command channel over a serial transport
///
/// Two fixed rings sit between the loop and the transport. The loop side
/// (`poll_inbound`, `flush_outbound`) moves bytes to and from the hardware once
/// per cycle; the control side (`read_available`, `write`) only ever touches
/// the rings. Nothing here blocks or retries.
///
/// Overflow is handled differently per direction. `write` truncates, so the
/// caller sees `accepted < bytes.len()` and decides what to do. Inbound bytes
/// have nobody to push back on, so a full RX ring drops its oldest bytes in
/// favour of the newest command traffic.
pub struct SerialChannel {
    rx: ByteRing,
    tx: ByteRing,
    transport: Box<dyn SerialTransport + Send>,
    /// Staging area for transport reads and writes, one ring's worth
    scratch: Box<[u8]>,
    faults: SerialFaults,
    stats: SerialStats,
}

impl SerialChannel {
    /// Create a channel with two rings of `capacity` bytes each
    pub fn new(transport: impl SerialTransport + Send + 'static, capacity: usize) -> Self {
        Self {
            rx: ByteRing::new(capacity),
            tx: ByteRing::new(capacity),
            transport: Box::new(transport),
            scratch: vec![0u8; capacity].into_boxed_slice(),
            faults: SerialFaults::default(),
            stats: SerialStats::default(),
        }
    }

    /// Queue telemetry for transmission
    ///
    /// Returns how many bytes were accepted. Anything past the free TX space is
    /// rejected and flagged as a TX overflow.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let accepted = self.tx.push_truncating(bytes);
        let rejected = bytes.len() - accepted;
        if rejected > 0 {
            self.faults.tx_overflow = true;
            self.stats.tx_rejected += rejected as u64;
            debug!(
                "TX ring full: accepted {} of {} bytes",
                accepted,
                bytes.len()
            );
        }
        accepted
    }

    /// Take every buffered inbound byte, oldest first
    pub fn read_available(&mut self) -> Vec<u8> {
        self.rx.drain_all()
    }

    /// Move buffered inbound bytes into `buf` without allocating
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        self.rx.pop_into(buf)
    }

    /// Inbound bytes waiting to be read
    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    /// Outbound bytes waiting for the transport
    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    /// Free space in the TX ring
    pub fn tx_remaining(&self) -> usize {
        self.tx.remaining()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity()
    }

    /// Pull pending bytes from the transport into the RX ring
    ///
    /// Reads at most one ring's worth per call so the time spent here is
    /// bounded even if the transport keeps producing. Returns the byte count.
    pub fn poll_inbound(&mut self) -> usize {
        let mut total = 0;
        let budget = self.scratch.len();

        while total < budget {
            let n = match self.transport.read(&mut self.scratch[..budget - total]) {
                Ok(0) => break,
                Ok(n) => n.min(budget - total),
                Err(e) => {
                    self.record_transport_error(&e);
                    break;
                }
            };

            let dropped = self.rx.push_overwriting(&self.scratch[..n]);
            if dropped > 0 {
                self.faults.rx_overflow = true;
                self.stats.rx_dropped += dropped as u64;
                warn!("RX ring overflow: dropped {} oldest bytes", dropped);
            }
            self.stats.bytes_received += n as u64;
            total += n;
        }

        total
    }

    /// Hand queued TX bytes to the transport
    ///
    /// One transport write per call; whatever the hardware does not take stays
    /// queued for the next cycle. Returns the byte count written.
    pub fn flush_outbound(&mut self) -> usize {
        if self.tx.is_empty() {
            return 0;
        }

        let pending = self.tx.peek_into(&mut self.scratch);
        match self.transport.write(&self.scratch[..pending]) {
            Ok(written) => {
                let written = written.min(pending);
                self.tx.discard(written);
                self.stats.bytes_transmitted += written as u64;
                written
            }
            Err(e) => {
                self.record_transport_error(&e);
                0
            }
        }
    }

    /// Fault flags raised since the last `take_faults`
    pub fn faults(&self) -> SerialFaults {
        self.faults
    }

    /// Return and clear the fault flags
    pub fn take_faults(&mut self) -> SerialFaults {
        std::mem::take(&mut self.faults)
    }

    pub fn stats(&self) -> SerialStats {
        self.stats
    }

    fn record_transport_error(&mut self, err: &crate::error::AmlsError) {
        self.faults.transport_error = true;
        self.stats.transport_errors += 1;
        warn!("Serial transport error: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SERIAL_BUFFER_CAPACITY;
    use crate::sim::LoopbackTransport;

    fn channel() -> (SerialChannel, LoopbackTransport) {
        let transport = LoopbackTransport::new();
        let channel = SerialChannel::new(transport.clone(), SERIAL_BUFFER_CAPACITY);
        (channel, transport)
    }

    #[test]
    fn write_reports_partial_accept() {
        let (mut channel, _) = channel();
        assert_eq!(channel.write(&[0xAA; 500]), 500);
        assert_eq!(channel.write(&[0xBB; 100]), 12);
        assert!(channel.faults().tx_overflow);
        assert_eq!(channel.stats().tx_rejected, 88);
        assert_eq!(channel.write(&[0xCC; 1]), 0);
    }

    #[test]
    fn accepted_never_exceeds_free_space() {
        let (mut channel, _) = channel();
        for len in [0usize, 1, 37, 511, 512, 513, 2048] {
            let before = channel.tx_remaining();
            let accepted = channel.write(&vec![7u8; len]);
            assert!(accepted <= len);
            assert!(accepted <= before);
            assert_eq!(channel.tx_remaining(), before - accepted);
        }
    }

    #[test]
    fn flush_moves_queued_bytes_to_transport() {
        let (mut channel, transport) = channel();
        channel.write(b"ATT 1.0 2.0 3.0\n");
        assert_eq!(channel.flush_outbound(), 16);
        assert_eq!(transport.take_transmitted(), b"ATT 1.0 2.0 3.0\n".to_vec());
        assert_eq!(channel.tx_len(), 0);
    }

    #[test]
    fn repeated_oversized_writes_keep_first_bytes_in_order() {
        let (mut channel, transport) = channel();
        let first: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
        let second: Vec<u8> = (600..1200u32).map(|i| (i % 251) as u8).collect();

        assert_eq!(channel.write(&first), SERIAL_BUFFER_CAPACITY);
        assert_eq!(channel.write(&second), 0);
        assert_eq!(channel.write(&first), 0);
        assert_eq!(channel.tx_len(), SERIAL_BUFFER_CAPACITY);
        assert_eq!(channel.stats().tx_rejected, (88 + 600 + 600) as u64);

        assert_eq!(channel.flush_outbound(), SERIAL_BUFFER_CAPACITY);
        assert_eq!(transport.take_transmitted(), first[..SERIAL_BUFFER_CAPACITY].to_vec());
        assert_eq!(channel.tx_len(), 0);

        // Space freed by the flush is usable again
        assert_eq!(channel.write(&second[..10]), 10);
        assert_eq!(channel.flush_outbound(), 10);
        assert_eq!(transport.take_transmitted(), second[..10].to_vec());
    }

    #[test]
    fn slow_transport_keeps_remainder_queued() {
        let transport = LoopbackTransport::new().with_write_limit(4);
        let mut channel = SerialChannel::new(transport.clone(), 16);
        channel.write(b"abcdefghij");
        assert_eq!(channel.flush_outbound(), 4);
        assert_eq!(channel.tx_len(), 6);
        assert_eq!(channel.flush_outbound(), 4);
        assert_eq!(channel.flush_outbound(), 2);
        assert_eq!(transport.take_transmitted(), b"abcdefghij".to_vec());
    }

    #[test]
    fn inbound_bytes_are_read_in_order() {
        let (mut channel, transport) = channel();
        transport.inject(b"LAND");
        transport.inject(b"\n");
        assert_eq!(channel.poll_inbound(), 5);
        assert_eq!(channel.read_available(), b"LAND\n".to_vec());
        assert!(channel.read_available().is_empty());
    }

    #[test]
    fn inbound_flood_keeps_newest_bytes() {
        let (mut channel, transport) = channel();
        let flood: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
        transport.inject(&flood);

        channel.poll_inbound();
        channel.poll_inbound();

        let retained = channel.read_available();
        assert_eq!(retained.len(), SERIAL_BUFFER_CAPACITY);
        assert_eq!(retained, flood[600 - SERIAL_BUFFER_CAPACITY..].to_vec());
        assert!(channel.take_faults().rx_overflow);
        assert_eq!(channel.stats().rx_dropped, 88);
    }

    #[test]
    fn poll_inbound_is_bounded_per_call() {
        let (mut channel, transport) = channel();
        transport.inject(&[1u8; 2000]);
        assert_eq!(channel.poll_inbound(), SERIAL_BUFFER_CAPACITY);
        assert_eq!(transport.pending_inbound(), 2000 - SERIAL_BUFFER_CAPACITY);
    }

    #[test]
    fn transport_errors_are_flags_not_failures() {
        let (mut channel, transport) = channel();
        transport.fail_next_io();
        assert_eq!(channel.poll_inbound(), 0);
        let faults = channel.take_faults();
        assert!(faults.transport_error);
        assert!(!channel.take_faults().any());
        assert_eq!(channel.stats().transport_errors, 1);
    }
}
