use crate::error::{AmlsError, AmlsResult};
use crate::hal::SerialTransport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
struct LinkState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    write_limit: Option<usize>,
    fail_next: bool,
}

/// In-memory serial link
///
/// Bytes passed to `inject` come out of `read` as if they had arrived on the
/// wire; everything the channel writes is collected for `take_transmitted`.
/// An optional per-write limit models a UART that drains slower than the loop
/// produces.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LinkState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept at most `limit` bytes per `write` call
    pub fn with_write_limit(self, limit: usize) -> Self {
        self.state.lock().write_limit = Some(limit);
        self
    }

    /// Queue bytes for the channel to receive
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes.iter().copied());
    }

    /// Take everything written so far
    pub fn take_transmitted(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().outbound)
    }

    /// Injected bytes not yet read by the channel
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    /// Make the next `read` or `write` fail
    pub fn fail_next_io(&self) {
        self.state.lock().fail_next = true;
    }
}

impl SerialTransport for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> AmlsResult<usize> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(AmlsError::transport("loopback read failed"));
        }

        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> AmlsResult<usize> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(AmlsError::transport("loopback write failed"));
        }

        let n = state.write_limit.map_or(data.len(), |limit| data.len().min(limit));
        state.outbound.extend_from_slice(&data[..n]);
        Ok(n)
    }
}
