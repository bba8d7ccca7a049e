use crate::client::StreamHandle;
use crate::protocol::LogEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Streaming,
    Stopped,
    Error(String),
}

// Owns exactly one live subscription at a time. The buffer is append-only for
// the life of one session; every restart clears it and bumps the session id,
// which is what keeps queued events from a retired subscription out.
pub struct LogStream {
    status: StreamStatus,
    events: Vec<LogEvent>,
    session: u64,
    handle: Option<StreamHandle>,
}

impl LogStream {
    pub fn new() -> Self {
        Self {
            status: StreamStatus::Idle,
            events: Vec::new(),
            session: 0,
            handle: None,
        }
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    // Starts a new session: retires any live subscription, resets the buffer,
    // and returns the session id the caller must tag inbound events with.
    pub fn begin(&mut self) -> u64 {
        self.retire();
        self.events.clear();
        self.session += 1;
        self.status = StreamStatus::Streaming;
        self.session
    }

    pub fn attach(&mut self, handle: StreamHandle) {
        self.handle = Some(handle);
    }

    pub fn push(&mut self, session: u64, event: LogEvent) -> bool {
        if session != self.session || self.status != StreamStatus::Streaming {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn fail(&mut self, session: u64, message: String) {
        if session != self.session || self.status != StreamStatus::Streaming {
            return;
        }
        self.retire();
        self.status = StreamStatus::Error(message);
    }

    // Graceful transport end; the run finished and the server closed the feed.
    pub fn close(&mut self, session: u64) {
        if session != self.session || self.status != StreamStatus::Streaming {
            return;
        }
        self.retire();
        self.status = StreamStatus::Stopped;
    }

    // Idempotent; a stop before any begin is a no-op.
    pub fn stop(&mut self) {
        if self.status != StreamStatus::Streaming {
            return;
        }
        self.retire();
        self.status = StreamStatus::Stopped;
    }

    fn retire(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.retire();
    }
}
