//! Liveness tracking for a signaling socket.
//!
//! The read loop pings on a fixed interval. Any inbound frame counts as
//! activity and resets the miss counter; once the counter reaches the
//! configured limit the socket is treated as dead.

/// What the read loop should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    SendPing,
    TimedOut,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    max_missed: u32,
    /// Pings sent since the last inbound frame.
    missed: u32,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(max_missed: u32) -> Self {
        Self {
            max_missed,
            missed: 0,
        }
    }

    pub fn on_activity(&mut self) {
        self.missed = 0;
    }

    pub fn on_tick(&mut self) -> HeartbeatAction {
        if self.missed >= self.max_missed {
            return HeartbeatAction::TimedOut;
        }
        self.missed += 1;
        HeartbeatAction::SendPing
    }

    #[must_use]
    pub fn missed(&self) -> u32 {
        self.missed
    }
}
