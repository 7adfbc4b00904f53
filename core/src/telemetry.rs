//! Running counters for the session. Nothing here feeds back into the
//! simulation; it only exists to be logged or inspected.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Telemetry {
    pub ticks: u64,
    pub frames_decoded: u64,
    pub bytes_decoded: u64,
    /// Ticks since the last frame arrived.
    pub idle_ticks: u32,
    pub route_requests: u64,
    pub route_failures: u64,
    /// Requests dropped because a bounded table was full.
    pub soft_failures: u64,
}

impl Telemetry {
    pub fn record_frame(&mut self, body_len: usize) {
        self.frames_decoded += 1;
        self.bytes_decoded += body_len as u64;
        self.idle_ticks = 0;
    }

    pub fn record_tick(&mut self) {
        self.ticks += 1;
        self.idle_ticks = self.idle_ticks.saturating_add(1);
    }

    pub fn log_summary(&self) {
        log::info!(
            "ticks {} frames {} bytes {} routes {}/{} failed, soft failures {}",
            self.ticks,
            self.frames_decoded,
            self.bytes_decoded,
            self.route_failures,
            self.route_requests,
            self.soft_failures
        );
    }
}
