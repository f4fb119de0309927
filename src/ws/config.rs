//! Client configuration.

use std::time::Duration;

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Upper bound on the TCP + TLS + WebSocket handshake.
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    /// How long `login()` waits for the venue's acknowledgement.
    pub login_timeout: Duration,
    /// Capacity of every output category queue.
    pub queue_capacity: usize,
    /// Number of conversion workers; clamped to at least 1.
    pub conversion_workers: usize,
    /// Worker backlog above which a warning is logged.
    pub intake_warn_threshold: usize,
    /// Age at which an incomplete snapshot sequence is discarded.
    pub reassembly_ttl: Duration,
    pub reassembly_sweep_interval: Duration,
    /// Bounded wait for tasks to finish on `close()` before they are aborted.
    pub close_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            login_timeout: Duration::from_secs(10),
            queue_capacity: 1024,
            conversion_workers: 2,
            intake_warn_threshold: 10_000,
            reassembly_ttl: Duration::from_secs(30),
            reassembly_sweep_interval: Duration::from_secs(1),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_conversion_workers(mut self, workers: usize) -> Self {
        self.conversion_workers = workers;
        self
    }

    pub fn with_intake_warn_threshold(mut self, threshold: usize) -> Self {
        self.intake_warn_threshold = threshold;
        self
    }

    pub fn with_reassembly_ttl(mut self, ttl: Duration) -> Self {
        self.reassembly_ttl = ttl;
        self
    }

    pub fn with_reassembly_sweep_interval(mut self, interval: Duration) -> Self {
        self.reassembly_sweep_interval = interval;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.conversion_workers.max(1)
    }

    pub(crate) fn capacity(&self) -> usize {
        // tokio's bounded channel panics on zero capacity.
        self.queue_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WsConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.conversion_workers, 2);
        assert_eq!(config.reassembly_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_and_clamps() {
        let config = WsConfig::new("wss://example.invalid/ws")
            .with_conversion_workers(0)
            .with_queue_capacity(0)
            .with_ping_interval(Duration::from_millis(500));
        assert_eq!(config.url, "wss://example.invalid/ws");
        assert_eq!(config.worker_count(), 1);
        assert_eq!(config.capacity(), 1);
        assert_eq!(config.ping_interval, Duration::from_millis(500));
    }
}
