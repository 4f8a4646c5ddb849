//! TCP liveness probing.
//!
//! A port counts as live when a connection to it on the local host succeeds
//! within the timeout. The probe connection is closed immediately.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::trace;

/// Default upper bound for one probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Bounded-latency port prober.
#[derive(Debug, Clone, Copy)]
pub struct Prober {
    timeout: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Prober {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Whether something accepts connections on `port`.
    pub async fn is_port_open(&self, port: u16) -> bool {
        is_port_open(port, self.timeout).await
    }
}

/// Whether something accepts TCP connections on `localhost:port`.
///
/// Never fails: connection errors and timeouts both yield `false`.
pub async fn is_port_open(port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(("localhost", port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            trace!(port, error = %e, "Port probe refused");
            false
        }
        Err(_) => {
            trace!(port, "Port probe timed out");
            false
        }
    }
}
