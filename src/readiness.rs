use crate::error::{ProvisionError, Result};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Block until something accepts TCP connections on `localhost:port`.
///
/// Each failed attempt is followed by a fixed [`POLL_INTERVAL`] pause; once a
/// failure happens after `timeout` has elapsed the wait gives up.
pub async fn wait_for_port(port: u16, timeout: Duration) -> Result<()> {
    let start = Instant::now();

    loop {
        match TcpStream::connect(("localhost", port)).await {
            Ok(stream) => {
                drop(stream);
                tracing::debug!("Port {} is accepting connections", port);
                return Ok(());
            }
            Err(e) => {
                tracing::trace!("Port {} not ready: {}", port, e);
                if start.elapsed() > timeout {
                    return Err(ProvisionError::PortTimeout { port, timeout });
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
