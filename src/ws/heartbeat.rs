//! Application-level keepalive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::ws::connection::Connection;
use crate::ws::MessageOut;

/// Send `MessageOut::Ping` every `interval` until shutdown or the connection drops.
///
/// The first tick is skipped. Pongs are swallowed by the router; a missing
/// pong is not treated as fatal here since the read loop sees a dead socket.
pub(crate) async fn run(
    conn: Arc<Connection>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.reset();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !conn.state().is_connected() {
                    break;
                }
                if let Err(e) = conn.send(&MessageOut::Ping).await {
                    tracing::debug!("Heartbeat stopped: {}", e);
                    break;
                }
                tracing::trace!("Ping sent");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::ConnectionState;

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_not_connected() {
        let conn = Arc::new(Connection::new());
        let (_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(conn, Duration::from_secs(20), rx));
        tokio::time::advance(Duration::from_secs(21)).await;
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let conn = Arc::new(Connection::new());
        conn.set_state(ConnectionState::Connected);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(conn, Duration::from_secs(20), rx));
        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }
}
