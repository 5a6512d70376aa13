//! Shared WebSocket connection loop for ticker feeds.
//!
//! Every exchange feed is the same machine: dial with a timeout, send the
//! subscription envelope, read in a loop under a deadline, ping on a timer,
//! and reconnect with exponential backoff on any error. Only the URL, the
//! envelope, and the frame decoder differ per exchange.

use std::time::Duration;

use anyhow::anyhow;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use crate::models::Tick;

pub(crate) const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const READ_DEADLINE: Duration = Duration::from_secs(60);
pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(25);
pub(crate) const PING_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Drive one feed until shutdown: connect, subscribe, read, decode, emit.
///
/// The outbound channel closes exactly once, when this task returns and
/// drops `tx`; transient connection errors keep it open across reconnects.
/// Tick sends are blocking so a stalled consumer backpressures the socket
/// instead of dropping data.
pub(crate) async fn run_feed<F>(
    name: &'static str,
    url: String,
    subscribe_frame: Option<String>,
    mut shutdown: watch::Receiver<bool>,
    tx: mpsc::Sender<Tick>,
    decode: F,
) where
    F: Fn(&str) -> Vec<Tick>,
{
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            return;
        }

        warn!(feed = name, url = %url, "ws connecting");
        let dialed = tokio::select! {
            _ = shutdown.changed() => return,
            res = tokio::time::timeout(DIAL_TIMEOUT, connect_async(&url)) => res,
        };

        let ws = match dialed {
            Ok(Ok((ws, _resp))) => ws,
            Ok(Err(e)) => {
                error!(feed = name, error = %e, "ws dial failed");
                if sleep_backoff(&mut shutdown, &mut backoff).await {
                    return;
                }
                continue;
            }
            Err(_) => {
                error!(feed = name, "ws dial timed out");
                if sleep_backoff(&mut shutdown, &mut backoff).await {
                    return;
                }
                continue;
            }
        };

        let (mut write, mut read) = ws.split();

        if let Some(frame) = &subscribe_frame {
            if let Err(e) = write.send(Message::Text(frame.clone())).await {
                error!(feed = name, error = %e, "subscribe failed");
                if sleep_backoff(&mut shutdown, &mut backoff).await {
                    return;
                }
                continue;
            }
        }

        backoff = INITIAL_BACKOFF;
        info!(feed = name, "ws connected & subscribed");

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // refreshed on every successful read, including pongs
        let mut read_deadline = Instant::now() + READ_DEADLINE;

        let err = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
                _ = tokio::time::sleep_until(read_deadline) => {
                    break anyhow!("read deadline exceeded");
                }
                _ = ping.tick() => {
                    let sent = tokio::time::timeout(
                        PING_WRITE_TIMEOUT,
                        write.send(Message::Ping(b"ping".to_vec())),
                    )
                    .await;
                    match sent {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break anyhow!("ping write failed: {e}"),
                        Err(_) => break anyhow!("ping write timed out"),
                    }
                }
                msg = read.next() => {
                    match msg {
                        None => break anyhow!("stream ended"),
                        Some(Err(e)) => break anyhow!("read error: {e}"),
                        Some(Ok(msg)) => {
                            read_deadline = Instant::now() + READ_DEADLINE;
                            match msg {
                                Message::Text(text) => {
                                    for tick in decode(&text) {
                                        if tx.send(tick).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                Message::Binary(data) => {
                                    let text = String::from_utf8_lossy(&data);
                                    for tick in decode(&text) {
                                        if tx.send(tick).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                Message::Ping(payload) => {
                                    let _ = write.send(Message::Pong(payload)).await;
                                }
                                Message::Close(frame) => {
                                    break anyhow!("server closed: {frame:?}");
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        };

        warn!(feed = name, error = %err, "ws disconnected, reconnecting");
        if sleep_backoff(&mut shutdown, &mut backoff).await {
            return;
        }
    }
}

/// Sleep the current backoff (racing shutdown), then double it up to the cap.
/// Returns true when shutdown fired during the sleep.
async fn sleep_backoff(shutdown: &mut watch::Receiver<bool>, backoff: &mut Duration) -> bool {
    let cancelled = tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(*backoff) => false,
    };
    *backoff = (*backoff * 2).min(MAX_BACKOFF);
    cancelled
}
