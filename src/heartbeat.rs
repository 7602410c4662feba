//! Periodic tasks: heartbeat scheduler and stats logging
//!
//! Both run independently of message traffic and talk to the actor
//! through its command channel, so they never touch shared state
//! directly.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::server::ServerCommand;

/// How often the periodic stats line is logged
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Drive the liveness sweep on a fixed period
///
/// Ends when the actor's command channel closes.
pub async fn run_heartbeat(cmd_tx: mpsc::Sender<ServerCommand>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; skip it so the first ping goes
    // out one full period after startup
    interval.tick().await;

    loop {
        interval.tick().await;
        if cmd_tx.send(ServerCommand::Heartbeat).await.is_err() {
            break;
        }
    }
}

/// Log an aggregate stats line once a minute
pub async fn run_stats_logger(cmd_tx: mpsc::Sender<ServerCommand>) {
    let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        if cmd_tx
            .send(ServerCommand::GetStats { reply: reply_tx })
            .await
            .is_err()
        {
            break;
        }
        let Ok(stats) = reply_rx.await else {
            break;
        };

        let hours = stats.uptime / 3600;
        let minutes = (stats.uptime % 3600) / 60;
        let seconds = stats.uptime % 60;
        info!(
            "Server stats - uptime: {}h {}m {}s, connections: {}/{}, messages: {}, memory: {}MB ({}%)",
            hours,
            minutes,
            seconds,
            stats.active_connections,
            stats.total_connections,
            stats.total_messages,
            stats.memory_usage.used,
            stats.memory_usage.percentage,
        );
    }
}
