//! WebSocket event fan-out. External consumers connect here and receive
//! every message-bus event as a JSON frame.

use crate::domain::events::AgentMessage;
use crate::infrastructure::message_bus::MessageBus;
use anyhow::Result;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Keep-alive ping after this much client silence.
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const FRAME_BUFFER: usize = 256;

pub struct WsServer {
    bind_addr: String,
    bus: MessageBus,
}

impl WsServer {
    pub fn new(bind_addr: &str, bus: MessageBus) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            bus,
        }
    }

    /// Accept clients until shutdown. Every bus message is serialized once
    /// and fanned out through a broadcast channel; dead or lagging clients
    /// are dropped without affecting siblings.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let (frame_tx, _) = broadcast::channel::<String>(FRAME_BUFFER);

        let fanout_tx = frame_tx.clone();
        self.bus
            .subscribe_all(Arc::new(move |msg: AgentMessage| {
                let fanout_tx = fanout_tx.clone();
                Box::pin(async move {
                    let frame = serde_json::to_string(&serde_json::json!({
                        "type": format!("agent:{}", msg.topic),
                        "data": {
                            "sender": msg.sender,
                            "topic": msg.topic,
                            "payload": msg.payload,
                            "timestamp": msg.timestamp,
                            "priority": msg.priority,
                        },
                    }))?;
                    // Send fails only when no client is connected.
                    let _ = fanout_tx.send(frame);
                    Ok(())
                })
            }))
            .await;

        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!("WebSocket event server listening on {}", self.bind_addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("WebSocket client connecting from {peer}");
                            let frames = frame_tx.subscribe();
                            let client_shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, frames, client_shutdown).await {
                                    debug!("WebSocket client ended: {e:#}");
                                }
                            });
                        }
                        Err(e) => warn!("WebSocket accept failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("WebSocket server stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    mut frames: broadcast::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    ws.send(Message::Text(
        serde_json::to_string(&serde_json::json!({
            "type": "connected",
            "service": "ualgotrade",
            "timestamp": Utc::now(),
        }))?
        .into(),
    ))
    .await?;

    let mut last_activity = tokio::time::Instant::now();

    loop {
        let keep_alive_at = last_activity + KEEP_ALIVE;
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Ok(text) => ws.send(Message::Text(text.into())).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, dropped {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = tokio::time::Instant::now();
                        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text)
                            && value.get("type").and_then(|t| t.as_str()) == Some("ping")
                        {
                            ws.send(Message::Text(
                                serde_json::to_string(&serde_json::json!({
                                    "type": "pong",
                                    "timestamp": Utc::now(),
                                }))?
                                .into(),
                            ))
                            .await?;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_activity = tokio::time::Instant::now();
                        ws.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {
                        last_activity = tokio::time::Instant::now();
                    }
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            _ = tokio::time::sleep_until(keep_alive_at) => {
                // Silence: nudge the client so half-open connections die.
                ws.send(Message::Text(
                    serde_json::to_string(&serde_json::json!({
                        "type": "ping",
                        "timestamp": Utc::now(),
                    }))?
                    .into(),
                ))
                .await?;
                last_activity = tokio::time::Instant::now();
            }
            _ = shutdown.changed() => {
                let _ = ws.close(None).await;
                return Ok(());
            }
        }
    }
}
