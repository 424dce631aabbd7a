//! CometBFT new-block subscription.
//!
//! Connects to `{rpc}/websocket`, subscribes to `NewBlock` events and turns
//! every notification into a `BlockSigningEvent`. Connection failures and
//! rejected subscribe requests are retried with exponential backoff; only an
//! exhausted retry budget is reported to the caller. The failure count resets
//! once the node acknowledges the subscription or delivers a block.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::constants::*;
use crate::error::{MonitorError, Result};
use crate::validator::BlockSigningEvent;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const NEW_BLOCK_EVENT_TYPE: &str = "tendermint/event/NewBlock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        let spread = (delay.as_millis() as u64) / 4;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(SUBSCRIBE_BACKOFF_BASE_MS),
            max: Duration::from_millis(SUBSCRIBE_BACKOFF_MAX_MS),
            max_attempts: SUBSCRIBE_MAX_ATTEMPTS,
        }
    }
}

/// Derive the websocket URL from an RPC endpoint
pub fn websocket_url(rpc_endpoint: &str) -> Result<String> {
    let trimmed = rpc_endpoint.trim().trim_end_matches('/');
    let base = if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(MonitorError::Config(format!(
            "invalid RPC endpoint {:?}: expected http(s) or ws(s) URL",
            rpc_endpoint
        )));
    };
    if base.ends_with("/websocket") {
        Ok(base)
    } else {
        Ok(format!("{}/websocket", base))
    }
}

#[derive(Debug, Deserialize)]
struct RpcFrame {
    result: Option<SubscriptionResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResult {
    data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
struct EventData {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct NewBlockValue {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct Block {
    header: Header,
    last_commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
struct Header {
    height: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    #[serde(default)]
    signatures: Vec<CommitSig>,
}

#[derive(Debug, Deserialize)]
struct CommitSig {
    validator_address: Option<String>,
}

/// What a single websocket frame means to the subscription
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// Empty `result`: the node accepted the subscribe request
    Ack,
    NewBlock(BlockSigningEvent),
    Other,
}

fn parse_frame(frame: &str) -> Result<Frame> {
    let malformed = |reason: String| MonitorError::Transport(format!("malformed block event: {}", reason));

    let frame: RpcFrame = serde_json::from_str(frame).map_err(|e| malformed(e.to_string()))?;
    if let Some(error) = frame.error {
        return Err(MonitorError::SubscriptionRejected(error.to_string()));
    }
    let Some(result) = frame.result else {
        return Ok(Frame::Other);
    };
    let Some(data) = result.data else {
        return Ok(Frame::Ack);
    };
    if data.kind != NEW_BLOCK_EVENT_TYPE {
        return Ok(Frame::Other);
    }

    let value: NewBlockValue = serde_json::from_value(data.value).map_err(|e| malformed(e.to_string()))?;
    let height = value
        .block
        .header
        .height
        .parse::<i64>()
        .map_err(|_| malformed(format!("invalid height {:?}", value.block.header.height)))?;
    let signers = value
        .block
        .last_commit
        .map(|commit| commit.signatures)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|sig| sig.validator_address)
        .filter(|address| !address.is_empty());

    Ok(Frame::NewBlock(BlockSigningEvent::new(height, signers)))
}

/// Decode one websocket frame. Frames that are not new-block notifications
/// (the subscribe acknowledgement, other event types) yield `None`; a
/// JSON-RPC error frame yields `SubscriptionRejected`.
pub fn parse_new_block(frame: &str) -> Result<Option<BlockSigningEvent>> {
    match parse_frame(frame)? {
        Frame::NewBlock(event) => Ok(Some(event)),
        Frame::Ack | Frame::Other => Ok(None),
    }
}

enum StreamEnd {
    Shutdown,
    Dropped {
        reason: String,
        /// The node acknowledged the subscription or delivered a block
        subscribed: bool,
    },
}

pub struct CometBftSubscriber {
    url: String,
    backoff: BackoffPolicy,
}

impl CometBftSubscriber {
    pub fn new(rpc_endpoint: &str) -> Result<Self> {
        Ok(Self {
            url: websocket_url(rpc_endpoint)?,
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward block events into `events` until shutdown, the receiver goes
    /// away, or every reconnect attempt in a row has failed.
    pub async fn run(
        self,
        events: mpsc::Sender<BlockSigningEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut failures = 0u32;
        loop {
            let reason = match self.connect().await {
                Ok(stream) => match forward_blocks(stream, &self.url, &events, &mut shutdown_rx).await {
                    StreamEnd::Shutdown => return Ok(()),
                    StreamEnd::Dropped { reason, subscribed } => {
                        if subscribed {
                            failures = 0;
                        }
                        reason
                    }
                },
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures >= self.backoff.max_attempts {
                return Err(MonitorError::SubscriptionExhausted {
                    url: self.url.clone(),
                    attempts: failures,
                    last_error: reason,
                });
            }
            let delay = self.backoff.jittered_delay(failures);
            log::warn!(
                "Block subscription to {} failed ({}), retry {}/{} in {:?}",
                self.url,
                reason,
                failures,
                self.backoff.max_attempts,
                delay
            );
            tokio::select! {
                _ = shutdown_rx.recv() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(&self) -> Result<WsStream> {
        let (mut stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| MonitorError::Transport(format!("connect to {} failed: {}", self.url, e)))?;
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "subscribe",
            "id": 1,
            "params": { "query": NEW_BLOCK_QUERY },
        });
        stream
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| MonitorError::Transport(format!("subscribe request failed: {}", e)))?;
        Ok(stream)
    }
}

async fn forward_blocks(
    mut stream: WsStream,
    url: &str,
    events: &mpsc::Sender<BlockSigningEvent>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> StreamEnd {
    let mut subscribed = false;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = stream.close(None).await;
                return StreamEnd::Shutdown;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                    Ok(Frame::Ack) => {
                        if !subscribed {
                            log::info!("Subscribed to new blocks on {}", url);
                        }
                        subscribed = true;
                    }
                    Ok(Frame::NewBlock(event)) => {
                        subscribed = true;
                        if events.send(event).await.is_err() {
                            log::info!("Block event receiver closed, stopping subscription");
                            return StreamEnd::Shutdown;
                        }
                    }
                    Ok(Frame::Other) => {}
                    Err(MonitorError::SubscriptionRejected(reason)) => {
                        let _ = stream.close(None).await;
                        return StreamEnd::Dropped {
                            reason: format!("subscription rejected: {}", reason),
                            subscribed,
                        };
                    }
                    Err(e) => log::warn!("Dropping block event: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    return StreamEnd::Dropped {
                        reason: format!("closed by server: {:?}", frame),
                        subscribed,
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return StreamEnd::Dropped { reason: e.to_string(), subscribed },
                None => return StreamEnd::Dropped { reason: "stream ended".to_string(), subscribed },
            }
        }
    }
}
