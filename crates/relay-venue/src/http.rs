//! HTTP venue adapter.
//!
//! Speaks the venue's authenticated REST API for submit/query/cancel and
//! keeps a WebSocket subscription open for asynchronous order updates.
//! The REST session and the push stream are owned exclusively by this
//! adapter; nothing else touches the underlying connections.

use crate::adapter::{OrderAck, OrderUpdate, ProbeReport, VenueAdapter, VenuePosition};
use crate::error::{VenueError, VenueResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use relay_core::{ClientOrderId, OrderKind, OrderRequest, Price, SignalSide, Size, VenueId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Header carrying the venue API credential.
const API_KEY_HEADER: &str = "X-API-Key";

/// Capacity of the order-update broadcast channel.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

/// Configuration for one HTTP venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier used in records and logs.
    pub id: String,
    /// Base URL of the REST API.
    pub rest_url: String,
    /// Order-update push endpoint. Updates are skipped when absent.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// API credential sent as a request header.
    pub api_key: String,
    /// Timeout for submit/query/cancel requests (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Timeout for health probes (ms), separate from request timeout.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    client_order_id: &'a str,
    symbol: &'a str,
    side: SignalSide,
    size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Price>,
    order_type: OrderKind,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    filled: Option<Size>,
    #[serde(default)]
    remaining: Option<Size>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    size: Size,
    #[serde(default)]
    entry_price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderUpdateFrame {
    #[serde(default)]
    filled: Option<Size>,
    #[serde(default)]
    remaining: Option<Size>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Default)]
struct StreamTask {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Venue adapter over REST + WebSocket.
pub struct HttpVenue {
    id: VenueId,
    base: String,
    config: VenueConfig,
    client: reqwest::Client,
    connected: RwLock<bool>,
    stream_task: Mutex<StreamTask>,
    updates_tx: broadcast::Sender<OrderUpdate>,
}

impl HttpVenue {
    /// Build an adapter from its configuration.
    pub fn new(config: VenueConfig) -> VenueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| VenueError::Transport(format!("failed to build HTTP client: {e}")))?;
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            id: VenueId::new(config.id.clone()),
            base: config.rest_url.trim_end_matches('/').to_string(),
            config,
            client,
            connected: RwLock::new(false),
            stream_task: Mutex::new(StreamTask::default()),
            updates_tx,
        })
    }

    /// Whether `connect` has completed without a matching `disconnect`.
    pub fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    async fn read_order_response(
        &self,
        response: reqwest::Response,
        order: Option<&OrderRequest>,
    ) -> VenueResult<OrderAck> {
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VenueError::Response(e.to_string()))?;
        let parsed: OrderResponse = serde_json::from_value(raw.clone())
            .map_err(|e| VenueError::Response(e.to_string()))?;
        ack_from_response(order, parsed, raw)
    }

    async fn stop_stream(&self) {
        let (token, handle) = {
            let mut task = self.stream_task.lock();
            (task.token.take(), task.handle.take())
        };
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl VenueAdapter for HttpVenue {
    fn id(&self) -> &VenueId {
        &self.id
    }

    async fn connect(&self) -> VenueResult<()> {
        // A previous stream must be gone before a new one starts.
        self.stop_stream().await;

        self.probe()
            .await
            .map_err(|e| VenueError::Connect(format!("probe failed: {e}")))?;

        if let Some(ws_url) = self.config.ws_url.clone() {
            let (stream, _response) = connect_async(&ws_url)
                .await
                .map_err(|e| VenueError::Connect(format!("order stream: {e}")))?;

            let token = CancellationToken::new();
            let handle = tokio::spawn(run_order_stream(
                stream,
                self.config.api_key.clone(),
                self.id.clone(),
                self.updates_tx.clone(),
                token.clone(),
            ));

            let mut task = self.stream_task.lock();
            task.token = Some(token);
            task.handle = Some(handle);
        }

        *self.connected.write() = true;
        info!(venue = %self.id, "Venue connected");
        Ok(())
    }

    async fn disconnect(&self) -> VenueResult<()> {
        self.stop_stream().await;
        *self.connected.write() = false;
        info!(venue = %self.id, "Venue disconnected");
        Ok(())
    }

    async fn submit_order(&self, order: &OrderRequest) -> VenueResult<OrderAck> {
        // Fresh idempotency token per call; a retried submit must never
        // replay the previous nonce.
        let cloid = ClientOrderId::new();
        let body = SubmitBody {
            client_order_id: cloid.as_str(),
            symbol: &order.symbol,
            side: order.side,
            size: order.size,
            price: order.price,
            order_type: order.order_type,
        };

        debug!(venue = %self.id, cloid = %cloid, symbol = %order.symbol, "Submitting order");

        let response = self
            .client
            .post(self.endpoint("orders"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http(status, body));
        }

        self.read_order_response(response, Some(order)).await
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderAck> {
        let response = self
            .client
            .get(self.endpoint(&format!("orders/{order_id}")))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(VenueError::OrderNotFound(order_id.to_string()));
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http(status, body));
        }

        self.read_order_response(response, None).await
    }

    async fn cancel_order(&self, order_id: &str) -> VenueResult<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("orders/{order_id}")))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(VenueError::OrderNotFound(order_id.to_string()));
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http(status, body));
        }
        Ok(())
    }

    async fn position(&self, symbol: &str) -> VenueResult<VenuePosition> {
        let response = self
            .client
            .get(self.endpoint(&format!("positions/{symbol}")))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http(status, body));
        }

        let parsed: PositionResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Response(e.to_string()))?;
        Ok(VenuePosition {
            symbol: parsed.symbol,
            size: parsed.size,
            entry_price: parsed.entry_price,
        })
    }

    async fn probe(&self) -> VenueResult<ProbeReport> {
        let started = Instant::now();
        let response = self
            .client
            .get(self.endpoint("ping"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(Duration::from_millis(self.config.probe_timeout_ms))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http(status, body));
        }

        let parsed: PingResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Response(e.to_string()))?;

        Ok(ProbeReport {
            status: parsed.status.unwrap_or_else(|| "ok".to_string()),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn order_updates(&self) -> broadcast::Receiver<OrderUpdate> {
        self.updates_tx.subscribe()
    }
}

/// Map a non-success HTTP status onto the error taxonomy: 4xx is a
/// business rejection, everything else is server-side and transient.
fn classify_http(status: u16, body: String) -> VenueError {
    if (400..500).contains(&status) && status != 429 {
        VenueError::Rejected(format!("HTTP {status}: {body}"))
    } else {
        VenueError::Http { status, body }
    }
}

fn ack_from_response(
    order: Option<&OrderRequest>,
    parsed: OrderResponse,
    raw: serde_json::Value,
) -> VenueResult<OrderAck> {
    if parsed.status.as_deref() == Some("rejected") {
        return Err(VenueError::Rejected(
            parsed.reason.unwrap_or_else(|| "rejected".to_string()),
        ));
    }

    let filled = parsed.filled.unwrap_or(Size::ZERO);
    let remaining = match parsed.remaining {
        Some(r) => r,
        None => order
            .map(|o| o.size.saturating_sub(filled))
            .unwrap_or(Size::ZERO),
    };

    Ok(OrderAck {
        order_id: parsed.order_id,
        filled,
        remaining,
        raw,
    })
}

/// Push-subscription reader. Forwards order-state-change frames to the
/// broadcast channel until cancelled or the stream drops; reconnection
/// is the health monitor's job, not this task's.
async fn run_order_stream(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    api_key: String,
    venue: VenueId,
    tx: broadcast::Sender<OrderUpdate>,
    token: CancellationToken,
) {
    let (mut write, mut read) = stream.split();

    let subscribe = serde_json::json!({ "op": "subscribe", "channel": "orders", "key": api_key });
    if let Err(e) = write.send(Message::Text(subscribe.to_string())).await {
        warn!(venue = %venue, ?e, "Failed to send order subscription");
        return;
    }

    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!(venue = %venue, "Order stream cancelled");
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_order_update(&venue, &text) {
                            Ok(Some(update)) => {
                                // A send error only means nobody is listening right now.
                                let _ = tx.send(update);
                            }
                            Ok(None) => {}
                            Err(e) => debug!(venue = %venue, %e, "Ignoring unparseable push frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!(venue = %venue, "Order stream closed by venue");
                        return;
                    }
                    Some(Err(e)) => {
                        error!(venue = %venue, ?e, "Order stream read error");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Parse one push frame. Frames without an `order_id` (subscription acks,
/// heartbeats) are not order updates and are skipped.
fn parse_order_update(venue: &VenueId, text: &str) -> VenueResult<Option<OrderUpdate>> {
    let raw: serde_json::Value =
        serde_json::from_str(text).map_err(|e| VenueError::Response(e.to_string()))?;

    let Some(order_id) = raw.get("order_id").and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    let order_id = order_id.to_string();

    let frame: OrderUpdateFrame =
        serde_json::from_value(raw.clone()).map_err(|e| VenueError::Response(e.to_string()))?;

    Ok(Some(OrderUpdate {
        venue: venue.clone(),
        order_id,
        filled: frame.filled.unwrap_or(Size::ZERO),
        remaining: frame.remaining.unwrap_or(Size::ZERO),
        state: frame.state.unwrap_or_else(|| "unknown".to_string()),
        raw,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> OrderRequest {
        OrderRequest {
            symbol: "ETH-PERP".to_string(),
            side: SignalSide::Buy,
            size: Size::new(dec!(1.0)),
            price: None,
            order_type: OrderKind::Market,
        }
    }

    #[test]
    fn test_classify_http() {
        assert!(matches!(classify_http(400, String::new()), VenueError::Rejected(_)));
        assert!(matches!(classify_http(403, String::new()), VenueError::Rejected(_)));
        assert!(matches!(classify_http(429, String::new()), VenueError::Http { .. }));
        assert!(matches!(classify_http(503, String::new()), VenueError::Http { .. }));
        assert!(classify_http(503, String::new()).is_transient());
        assert!(!classify_http(400, String::new()).is_transient());
    }

    #[test]
    fn test_ack_fills_remaining_from_order() {
        let raw = serde_json::json!({ "order_id": "v-1", "filled": "0.4" });
        let parsed: OrderResponse = serde_json::from_value(raw.clone()).unwrap();
        let ack = ack_from_response(Some(&sample_order()), parsed, raw).unwrap();
        assert_eq!(ack.order_id, "v-1");
        assert_eq!(ack.filled, Size::new(dec!(0.4)));
        assert_eq!(ack.remaining, Size::new(dec!(0.6)));
    }

    #[test]
    fn test_ack_rejected_status_is_business_error() {
        let raw = serde_json::json!({
            "order_id": "v-2",
            "status": "rejected",
            "reason": "insufficient funds"
        });
        let parsed: OrderResponse = serde_json::from_value(raw.clone()).unwrap();
        let err = ack_from_response(Some(&sample_order()), parsed, raw).unwrap_err();
        assert!(matches!(err, VenueError::Rejected(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_parse_order_update() {
        let venue = VenueId::from("hyper");
        let update = parse_order_update(
            &venue,
            r#"{"order_id":"v-3","filled":"1.0","remaining":"0","state":"filled"}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(update.venue, venue);
        assert_eq!(update.order_id, "v-3");
        assert_eq!(update.filled, Size::new(dec!(1.0)));
        assert_eq!(update.state, "filled");
    }

    #[test]
    fn test_parse_skips_frames_without_order_id() {
        let venue = VenueId::from("hyper");
        let ack = parse_order_update(&venue, r#"{"op":"subscribed","channel":"orders"}"#).unwrap();
        assert!(ack.is_none());
    }

    #[test]
    fn test_submit_body_serialization() {
        let order = sample_order();
        let body = SubmitBody {
            client_order_id: "relay_1_abc",
            symbol: &order.symbol,
            side: order.side,
            size: order.size,
            price: order.price,
            order_type: order.order_type,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["side"], "buy");
        assert_eq!(json["order_type"], "market");
        assert!(json.get("price").is_none());
    }
}
