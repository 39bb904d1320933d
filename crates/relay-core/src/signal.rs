//! Inbound alert payloads and validated trade signals.
//!
//! An `InboundSignal` is the raw document posted by the charting tool.
//! Validation turns it into a normalized `SignalBody`; combined with a
//! dedupe fingerprint and a receive timestamp this becomes a `Signal`,
//! which is immutable apart from its processed flag.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSide {
    Buy,
    Sell,
}

impl SignalSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for SignalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order kind requested by the alert. Market when omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic hash identifying a signal for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalFingerprint(String);

impl SignalFingerprint {
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw alert document as posted by the charting tool.
///
/// Numeric fields arrive as decimal strings; everything is validated
/// before any of it reaches the execution path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSignal {
    pub symbol: String,
    pub side: String,
    pub size: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
}

impl InboundSignal {
    /// Validate and normalize the payload.
    ///
    /// Rejects with a field-level error on the first violation; the
    /// symbol is uppercased so equivalent alerts normalize identically.
    pub fn validate(&self) -> Result<SignalBody> {
        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            return Err(CoreError::validation("symbol", "must not be empty"));
        }

        let side = match self.side.trim().to_ascii_lowercase().as_str() {
            "buy" => SignalSide::Buy,
            "sell" => SignalSide::Sell,
            other => {
                return Err(CoreError::validation(
                    "side",
                    format!("expected `buy` or `sell`, got `{other}`"),
                ))
            }
        };

        let size: Size = self
            .size
            .trim()
            .parse()
            .map_err(|e| CoreError::validation("size", format!("not a decimal: {e}")))?;
        if !size.is_positive() {
            return Err(CoreError::validation("size", "must be positive"));
        }

        let price = match &self.price {
            None => None,
            Some(raw) => {
                let px: Price = raw
                    .trim()
                    .parse()
                    .map_err(|e| CoreError::validation("price", format!("not a decimal: {e}")))?;
                if !px.is_positive() {
                    return Err(CoreError::validation("price", "must be positive"));
                }
                Some(px)
            }
        };

        let order_type = match self.order_type.as_deref().map(str::trim) {
            None | Some("") => OrderKind::default(),
            Some("market") => OrderKind::Market,
            Some("limit") => OrderKind::Limit,
            Some(other) => {
                return Err(CoreError::validation(
                    "order_type",
                    format!("expected `market` or `limit`, got `{other}`"),
                ))
            }
        };

        if order_type == OrderKind::Limit && price.is_none() {
            return Err(CoreError::validation("price", "required for limit orders"));
        }

        Ok(SignalBody {
            symbol: symbol.to_ascii_uppercase(),
            side,
            size,
            price,
            order_type,
        })
    }
}

/// Normalized signal body, the unit over which fingerprints are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBody {
    pub symbol: String,
    pub side: SignalSide,
    pub size: Size,
    pub price: Option<Price>,
    pub order_type: OrderKind,
}

impl SignalBody {
    /// Canonical rendering used as fingerprint input. Stable across
    /// re-deliveries of the same alert.
    pub fn canonical(&self) -> String {
        let price = self
            .price
            .map(|p| p.inner().normalize().to_string())
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}",
            self.symbol,
            self.side,
            self.size.inner().normalize(),
            price,
            self.order_type,
        )
    }
}

/// A validated trade signal ready for fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub fingerprint: SignalFingerprint,
    pub symbol: String,
    pub side: SignalSide,
    pub size: Size,
    pub price: Option<Price>,
    pub order_type: OrderKind,
    /// Receive timestamp (unix milliseconds).
    pub received_at_ms: i64,
    /// Set once the fan-out round for this signal has completed.
    pub processed: bool,
}

impl Signal {
    /// Assemble a signal from its validated body and fingerprint.
    pub fn new(fingerprint: SignalFingerprint, body: SignalBody, received_at_ms: i64) -> Self {
        Self {
            fingerprint,
            symbol: body.symbol,
            side: body.side,
            size: body.size,
            price: body.price,
            order_type: body.order_type,
            received_at_ms,
            processed: false,
        }
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
    }
}
