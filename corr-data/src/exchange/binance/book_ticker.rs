use crate::{
    de::{de_str, de_u64_epoch_ms_as_datetime_utc},
    symbol::Symbol,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binance combined stream envelope wrapping every payload with the name of the stream it
/// was published on.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams>
/// ```json
/// {
///     "stream": "btcusdt@bookTicker",
///     "data": { ... }
/// }
/// ```
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BinanceCombinedStream<T> {
    pub stream: String,
    pub data: T,
}

/// Binance real-time best bid/ask update.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Individual-Symbol-Book-Ticker-Streams>
/// ```json
/// {
///     "e": "bookTicker",
///     "u": 400900217,
///     "E": 1568014460893,
///     "T": 1568014460891,
///     "s": "BNBUSDT",
///     "b": "25.35190000",
///     "B": "31.21000000",
///     "a": "25.36520000",
///     "A": "40.66000000"
/// }
/// ```
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BinanceBookTicker {
    #[serde(alias = "e", default)]
    pub event_type: String,
    #[serde(alias = "s")]
    pub symbol: Symbol,
    #[serde(alias = "b", deserialize_with = "de_str")]
    pub best_bid_price: f64,
    #[serde(alias = "a", deserialize_with = "de_str")]
    pub best_ask_price: f64,
    #[serde(
        alias = "T",
        default,
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc"
    )]
    pub time_exchange: DateTime<Utc>,
    #[serde(
        alias = "E",
        default,
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc"
    )]
    pub time_event: DateTime<Utc>,
}

impl BinanceBookTicker {
    /// Mid price between best bid and best ask.
    pub fn mid_price(&self) -> f64 {
        (self.best_bid_price + self.best_ask_price) / 2.0
    }
}

/// Terse type alias for a combined stream [`BinanceBookTicker`] message.
pub type BinanceBookTickerMessage = BinanceCombinedStream<BinanceBookTicker>;
