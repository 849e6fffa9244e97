use crate::{error::DataError, symbol::SymbolSet};
use itertools::Itertools;
use url::Url;

/// Deserialisable [`BookTicker`](book_ticker::BinanceBookTicker) combined stream payload.
pub mod book_ticker;

/// [`BinanceFuturesUsd`] combined stream base url, the `/` separated stream list is appended.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams>
pub const BASE_URL_BINANCE_FUTURES_COMBINED: &str = "wss://fstream.binance.com/stream?streams=";

/// Binance best bid/ask stream name suffix.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Individual-Symbol-Book-Ticker-Streams>
pub const CHANNEL_BOOK_TICKER: &str = "@bookTicker";

/// Construct the combined stream [`Url`] subscribing to the book ticker of every provided
/// symbol, eg/ `wss://fstream.binance.com/stream?streams=btcusdt@bookTicker/ethusdt@bookTicker`.
pub fn book_ticker_url(base_url: &str, symbols: &SymbolSet) -> Result<Url, DataError> {
    if symbols.is_empty() {
        return Err(DataError::SymbolsEmpty);
    }

    let streams = symbols
        .iter()
        .map(|symbol| format!("{}{CHANNEL_BOOK_TICKER}", symbol.to_lowercase()))
        .join("/");

    Url::parse(&format!("{base_url}{streams}")).map_err(|error| DataError::Dial {
        url: format!("{base_url}{streams}"),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_ticker_url() {
        struct TestCase {
            base_url: &'static str,
            symbols: SymbolSet,
            expected: Result<&'static str, DataError>,
        }

        let tests = vec![
            TestCase {
                // TC0: single symbol lower-cased
                base_url: BASE_URL_BINANCE_FUTURES_COMBINED,
                symbols: SymbolSet::new(["BTCUSDT"]),
                expected: Ok("wss://fstream.binance.com/stream?streams=btcusdt@bookTicker"),
            },
            TestCase {
                // TC1: multiple symbols joined with '/' in canonical order
                base_url: BASE_URL_BINANCE_FUTURES_COMBINED,
                symbols: SymbolSet::new(["ETHUSDT", "btcusdt"]),
                expected: Ok(
                    "wss://fstream.binance.com/stream?streams=btcusdt@bookTicker/ethusdt@bookTicker",
                ),
            },
            TestCase {
                // TC2: base url override
                base_url: "ws://127.0.0.1:9000/stream?streams=",
                symbols: SymbolSet::new(["SOLUSDT"]),
                expected: Ok("ws://127.0.0.1:9000/stream?streams=solusdt@bookTicker"),
            },
            TestCase {
                // TC3: empty symbol set
                base_url: BASE_URL_BINANCE_FUTURES_COMBINED,
                symbols: SymbolSet::default(),
                expected: Err(DataError::SymbolsEmpty),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = book_ticker_url(test.base_url, &test.symbols);
            match (actual, test.expected) {
                (Ok(actual), Ok(expected)) => {
                    assert_eq!(actual.as_str(), expected, "TC{} failed", index)
                }
                (Err(actual), Err(expected)) => {
                    assert_eq!(actual, expected, "TC{} failed", index)
                }
                (actual, expected) => {
                    panic!("TC{index} failed because actual != expected. \nActual: {actual:?}\nExpected: {expected:?}\n");
                }
            }
        }
    }
}
