use crate::{
    error::DataError, exchange::binance::book_ticker::BinanceBookTickerMessage, state::SymbolTable,
    symbol::Symbol,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of applying one raw frame to the [`SymbolTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum PriceUpdate {
    /// Mid price written for a tracked symbol.
    Updated { symbol: Symbol, mid: f64 },
    /// Valid quote for a symbol no longer tracked, dropped.
    Untracked(Symbol),
}

/// Parses raw book ticker frames and publishes their mid price into the shared
/// [`SymbolTable`].
#[derive(Debug, Clone)]
pub struct PriceUpdater {
    table: SymbolTable,
}

impl PriceUpdater {
    pub fn new(table: SymbolTable) -> Self {
        Self { table }
    }

    /// Apply one raw frame.
    pub fn transform(&self, frame: &[u8]) -> Result<PriceUpdate, DataError> {
        let message = serde_json::from_slice::<BinanceBookTickerMessage>(frame).map_err(|error| {
            DataError::Deserialise {
                error: error.to_string(),
                payload: String::from_utf8_lossy(frame).into_owned(),
            }
        })?;

        let ticker = message.data;
        let mid = ticker.mid_price();
        if !ticker.best_bid_price.is_finite() || !ticker.best_ask_price.is_finite() || !mid.is_finite()
        {
            return Err(DataError::InvalidPrice {
                symbol: ticker.symbol.to_string(),
                bid: ticker.best_bid_price.to_string(),
                ask: ticker.best_ask_price.to_string(),
            });
        }

        if self.table.update(&ticker.symbol, mid) {
            Ok(PriceUpdate::Updated {
                symbol: ticker.symbol,
                mid,
            })
        } else {
            Ok(PriceUpdate::Untracked(ticker.symbol))
        }
    }

    /// Consume raw frames until the channel closes.
    pub async fn run(self, mut frames: mpsc::Receiver<Bytes>) {
        while let Some(frame) = frames.recv().await {
            match self.transform(&frame) {
                Ok(PriceUpdate::Updated { .. }) => {}
                Ok(PriceUpdate::Untracked(symbol)) => {
                    debug!(%symbol, "PriceUpdater dropped quote for untracked symbol");
                }
                Err(error) => {
                    warn!(%error, "PriceUpdater skipped invalid frame");
                }
            }
        }

        info!("PriceUpdater raw frame channel closed, stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(symbol: &str, bid: &str, ask: &str) -> String {
        format!(
            r#"{{"stream":"{}@bookTicker","data":{{"e":"bookTicker","s":"{symbol}","b":"{bid}","a":"{ask}","T":1,"E":2}}}}"#,
            symbol.to_lowercase()
        )
    }

    #[test]
    fn test_transform() {
        struct TestCase {
            input: String,
            expected: Result<PriceUpdate, ()>,
        }

        let table = SymbolTable::default();
        table.track(Symbol::new("BTCUSDT"));
        let updater = PriceUpdater::new(table.clone());

        let tests = vec![
            TestCase {
                // TC0: tracked symbol mid price
                input: frame("BTCUSDT", "100.0", "102.0"),
                expected: Ok(PriceUpdate::Updated {
                    symbol: Symbol::new("BTCUSDT"),
                    mid: 101.0,
                }),
            },
            TestCase {
                // TC1: untracked symbol dropped
                input: frame("ETHUSDT", "1.0", "2.0"),
                expected: Ok(PriceUpdate::Untracked(Symbol::new("ETHUSDT"))),
            },
            TestCase {
                // TC2: malformed json
                input: "{not json".to_string(),
                expected: Err(()),
            },
            TestCase {
                // TC3: non numeric ask
                input: frame("BTCUSDT", "100.0", "abc"),
                expected: Err(()),
            },
            TestCase {
                // TC4: NaN bid
                input: frame("BTCUSDT", "NaN", "100.0"),
                expected: Err(()),
            },
            TestCase {
                // TC5: infinite ask
                input: frame("BTCUSDT", "100.0", "inf"),
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = updater.transform(test.input.as_bytes()).map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }

        // Rejected frames never overwrite the last valid price
        assert_eq!(
            table.get(&Symbol::new("BTCUSDT")).and_then(|cell| cell.latest_mid),
            Some(101.0)
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let table = SymbolTable::default();
        table.track(Symbol::new("ETHUSDT"));
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(PriceUpdater::new(table.clone()).run(rx));
        tx.send(Bytes::from(frame("ETHUSDT", "10", "20"))).await.unwrap();
        tx.send(Bytes::from_static(b"garbage")).await.unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(
            table.get(&Symbol::new("ETHUSDT")).and_then(|cell| cell.latest_mid),
            Some(15.0)
        );
    }
}
