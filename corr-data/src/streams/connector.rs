use crate::{
    config::PipelineConfig,
    error::DataError,
    exchange::binance::book_ticker_url,
    streams::{
        backoff::Backoff,
        breaker::CircuitBreaker,
        transport::{FeedTransport, FrameStream},
    },
    symbol::SymbolSet,
};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

type Relay = mpsc::Receiver<Result<Bytes, DataError>>;

/// Maintains one live upstream connection for a group of symbols and forwards its raw frames
/// downstream, redialling under [`CircuitBreaker`] control with randomised exponential backoff.
///
/// Network reads happen in a separate read loop task that pushes frames into a bounded relay,
/// while [`FeedConnector::run`] drains that relay.
pub struct FeedConnector {
    symbols: SymbolSet,
    url: Url,
    transport: Arc<dyn FeedTransport>,
    breaker: CircuitBreaker,
    backoff: Backoff,
    relay_capacity: usize,
    relay: Relay,
    reader: CancellationToken,
    downstream: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for FeedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnector")
            .field("symbols", &self.symbols)
            .field("url", &self.url.as_str())
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl FeedConnector {
    /// Dial the upstream for the provided symbols and start the read loop.
    ///
    /// A failure to establish the initial connection is returned as an error.
    pub async fn init(
        symbols: SymbolSet,
        config: &PipelineConfig,
        transport: Arc<dyn FeedTransport>,
        downstream: mpsc::Sender<Bytes>,
        shutdown: CancellationToken,
    ) -> Result<Self, DataError> {
        let url = book_ticker_url(&config.base_url, &symbols)?;
        let stream = transport.dial(&url).await?;

        info!(symbols = %symbols.joined(), %url, "FeedConnector connected");

        let (reader, relay) = spawn_read_loop(stream, config.channels.relay, &shutdown);

        Ok(Self {
            symbols,
            url,
            transport,
            breaker: CircuitBreaker::new(config.fail_threshold, config.success_needed),
            backoff: Backoff::new(config.backoff),
            relay_capacity: config.channels.relay,
            relay,
            reader,
            downstream,
            shutdown,
        })
    }

    /// Spawn [`Self::run`] onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatch loop: forward relayed frames downstream while the [`CircuitBreaker`] permits,
    /// otherwise redial until permission is regranted.
    ///
    /// Ends on shutdown or when the downstream channel closes.
    pub async fn run(mut self) {
        loop {
            if !self.breaker.request_permission() && !self.reconnect().await {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.relay.recv() => next,
            };

            match next {
                Some(Ok(frame)) => {
                    let sent = tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        sent = self.downstream.send(frame) => sent,
                    };

                    if sent.is_err() {
                        info!(symbols = %self.symbols.joined(), "FeedConnector downstream closed, stopping");
                        break;
                    }
                    self.breaker.record_success();
                }
                Some(Err(error)) => {
                    warn!(symbols = %self.symbols.joined(), %error, "FeedConnector read failed");
                    self.breaker.record_failure();

                    if error.is_terminal() && !self.reconnect().await {
                        break;
                    }
                }
                None => {
                    warn!(symbols = %self.symbols.joined(), "FeedConnector relay terminated");
                    self.breaker.record_failure();

                    if !self.reconnect().await {
                        break;
                    }
                }
            }
        }

        self.reader.cancel();
        info!(symbols = %self.symbols.joined(), "FeedConnector stopped");
    }

    /// Redial with randomised exponential backoff until a dial succeeds and the
    /// [`CircuitBreaker`] permits reads. Returns false if shutdown was requested first.
    async fn reconnect(&mut self) -> bool {
        self.reader.cancel();
        self.backoff.reset();

        loop {
            let delay = self.backoff.next_delay();
            debug!(
                symbols = %self.symbols.joined(),
                delay_ms = delay.as_millis() as u64,
                base_ms = self.backoff.base().as_millis() as u64,
                "FeedConnector waiting before redial"
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }

            let dialled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                dialled = self.transport.dial(&self.url) => dialled,
            };

            match dialled {
                Ok(stream) => {
                    self.breaker.set_dial_state(true);
                    let (reader, relay) =
                        spawn_read_loop(stream, self.relay_capacity, &self.shutdown);
                    self.reader = reader;
                    self.relay = relay;

                    if self.breaker.request_permission() {
                        info!(
                            symbols = %self.symbols.joined(),
                            state = %self.breaker.state(),
                            "FeedConnector reconnected"
                        );
                        return true;
                    }
                }
                Err(error) => {
                    self.breaker.set_dial_state(false);
                    error!(symbols = %self.symbols.joined(), %error, "FeedConnector redial failed");
                }
            }

            self.backoff.escalate();
        }
    }
}

/// Spawn a read loop pushing every frame (or error) from the stream into a new bounded relay.
///
/// The loop ends after relaying a terminal error, on end of stream, or on cancellation of the
/// returned token (a child of `shutdown`).
fn spawn_read_loop(
    mut stream: FrameStream,
    capacity: usize,
    shutdown: &CancellationToken,
) -> (CancellationToken, Relay) {
    let token = shutdown.child_token();
    let (relay_tx, relay_rx) = mpsc::channel(capacity);

    let reader = token.clone();
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = reader.cancelled() => break,
                next = stream.next() => next,
            };

            let (item, terminal) = match next {
                Some(Ok(frame)) => (Ok(frame), false),
                Some(Err(error)) => {
                    let terminal = error.is_terminal();
                    (Err(error), terminal)
                }
                None => (Err(DataError::Terminated), true),
            };

            let sent = tokio::select! {
                biased;
                _ = reader.cancelled() => break,
                sent = relay_tx.send(item) => sent,
            };

            if sent.is_err() || terminal {
                break;
            }
        }
    });

    (token, relay_rx)
}
