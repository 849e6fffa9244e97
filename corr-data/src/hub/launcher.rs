use crate::{
    config::PipelineConfig,
    streams::{connector::FeedConnector, transport::FeedTransport},
    symbol::{Symbol, SymbolSet},
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Handle to a running feed for one symbol.
#[derive(Debug)]
pub struct FeedHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { token, task }
    }

    /// Request the feed to stop, without waiting for it.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop the feed and wait for its task to finish.
    pub async fn join(self) {
        self.token.cancel();
        if let Err(error) = self.task.await {
            warn!(%error, "Feed task failed while stopping");
        }
    }
}

/// Starts the upstream feed of a newly tracked symbol.
pub trait FeedLauncher: Send + 'static {
    /// Start feeding the symbol until `shutdown` is cancelled. Must not block.
    fn launch(&self, symbol: Symbol, shutdown: CancellationToken) -> FeedHandle;
}

/// [`FeedLauncher`] running one [`FeedConnector`] per symbol, forwarding into the shared raw
/// frame channel.
pub struct ConnectorLauncher {
    config: PipelineConfig,
    transport: Arc<dyn FeedTransport>,
    raw_tx: mpsc::Sender<Bytes>,
}

impl std::fmt::Debug for ConnectorLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorLauncher")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl ConnectorLauncher {
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn FeedTransport>,
        raw_tx: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            config,
            transport,
            raw_tx,
        }
    }
}

impl FeedLauncher for ConnectorLauncher {
    fn launch(&self, symbol: Symbol, shutdown: CancellationToken) -> FeedHandle {
        let config = self.config.clone();
        let transport = Arc::clone(&self.transport);
        let raw_tx = self.raw_tx.clone();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            let connector = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                connector = FeedConnector::init(
                    SymbolSet::from(symbol.clone()),
                    &config,
                    transport,
                    raw_tx,
                    token.clone(),
                ) => connector,
            };

            match connector {
                Ok(connector) => connector.run().await,
                Err(error) => {
                    error!(%symbol, %error, "FeedConnector failed to initialise, symbol will not receive prices");
                }
            }
        });

        FeedHandle::new(shutdown, task)
    }
}
