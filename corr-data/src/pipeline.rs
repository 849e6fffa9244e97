use crate::{
    config::PipelineConfig,
    correlation::{engine::CorrelationEngine, matrix::SharedMatrix},
    error::DataError,
    hub::{
        Hub, HubHandle,
        launcher::{ConnectorLauncher, FeedLauncher},
    },
    sampler::Sampler,
    state::SymbolTable,
    streams::transport::FeedTransport,
    transformer::price::PriceUpdater,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Running correlation pipeline: feeds -> price updater -> sampler -> engine -> hub.
#[derive(Debug)]
pub struct Pipeline {
    hub: HubHandle,
    table: SymbolTable,
    matrix: SharedMatrix,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the pipeline with one [`FeedConnector`](crate::streams::connector::FeedConnector)
    /// per tracked symbol dialled over the provided transport.
    pub fn spawn(
        config: PipelineConfig,
        transport: Arc<dyn FeedTransport>,
    ) -> Result<Self, DataError> {
        let launcher_config = config.clone();
        Self::spawn_with(config, move |raw_tx| {
            ConnectorLauncher::new(launcher_config, transport, raw_tx)
        })
    }

    /// Spawn the pipeline with a custom [`FeedLauncher`], constructed from the sender feeds
    /// must forward raw frames into.
    pub fn spawn_with<Launcher, F>(config: PipelineConfig, launcher: F) -> Result<Self, DataError>
    where
        Launcher: FeedLauncher,
        F: FnOnce(mpsc::Sender<Bytes>) -> Launcher,
    {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let table = SymbolTable::default();
        let matrix = SharedMatrix::default();

        let (raw_tx, raw_rx) = mpsc::channel(config.channels.raw_frames);
        let (mutation_tx, mutation_rx) = mpsc::channel(config.channels.mutations);
        let (notify_tx, notify_rx) = mpsc::channel(config.channels.broadcast);
        let (hub, events) = HubHandle::new(&config.channels);

        let tasks = vec![
            tokio::spawn(PriceUpdater::new(table.clone()).run(raw_rx)),
            tokio::spawn(Sampler::new(table.clone(), config.window_size).run(
                config.sample_period,
                mutation_tx,
                shutdown.clone(),
            )),
            tokio::spawn(
                CorrelationEngine::new(config.window_size, matrix.clone()).run(
                    mutation_rx,
                    notify_tx,
                    shutdown.clone(),
                ),
            ),
            tokio::spawn(
                Hub::new(launcher(raw_tx), table.clone(), matrix.clone(), shutdown.clone())
                    .run(events, notify_rx),
            ),
        ];

        info!(
            window_size = config.window_size,
            sample_period_ms = config.sample_period.as_millis() as u64,
            "Pipeline started"
        );

        Ok(Self {
            hub,
            table,
            matrix,
            shutdown,
            tasks,
        })
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn matrix(&self) -> &SharedMatrix {
        &self.matrix
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        drop(self.hub);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Pipeline stopped");
    }
}
