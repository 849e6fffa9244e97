use crate::{state::SymbolTable, symbol::Symbol, window::RingBuffer};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// New sample and evicted victim of one symbol at one sampling tick.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MutationEntry {
    pub symbol: Symbol,
    pub epoch: u64,
    pub new: f64,
    pub old: f64,
}

/// Batch of [`MutationEntry`]s produced by one sampling tick, in canonical symbol order.
///
/// `seq` increments for every produced mutation, delivered or not, so consumers can detect
/// dropped ticks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceMutation {
    pub seq: u64,
    pub sampled_at: DateTime<Utc>,
    pub entries: Vec<MutationEntry>,
}

#[derive(Debug, Clone)]
struct SymbolWindow {
    epoch: u64,
    buffer: RingBuffer,
}

/// Periodically samples the latest mid price of every priced symbol into its sliding window.
#[derive(Debug)]
pub struct Sampler {
    table: SymbolTable,
    window_size: usize,
    windows: FnvHashMap<Symbol, SymbolWindow>,
    seq: u64,
}

impl Sampler {
    pub fn new(table: SymbolTable, window_size: usize) -> Self {
        Self {
            table,
            window_size,
            windows: FnvHashMap::default(),
            seq: 0,
        }
    }

    /// Take one sample, returning `None` if no tracked symbol has a price yet.
    pub fn sample(&mut self, sampled_at: DateTime<Utc>) -> Option<PriceMutation> {
        let snapshot = self.table.snapshot();

        let live = snapshot
            .iter()
            .map(|price| (&price.symbol, price.epoch))
            .collect::<FnvHashMap<_, _>>();
        self.windows
            .retain(|symbol, window| live.get(symbol) == Some(&window.epoch));

        if snapshot.is_empty() {
            return None;
        }

        let entries = snapshot
            .into_iter()
            .map(|price| {
                let window = self
                    .windows
                    .entry(price.symbol.clone())
                    .or_insert_with(|| SymbolWindow {
                        epoch: price.epoch,
                        buffer: RingBuffer::new(self.window_size),
                    });

                MutationEntry {
                    old: window.buffer.add(price.mid),
                    new: price.mid,
                    epoch: price.epoch,
                    symbol: price.symbol,
                }
            })
            .collect();

        self.seq += 1;
        Some(PriceMutation {
            seq: self.seq,
            sampled_at,
            entries,
        })
    }

    /// Current window of a symbol, oldest first.
    pub fn window(&self, symbol: &Symbol) -> Option<Vec<f64>> {
        self.windows.get(symbol).map(|window| window.buffer.get_all())
    }

    /// Sample every `period` until shutdown or until the mutation channel closes. A mutation
    /// that does not fit in the channel is dropped.
    pub async fn run(
        mut self,
        period: Duration,
        mutations: mpsc::Sender<PriceMutation>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(mutation) = self.sample(Utc::now()) else {
                continue;
            };

            match mutations.try_send(mutation) {
                Ok(()) => {}
                Err(TrySendError::Full(mutation)) => {
                    debug!(seq = mutation.seq, "Sampler dropped tick, engine busy");
                }
                Err(TrySendError::Closed(_)) => {
                    info!("Sampler mutation channel closed, stopping");
                    break;
                }
            }
        }
    }
}
