use crate::{
    correlation::{matrix::SharedMatrix, pair::PairState},
    sampler::PriceMutation,
    symbol::{Symbol, SymbolPair},
};
use fnv::FnvHashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Summary of one applied [`PriceMutation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineUpdate {
    pub seq: u64,
    pub pairs: usize,
    /// True if a sequence gap forced every pair to restart warm-up.
    pub reset: bool,
}

/// Maintains the Pearson correlation of every pair of sampled symbols incrementally, one
/// [`PriceMutation`] at a time, and publishes the results into the [`SharedMatrix`].
#[derive(Debug)]
pub struct CorrelationEngine {
    window: usize,
    pairs: FnvHashMap<SymbolPair, PairState>,
    epochs: FnvHashMap<Symbol, u64>,
    last_seq: Option<u64>,
    matrix: SharedMatrix,
}

impl CorrelationEngine {
    pub fn new(window: usize, matrix: SharedMatrix) -> Self {
        Self {
            window,
            pairs: FnvHashMap::default(),
            epochs: FnvHashMap::default(),
            last_seq: None,
            matrix,
        }
    }

    pub fn pair(&self, pair: &SymbolPair) -> Option<&PairState> {
        self.pairs.get(pair)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Apply one mutation to every pair of its symbols.
    pub fn apply(&mut self, mutation: &PriceMutation) -> EngineUpdate {
        let reset = self
            .last_seq
            .is_some_and(|last| mutation.seq != last + 1);
        if reset {
            warn!(
                last_seq = self.last_seq,
                seq = mutation.seq,
                "CorrelationEngine detected dropped ticks, restarting warm-up"
            );
            self.pairs.clear();
        }
        self.last_seq = Some(mutation.seq);

        // Forget pairs of symbols that disappeared or started a new tracked lifetime
        let epochs = mutation
            .entries
            .iter()
            .map(|entry| (entry.symbol.clone(), entry.epoch))
            .collect::<FnvHashMap<_, _>>();
        self.pairs.retain(|pair, _| {
            [&pair.a, &pair.b].into_iter().all(|symbol| {
                epochs.get(symbol).is_some_and(|epoch| self.epochs.get(symbol) == Some(epoch))
            })
        });
        self.epochs = epochs;

        let entries = &mutation.entries;
        let mut results = Vec::with_capacity(entries.len() * entries.len().saturating_sub(1) / 2);
        for (index, x) in entries.iter().enumerate() {
            for y in &entries[index + 1..] {
                let Some(key) = SymbolPair::new(x.symbol.clone(), y.symbol.clone()) else {
                    continue;
                };

                // Keep x/y aligned with the canonical a/b orientation of the key
                let ((a_new, a_old), (b_new, b_old)) = if key.a == x.symbol {
                    ((x.new, x.old), (y.new, y.old))
                } else {
                    ((y.new, y.old), (x.new, x.old))
                };

                let state = self.pairs.entry(key.clone()).or_default();
                state.update(a_new, a_old, b_new, b_old, self.window);
                results.push((key, state.correlation()));
            }
        }

        let mut matrix = self.matrix.write();
        matrix.retain(|pair| self.pairs.contains_key(pair));
        let pairs = results.len();
        for (pair, correlation) in results {
            matrix.set(pair, correlation);
        }
        matrix.set_seq(mutation.seq);

        EngineUpdate {
            seq: mutation.seq,
            pairs,
            reset,
        }
    }

    /// Apply mutations until shutdown or until the mutation channel closes, sending a latest-wins
    /// notification after each.
    pub async fn run(
        mut self,
        mut mutations: mpsc::Receiver<PriceMutation>,
        notify: mpsc::Sender<u64>,
        shutdown: CancellationToken,
    ) {
        loop {
            let mutation = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                mutation = mutations.recv() => match mutation {
                    Some(mutation) => mutation,
                    None => break,
                },
            };

            let update = self.apply(&mutation);
            debug!(seq = update.seq, pairs = update.pairs, "CorrelationEngine applied mutation");

            match notify.try_send(update.seq) {
                // A pending notification already covers this update
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => {
                    info!("CorrelationEngine notification channel closed, stopping");
                    break;
                }
            }
        }

        info!("CorrelationEngine stopped");
    }
}
