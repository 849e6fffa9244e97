use crate::symbol::Symbol;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Latest price state of one tracked symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCell {
    /// Identifies this tracked lifetime of the symbol.
    pub epoch: u64,
    /// `None` until the first valid quote arrives.
    pub latest_mid: Option<f64>,
}

/// Sampled price of one symbol, see [`SymbolTable::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub symbol: Symbol,
    pub epoch: u64,
    pub mid: f64,
}

/// Shared table of tracked symbols and their latest mid price, guarded by a single lock.
///
/// The hub tracks & untracks symbols, the price updater writes prices and the sampler reads
/// snapshots.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    cells: Arc<RwLock<FnvHashMap<Symbol, PriceCell>>>,
    next_epoch: Arc<AtomicU64>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self {
            cells: Arc::default(),
            next_epoch: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl SymbolTable {
    /// Start tracking a symbol, returning its epoch. Already tracked symbols keep theirs.
    pub fn track(&self, symbol: Symbol) -> u64 {
        let mut cells = self.cells.write();
        cells
            .entry(symbol)
            .or_insert_with(|| PriceCell {
                epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                latest_mid: None,
            })
            .epoch
    }

    /// Stop tracking a symbol, returning true if it was tracked.
    pub fn untrack(&self, symbol: &Symbol) -> bool {
        self.cells.write().remove(symbol).is_some()
    }

    /// Set the latest mid price of a tracked symbol, returning false if it is not tracked.
    pub fn update(&self, symbol: &Symbol, mid: f64) -> bool {
        match self.cells.write().get_mut(symbol) {
            Some(cell) => {
                cell.latest_mid = Some(mid);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<PriceCell> {
        self.cells.read().get(symbol).copied()
    }

    pub fn is_tracked(&self, symbol: &Symbol) -> bool {
        self.cells.read().contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Copy out every priced symbol, sorted by symbol. The read lock is released before sorting.
    pub fn snapshot(&self) -> Vec<PriceSnapshot> {
        let mut snapshot = {
            let cells = self.cells.read();
            cells
                .iter()
                .filter_map(|(symbol, cell)| {
                    cell.latest_mid.map(|mid| PriceSnapshot {
                        symbol: symbol.clone(),
                        epoch: cell.epoch,
                        mid,
                    })
                })
                .collect::<Vec<_>>()
        };
        snapshot.sort_unstable_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshot
    }
}
