use crate::{
    correlation::matrix::CorrelationMatrix,
    hub::subscriber::Payload,
    symbol::{Symbol, SymbolSet},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Correlation sub-matrix of a [`SymbolSet`], serialised as
/// `{"BTCUSDT": {"BTCUSDT": 1.0, "ETHUSDT": 0.42}, "ETHUSDT": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SubMatrix(pub BTreeMap<Symbol, BTreeMap<Symbol, f64>>);

impl SubMatrix {
    /// Skeleton with a unit diagonal and every off-diagonal cell at `0.0`.
    pub fn skeleton(symbols: &SymbolSet) -> Self {
        Self(
            symbols
                .iter()
                .map(|row| {
                    let columns = symbols
                        .iter()
                        .map(|column| (column.clone(), if row == column { 1.0 } else { 0.0 }))
                        .collect();
                    (row.clone(), columns)
                })
                .collect(),
        )
    }

    /// Refresh every off-diagonal cell from the full matrix.
    pub fn fill(&mut self, matrix: &CorrelationMatrix) {
        for (row, columns) in self.0.iter_mut() {
            for (column, value) in columns.iter_mut() {
                *value = matrix.get(row, column);
            }
        }
    }

    pub fn get(&self, row: &Symbol, column: &Symbol) -> Option<f64> {
        self.0.get(row).and_then(|columns| columns.get(column)).copied()
    }
}

/// View cached per distinct [`SymbolSet`], shared by every subscriber requesting it.
#[derive(Debug, Clone)]
pub struct CachedView {
    view: SubMatrix,
    subscribers: usize,
}

impl CachedView {
    pub fn new(symbols: &SymbolSet) -> Self {
        Self {
            view: SubMatrix::skeleton(symbols),
            subscribers: 0,
        }
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers
    }

    pub fn retain(&mut self) {
        self.subscribers += 1;
    }

    /// Returns the remaining subscriber count.
    pub fn release(&mut self) -> usize {
        self.subscribers = self.subscribers.saturating_sub(1);
        self.subscribers
    }

    /// Extract the latest values and serialise them once.
    pub fn render(&mut self, matrix: &CorrelationMatrix) -> Result<Payload, serde_json::Error> {
        self.view.fill(matrix);
        serde_json::to_string(&self.view).map(Payload::from)
    }
}
