use crate::symbol::{Symbol, SymbolPair};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Correlation matrix shared between the engine (writer) and the hub (reader).
pub type SharedMatrix = Arc<RwLock<CorrelationMatrix>>;

/// Sparse symmetric correlation matrix holding one value per unordered [`SymbolPair`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationMatrix {
    values: FnvHashMap<SymbolPair, f64>,
    /// Sequence number of the last applied mutation.
    seq: u64,
}

impl CorrelationMatrix {
    /// Correlation between two symbols: `1.0` on the diagonal, `0.0` if unknown.
    pub fn get(&self, a: &Symbol, b: &Symbol) -> f64 {
        match SymbolPair::new(a.clone(), b.clone()) {
            None => 1.0,
            Some(pair) => self.values.get(&pair).copied().unwrap_or(0.0),
        }
    }

    pub fn set(&mut self, pair: SymbolPair, correlation: f64) {
        self.values.insert(pair, correlation);
    }

    /// Drop every pair not satisfying the predicate.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&SymbolPair) -> bool,
    {
        self.values.retain(|pair, _| keep(pair));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_symmetric_with_unit_diagonal() {
        let btc = Symbol::new("BTCUSDT");
        let eth = Symbol::new("ETHUSDT");
        let sol = Symbol::new("SOLUSDT");

        let mut matrix = CorrelationMatrix::default();
        matrix.set(SymbolPair::new(eth.clone(), btc.clone()).unwrap(), 0.5);

        assert_eq!(matrix.get(&btc, &btc), 1.0);
        assert_eq!(matrix.get(&btc, &eth), 0.5);
        assert_eq!(matrix.get(&eth, &btc), 0.5);
        assert_eq!(matrix.get(&btc, &sol), 0.0);

        matrix.retain(|pair| !pair.contains(&eth));
        assert!(matrix.is_empty());
    }
}
