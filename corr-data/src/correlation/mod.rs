/// [`CorrelationEngine`](engine::CorrelationEngine) applying price mutations to every pair.
pub mod engine;

/// Shared sparse [`CorrelationMatrix`](matrix::CorrelationMatrix).
pub mod matrix;

/// Incremental per-pair Pearson statistics.
pub mod pair;
