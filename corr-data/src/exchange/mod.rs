/// Binance USD-M futures combined stream integration.
pub mod binance;
