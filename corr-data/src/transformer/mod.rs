/// Transformer turning raw book ticker frames into mid prices.
pub mod price;
