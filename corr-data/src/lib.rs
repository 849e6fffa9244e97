#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! # Corr-Data
//! Real-time rolling correlation pipeline over live market data:
//! * **Resilient ingestion**: one [`FeedConnector`](streams::connector::FeedConnector) per
//!   tracked symbol, gated by a [`CircuitBreaker`](streams::breaker::CircuitBreaker) with
//!   randomised exponential backoff redials.
//! * **Sliding windows**: a timer driven [`Sampler`](sampler::Sampler) pushes every symbol's
//!   mid price into a fixed capacity [`RingBuffer`](window::RingBuffer).
//! * **Incremental correlation**: the [`CorrelationEngine`](correlation::engine::CorrelationEngine)
//!   updates the Pearson coefficient of every symbol pair in O(1) per tick.
//! * **Deduplicated dispatch**: the [`Hub`](hub::Hub) serialises each distinct subscribed
//!   symbol set once per broadcast and never blocks on a slow subscriber.
//!
//! Use [`Pipeline::spawn`](pipeline::Pipeline::spawn) to wire every stage together and drive
//! subscribers through the returned [`HubHandle`](hub::HubHandle).

/// Pipeline configuration and defaults.
pub mod config;

/// Incremental pairwise Pearson correlation.
pub mod correlation;

/// Generic serde deserialisation helpers.
pub mod de;

/// All [`Error`](std::error::Error)s generated in Corr-Data.
pub mod error;

/// Upstream exchange endpoints and payloads.
pub mod exchange;

/// Subscriber registry, view cache and broadcast.
pub mod hub;

/// Wiring of every stage into a running pipeline.
pub mod pipeline;

/// Timer driven price sampler producing [`PriceMutation`](sampler::PriceMutation)s.
pub mod sampler;

/// Shared table of tracked symbols and their latest mid price.
pub mod state;

/// Upstream connection management.
pub mod streams;

/// [`Symbol`](symbol::Symbol), canonical [`SymbolSet`](symbol::SymbolSet) and
/// [`SymbolPair`](symbol::SymbolPair).
pub mod symbol;

/// Raw frame to price transformers.
pub mod transformer;

/// Fixed capacity sliding window ring buffer.
pub mod window;
