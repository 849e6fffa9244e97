/// Randomised exponential backoff used between redial attempts.
pub mod backoff;

/// Circuit breaker deciding whether upstream reads are permitted.
pub mod breaker;

/// [`FeedConnector`](connector::FeedConnector) maintaining a resilient upstream connection.
pub mod connector;

/// Idle read timeout stream wrapper.
pub mod timeout;

/// [`FeedTransport`](transport::FeedTransport) abstraction over upstream connections.
pub mod transport;
