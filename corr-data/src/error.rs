use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `corr-data`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("SocketError: {0}")]
    Socket(String),

    #[error("failed to dial upstream {url}: {reason}")]
    Dial { url: String, reason: String },

    #[error("upstream read timeout: no data received for {timeout_secs} seconds")]
    ReadTimeout { timeout_secs: u64 },

    #[error("upstream stream terminated")]
    Terminated,

    #[error("failed to deserialise upstream payload: {error}, payload: {payload}")]
    Deserialise { error: String, payload: String },

    #[error("invalid price for {symbol}: bid={bid}, ask={ask}")]
    InvalidPrice {
        symbol: String,
        bid: String,
        ask: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to construct upstream endpoint from empty symbol set")]
    SymbolsEmpty,
}

impl DataError {
    /// Determine if an error read from an upstream connection means the connection is gone
    /// and must be redialled.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            DataError::Terminated | DataError::ReadTimeout { .. } => true,
            DataError::Socket(error_msg) => {
                let error_lower = error_msg.to_lowercase();
                error_lower.contains("terminated")
                    || error_lower.contains("connectionclosed")
                    || error_lower.contains("alreadyclosed")
                    || error_lower.contains("io(")
                    || error_lower.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DataError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(format!("{value:?}"))
    }
}
