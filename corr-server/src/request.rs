use corr_data::symbol::SymbolSet;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    http::{StatusCode, header::ORIGIN},
};
use tracing::warn;

/// Maximum length of one subscription request in bytes.
pub const MAX_REQUEST_LEN: usize = 1024;

/// Maximum number of symbols in one subscription request.
pub const MAX_SYMBOLS: usize = 50;

/// Maximum length of one symbol.
pub const MAX_SYMBOL_LEN: usize = 20;

/// Path clients connect on.
pub const WS_PATH: &str = "/ws";

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RequestError {
    #[error("request of {0} bytes exceeds {MAX_REQUEST_LEN}")]
    TooLong(usize),

    #[error("request of {0} symbols exceeds {MAX_SYMBOLS}")]
    TooManySymbols(usize),

    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),
}

/// Parse a comma separated subscription request, eg/ "BTCUSDT,ethusdt".
///
/// An empty (or all whitespace) request clears the subscription.
pub fn parse_subscription(text: &str) -> Result<SymbolSet, RequestError> {
    if text.len() > MAX_REQUEST_LEN {
        return Err(RequestError::TooLong(text.len()));
    }
    if text.trim().is_empty() {
        return Ok(SymbolSet::default());
    }

    let symbols = text.split(',').map(str::trim).collect::<Vec<_>>();
    if symbols.len() > MAX_SYMBOLS {
        return Err(RequestError::TooManySymbols(symbols.len()));
    }

    if let Some(invalid) = symbols.iter().find(|symbol| !is_valid_symbol(symbol)) {
        return Err(RequestError::InvalidSymbol(invalid.to_string()));
    }

    Ok(SymbolSet::new(symbols))
}

fn is_valid_symbol(symbol: &str) -> bool {
    (1..=MAX_SYMBOL_LEN).contains(&symbol.len())
        && symbol.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

/// WebSocket handshake policy: only [`WS_PATH`] is served, and browser clients must present an
/// allowed `Origin`.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == origin)
    }

    /// Handshake callback for [`accept_hdr_async`](tokio_tungstenite::accept_hdr_async).
    #[allow(clippy::result_large_err)]
    pub fn check(&self, request: &Request, response: Response) -> Result<Response, ErrorResponse> {
        if request.uri().path() != WS_PATH {
            return Err(reject(StatusCode::NOT_FOUND, "not found"));
        }

        match request.headers().get(ORIGIN) {
            None => {
                warn!("WebSocket handshake without Origin header, assuming non-browser client");
                Ok(response)
            }
            Some(origin) => match origin.to_str() {
                Ok(origin) if self.is_allowed(origin) => Ok(response),
                _ => {
                    warn!(?origin, "WebSocket handshake rejected, origin not allowed");
                    Err(reject(StatusCode::FORBIDDEN, "origin not allowed"))
                }
            },
        }
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
