use crate::symbol::SymbolSet;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Serialised view shared by every subscriber of the same [`SymbolSet`].
///
/// Reference counted UTF-8 bytes: cloning per subscriber and handing it to a socket as a text
/// frame never copies the JSON.
pub type Payload = Utf8Bytes;

/// Unique identifier of a connected subscriber.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct SubscriberId(pub u64);

/// Hub side state of one connected subscriber.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    /// Canonical requested symbols, empty until the first subscription.
    pub symbols: SymbolSet,
    pub tx: mpsc::Sender<Payload>,
}

impl Subscriber {
    pub fn new(id: SubscriberId, tx: mpsc::Sender<Payload>) -> Self {
        Self {
            id,
            symbols: SymbolSet::default(),
            tx,
        }
    }
}
