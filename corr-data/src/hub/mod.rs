use self::{
    launcher::{FeedHandle, FeedLauncher},
    subscriber::{Payload, Subscriber, SubscriberId},
    view::CachedView,
};
use crate::{
    config::ChannelCapacities,
    correlation::matrix::SharedMatrix,
    state::SymbolTable,
    symbol::{Symbol, SymbolSet},
};
use fnv::FnvHashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// [`FeedLauncher`](launcher::FeedLauncher) abstraction starting per symbol upstream feeds.
pub mod launcher;

/// Subscriber identity and outbound queue types.
pub mod subscriber;

/// Per [`SymbolSet`] cached correlation views.
pub mod view;

/// Errors returned by [`HubHandle`] operations.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum HubError {
    #[error("hub has stopped")]
    Stopped,
}

/// Control events sent to the [`Hub`].
#[derive(Debug)]
pub enum HubEvent {
    Connect {
        id: SubscriberId,
        tx: mpsc::Sender<Payload>,
    },
    Subscribe {
        id: SubscriberId,
        symbols: SymbolSet,
    },
    Disconnect {
        id: SubscriberId,
    },
}

/// Outcome of one [`Hub::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Distinct views extracted & serialised.
    pub rendered: usize,
    pub delivered: usize,
    /// Payloads dropped because the subscriber queue was full.
    pub dropped: usize,
    /// Subscribers removed because their queue was closed.
    pub closed: usize,
}

/// Cloneable handle used to drive a running [`Hub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    next_id: Arc<AtomicU64>,
    subscriber_capacity: usize,
}

impl HubHandle {
    /// Construct a handle and the event receiver to hand to [`Hub::run`].
    pub fn new(channels: &ChannelCapacities) -> (Self, mpsc::Receiver<HubEvent>) {
        let (events, events_rx) = mpsc::channel(channels.control);
        let handle = Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_capacity: channels.subscriber,
        };
        (handle, events_rx)
    }

    /// Register a new subscriber, returning its id and outbound payload queue.
    pub async fn connect(&self) -> Result<(SubscriberId, mpsc::Receiver<Payload>), HubError> {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.send(HubEvent::Connect { id, tx }).await?;
        Ok((id, rx))
    }

    /// Replace the subscriber's symbol set.
    pub async fn subscribe<Iter, S>(&self, id: SubscriberId, symbols: Iter) -> Result<(), HubError>
    where
        Iter: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let symbols = SymbolSet::new(symbols);
        self.send(HubEvent::Subscribe { id, symbols }).await
    }

    pub async fn disconnect(&self, id: SubscriberId) -> Result<(), HubError> {
        self.send(HubEvent::Disconnect { id }).await
    }

    async fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).await.map_err(|_| HubError::Stopped)
    }
}

/// Owns the subscriber registry and distributes per subscriber correlation views.
///
/// Symbols are reference counted across subscribers: the first subscriber requesting a symbol
/// starts tracking it (and launches its feed), the last one releasing it tears both down.
/// Views are extracted and serialised once per distinct [`SymbolSet`] per broadcast.
#[derive(Debug)]
pub struct Hub<Launcher> {
    launcher: Launcher,
    table: SymbolTable,
    matrix: SharedMatrix,
    subscribers: FnvHashMap<SubscriberId, Subscriber>,
    symbol_counts: FnvHashMap<Symbol, usize>,
    feeds: FnvHashMap<Symbol, FeedHandle>,
    views: FnvHashMap<SymbolSet, CachedView>,
    shutdown: CancellationToken,
}

impl<Launcher> Hub<Launcher>
where
    Launcher: FeedLauncher,
{
    pub fn new(
        launcher: Launcher,
        table: SymbolTable,
        matrix: SharedMatrix,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            table,
            matrix,
            subscribers: FnvHashMap::default(),
            symbol_counts: FnvHashMap::default(),
            feeds: FnvHashMap::default(),
            views: FnvHashMap::default(),
            shutdown,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Number of subscribers currently requesting the symbol.
    pub fn symbol_count(&self, symbol: &Symbol) -> usize {
        self.symbol_counts.get(symbol).copied().unwrap_or(0)
    }

    /// Event loop: pending broadcasts are drained ahead of control events. Ends on shutdown,
    /// when every [`HubHandle`] is dropped, or when the notification source stops.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HubEvent>,
        mut notify: mpsc::Receiver<u64>,
    ) {
        info!("Hub running");

        loop {
            if let Ok(seq) = notify.try_recv() {
                self.broadcast_logged(seq);
                continue;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                seq = notify.recv() => match seq {
                    Some(seq) => self.broadcast_logged(seq),
                    None => {
                        info!("Hub notification channel closed, stopping");
                        break;
                    }
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Hub handles dropped, stopping");
                        break;
                    }
                },
            }
        }

        self.stop_feeds().await;
        info!("Hub stopped");
    }

    pub fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connect { id, tx } => self.connect(id, tx),
            HubEvent::Subscribe { id, symbols } => self.subscribe(id, symbols),
            HubEvent::Disconnect { id } => self.disconnect(id),
        }
    }

    fn connect(&mut self, id: SubscriberId, tx: mpsc::Sender<Payload>) {
        info!(subscriber = %id, "Hub subscriber connected");
        if let Some(previous) = self.subscribers.insert(id, Subscriber::new(id, tx)) {
            warn!(subscriber = %id, "Hub replaced subscriber with duplicate id");
            self.release_all(&previous.symbols);
        }
    }

    fn subscribe(&mut self, id: SubscriberId, symbols: SymbolSet) {
        let Some(subscriber) = self.subscribers.get_mut(&id) else {
            debug!(subscriber = %id, "Hub ignored subscription from unknown subscriber");
            return;
        };

        if subscriber.symbols == symbols {
            return;
        }
        let previous = std::mem::replace(&mut subscriber.symbols, symbols.clone());

        info!(subscriber = %id, symbols = %symbols.joined(), "Hub subscription changed");

        // Retain before releasing so symbols kept across the change never reach zero
        for symbol in symbols.iter().filter(|symbol| !previous.contains(symbol)) {
            self.retain_symbol(symbol);
        }
        for symbol in previous.iter().filter(|symbol| !symbols.contains(symbol)) {
            self.release_symbol(symbol);
        }
        self.retain_view(&symbols);
        self.release_view(&previous);
    }

    fn disconnect(&mut self, id: SubscriberId) {
        match self.subscribers.remove(&id) {
            Some(subscriber) => {
                info!(subscriber = %id, "Hub subscriber disconnected");
                self.release_all(&subscriber.symbols);
            }
            None => debug!(subscriber = %id, "Hub ignored disconnect of unknown subscriber"),
        }
    }

    fn release_all(&mut self, symbols: &SymbolSet) {
        for symbol in symbols {
            self.release_symbol(symbol);
        }
        self.release_view(symbols);
    }

    fn retain_symbol(&mut self, symbol: &Symbol) {
        let count = self.symbol_counts.entry(symbol.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }

        let epoch = self.table.track(symbol.clone());
        let feed = self
            .launcher
            .launch(symbol.clone(), self.shutdown.child_token());
        if let Some(stale) = self.feeds.insert(symbol.clone(), feed) {
            stale.stop();
        }
        info!(%symbol, epoch, "Hub started tracking symbol");
    }

    fn release_symbol(&mut self, symbol: &Symbol) {
        let Some(count) = self.symbol_counts.get_mut(symbol) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }

        self.symbol_counts.remove(symbol);
        self.table.untrack(symbol);
        if let Some(feed) = self.feeds.remove(symbol) {
            feed.stop();
        }
        info!(%symbol, "Hub stopped tracking symbol");
    }

    fn retain_view(&mut self, symbols: &SymbolSet) {
        if symbols.is_empty() {
            return;
        }
        self.views
            .entry(symbols.clone())
            .or_insert_with(|| CachedView::new(symbols))
            .retain();
    }

    fn release_view(&mut self, symbols: &SymbolSet) {
        let Some(view) = self.views.get_mut(symbols) else {
            return;
        };
        if view.release() == 0 {
            self.views.remove(symbols);
        }
    }

    /// Deliver the latest view to every subscriber with a non-empty symbol set.
    ///
    /// Delivery never waits: a full subscriber queue drops the payload, a closed one removes the
    /// subscriber.
    pub fn broadcast(&mut self) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut rendered = FnvHashMap::<SymbolSet, Payload>::default();
        let mut closed = Vec::new();

        {
            let matrix = self.matrix.read();

            for (id, subscriber) in &self.subscribers {
                if subscriber.symbols.is_empty() {
                    continue;
                }

                let payload = match rendered.get(&subscriber.symbols) {
                    Some(payload) => Payload::clone(payload),
                    None => {
                        let view = self
                            .views
                            .entry(subscriber.symbols.clone())
                            .or_insert_with(|| CachedView::new(&subscriber.symbols));

                        match view.render(&matrix) {
                            Ok(payload) => {
                                report.rendered += 1;
                                rendered.insert(subscriber.symbols.clone(), Payload::clone(&payload));
                                payload
                            }
                            Err(error) => {
                                error!(%error, symbols = %subscriber.symbols.joined(), "Hub failed to serialise view");
                                continue;
                            }
                        }
                    }
                };

                match subscriber.tx.try_send(payload) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped += 1;
                        debug!(subscriber = %id, "Hub dropped payload, subscriber queue full");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        report.closed = closed.len();
        for id in closed {
            self.disconnect(id);
        }

        report
    }

    fn broadcast_logged(&mut self, seq: u64) {
        let report = self.broadcast();
        debug!(
            seq,
            rendered = report.rendered,
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "Hub broadcast"
        );
    }

    /// Cancel every running feed, then wait for all of them to finish.
    async fn stop_feeds(&mut self) {
        let feeds = self
            .feeds
            .drain()
            .map(|(symbol, feed)| {
                debug!(%symbol, "Hub stopping feed");
                feed.stop();
                feed
            })
            .collect::<Vec<_>>();

        for feed in feeds {
            feed.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolPair;
    use parking_lot::Mutex;
    use std::{sync::atomic::AtomicUsize, time::Duration};

    #[derive(Debug, Default, Clone)]
    struct MockLauncher {
        launched: Arc<Mutex<Vec<Symbol>>>,
        tokens: Arc<Mutex<FnvHashMap<Symbol, CancellationToken>>>,
        finished: Arc<AtomicUsize>,
    }

    impl MockLauncher {
        fn launched(&self) -> Vec<Symbol> {
            self.launched.lock().clone()
        }

        fn is_running(&self, symbol: &str) -> bool {
            self.tokens
                .lock()
                .get(&Symbol::new(symbol))
                .is_some_and(|token| !token.is_cancelled())
        }
    }

    impl FeedLauncher for MockLauncher {
        fn launch(&self, symbol: Symbol, shutdown: CancellationToken) -> FeedHandle {
            self.launched.lock().push(symbol.clone());
            self.tokens.lock().insert(symbol, shutdown.clone());
            let token = shutdown.clone();
            let finished = Arc::clone(&self.finished);
            let task = tokio::spawn(async move {
                token.cancelled().await;
                // Finish on a later poll so stopping must actually wait for the task
                tokio::task::yield_now().await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
            FeedHandle::new(shutdown, task)
        }
    }

    fn hub() -> (Hub<MockLauncher>, MockLauncher, SymbolTable, SharedMatrix) {
        let launcher = MockLauncher::default();
        let table = SymbolTable::default();
        let matrix = SharedMatrix::default();
        let hub = Hub::new(
            launcher.clone(),
            table.clone(),
            matrix.clone(),
            CancellationToken::new(),
        );
        (hub, launcher, table, matrix)
    }

    fn connect(hub: &mut Hub<MockLauncher>, id: u64, capacity: usize) -> mpsc::Receiver<Payload> {
        let (tx, rx) = mpsc::channel(capacity);
        hub.handle_event(HubEvent::Connect { id: SubscriberId(id), tx });
        rx
    }

    fn subscribe(hub: &mut Hub<MockLauncher>, id: u64, symbols: &[&str]) {
        hub.handle_event(HubEvent::Subscribe {
            id: SubscriberId(id),
            symbols: SymbolSet::new(symbols.iter().copied()),
        });
    }

    #[tokio::test]
    async fn test_symbol_lifecycle_is_reference_counted() {
        let (mut hub, launcher, table, _) = hub();
        let btc = Symbol::new("BTCUSDT");
        let eth = Symbol::new("ETHUSDT");

        let _rx_1 = connect(&mut hub, 1, 4);
        let _rx_2 = connect(&mut hub, 2, 4);

        subscribe(&mut hub, 1, &["BTCUSDT", "ETHUSDT"]);
        subscribe(&mut hub, 2, &["ethusdt"]);
        assert_eq!(launcher.launched(), vec![btc.clone(), eth.clone()]);
        assert_eq!(hub.symbol_count(&eth), 2);
        assert!(table.is_tracked(&btc) && table.is_tracked(&eth));

        // Subscriber 1 drops ETH, still held by subscriber 2
        subscribe(&mut hub, 1, &["BTCUSDT"]);
        assert_eq!(hub.symbol_count(&eth), 1);
        assert!(launcher.is_running("ETHUSDT"));

        // Last holder of ETH disconnects
        hub.handle_event(HubEvent::Disconnect { id: SubscriberId(2) });
        assert_eq!(hub.symbol_count(&eth), 0);
        assert!(!table.is_tracked(&eth));
        assert!(!launcher.is_running("ETHUSDT"));
        assert!(launcher.is_running("BTCUSDT"));

        // Re-subscribing starts a new feed
        subscribe(&mut hub, 1, &["BTCUSDT", "ETHUSDT"]);
        assert_eq!(launcher.launched(), vec![btc.clone(), eth.clone(), eth.clone()]);
        assert!(launcher.is_running("ETHUSDT"));

        hub.handle_event(HubEvent::Disconnect { id: SubscriberId(1) });
        assert!(table.is_empty());
        assert_eq!(hub.view_count(), 0);
        assert!(!launcher.is_running("BTCUSDT"));

        // Unknown subscribers are ignored
        hub.handle_event(HubEvent::Disconnect { id: SubscriberId(99) });
        subscribe(&mut hub, 99, &["SOLUSDT"]);
        assert_eq!(launcher.launched().len(), 3);
    }

    #[tokio::test]
    async fn test_broadcast_dedups_identical_symbol_sets() {
        let (mut hub, _, _, matrix) = hub();
        matrix.write().set(
            SymbolPair::new(Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")).unwrap(),
            0.75,
        );

        let mut rx_1 = connect(&mut hub, 1, 4);
        let mut rx_2 = connect(&mut hub, 2, 4);
        let mut rx_3 = connect(&mut hub, 3, 4);
        let mut rx_4 = connect(&mut hub, 4, 4);
        subscribe(&mut hub, 1, &["BTCUSDT", "ETHUSDT"]);
        subscribe(&mut hub, 2, &["ETHUSDT", "BTCUSDT", "BTCUSDT"]);
        subscribe(&mut hub, 3, &["BTCUSDT"]);

        let report = hub.broadcast();
        assert_eq!(
            report,
            BroadcastReport { rendered: 2, delivered: 3, dropped: 0, closed: 0 }
        );
        assert_eq!(hub.view_count(), 2);

        let payload_1 = rx_1.try_recv().unwrap();
        let payload_2 = rx_2.try_recv().unwrap();
        assert_eq!(payload_1.as_str().as_ptr(), payload_2.as_str().as_ptr());
        assert_eq!(payload_1.as_bytes(), payload_2.as_bytes());
        assert_eq!(
            &*payload_1,
            r#"{"BTCUSDT":{"BTCUSDT":1.0,"ETHUSDT":0.75},"ETHUSDT":{"BTCUSDT":0.75,"ETHUSDT":1.0}}"#
        );
        assert_eq!(&*rx_3.try_recv().unwrap(), r#"{"BTCUSDT":{"BTCUSDT":1.0}}"#);

        // Subscriber without symbols receives nothing
        assert!(rx_4.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_drops_on_full_and_removes_closed() {
        let (mut hub, launcher, _, _) = hub();

        let _full = connect(&mut hub, 1, 1);
        let mut healthy = connect(&mut hub, 2, 1);
        let closed = connect(&mut hub, 3, 1);
        for id in 1..=3 {
            subscribe(&mut hub, id, &["BTCUSDT"]);
        }
        drop(closed);

        let first = hub.broadcast();
        assert_eq!(
            first,
            BroadcastReport { rendered: 1, delivered: 2, dropped: 0, closed: 1 }
        );
        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(hub.symbol_count(&Symbol::new("BTCUSDT")), 2);

        healthy.try_recv().unwrap();
        let second = hub.broadcast();
        assert_eq!(
            second,
            BroadcastReport { rendered: 1, delivered: 1, dropped: 1, closed: 0 }
        );
        assert!(healthy.try_recv().is_ok());
        assert!(launcher.is_running("BTCUSDT"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_handle() {
        let launcher = MockLauncher::default();
        let table = SymbolTable::default();
        let matrix = SharedMatrix::default();
        let shutdown = CancellationToken::new();
        let (handle, events) = HubHandle::new(&ChannelCapacities::default());
        let (notify_tx, notify_rx) = mpsc::channel(1);

        let hub = Hub::new(launcher.clone(), table.clone(), matrix, shutdown.clone());
        let task = tokio::spawn(hub.run(events, notify_rx));

        let (id, mut rx) = handle.connect().await.unwrap();
        handle.subscribe(id, ["ethusdt", "btcusdt"]).await.unwrap();

        // Control events are processed in order ahead of the next notification
        tokio::time::sleep(Duration::from_millis(1)).await;
        notify_tx.send(1).await.unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(payload.starts_with(r#"{"BTCUSDT":{"BTCUSDT":1.0,"ETHUSDT":0.0}"#));
        assert!(table.is_tracked(&Symbol::new("ETHUSDT")));

        shutdown.cancel();
        task.await.unwrap();
        assert!(!launcher.is_running("BTCUSDT"));
        assert_eq!(launcher.finished.load(Ordering::SeqCst), 2);
        assert_eq!(handle.disconnect(id).await, Err(HubError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_serves_pending_broadcast_before_control_events() {
        let launcher = MockLauncher::default();
        let table = SymbolTable::default();
        let shutdown = CancellationToken::new();
        let (handle, events) = HubHandle::new(&ChannelCapacities::default());
        let (notify_tx, notify_rx) = mpsc::channel(1);

        let mut hub = Hub::new(
            launcher,
            table.clone(),
            SharedMatrix::default(),
            shutdown.clone(),
        );
        let id = SubscriberId(1);
        let (tx, mut rx) = mpsc::channel(4);
        hub.handle_event(HubEvent::Connect { id, tx });
        hub.handle_event(HubEvent::Subscribe {
            id,
            symbols: SymbolSet::new(["BTCUSDT", "ETHUSDT"]),
        });

        // Both a subscription change and a notification are queued before the hub runs
        handle.subscribe(id, ["SOLUSDT"]).await.unwrap();
        notify_tx.send(1).await.unwrap();
        let task = tokio::spawn(hub.run(events, notify_rx));

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.starts_with(r#"{"BTCUSDT":{"BTCUSDT":1.0,"ETHUSDT":0.0}"#));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(table.is_tracked(&Symbol::new("SOLUSDT")));
        assert!(!table.is_tracked(&Symbol::new("BTCUSDT")));

        notify_tx.send(2).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*second, r#"{"SOLUSDT":{"SOLUSDT":1.0}}"#);

        shutdown.cancel();
        task.await.unwrap();
    }
}
