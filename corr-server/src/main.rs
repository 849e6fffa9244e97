use crate::{
    config::ServerConfig,
    request::{OriginPolicy, parse_subscription},
};
use chrono::Utc;
use corr_data::{hub::HubHandle, pipeline::Pipeline, streams::transport::WsTransport};
use futures::{SinkExt, StreamExt};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
    },
};
use tracing::{debug, error, info, warn};

mod config;
mod request;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    init_logging(config.json_logs);

    info!(
        window_size = config.pipeline.window_size,
        sample_period_ms = config.pipeline.sample_period.as_millis() as u64,
        base_url = %config.pipeline.base_url,
        allowed_origins = ?config.allowed_origins,
        "Starting corr-server"
    );

    let transport = Arc::new(WsTransport::new(config.pipeline.read_timeout));
    let pipeline = Pipeline::spawn(config.pipeline.clone(), transport)?;

    let listener = TcpListener::bind(config.addr).await?;
    info!("WebSocket server listening on ws://{}{}", config.addr, request::WS_PATH);

    let policy = Arc::new(OriginPolicy::new(config.allowed_origins));
    let shutdown = pipeline.shutdown_token();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("New TCP connection from {}", peer_addr);
                    tokio::spawn(handle_client(
                        stream,
                        peer_addr,
                        pipeline.hub().clone(),
                        Arc::clone(&policy),
                    ));
                }
                Err(error) => warn!(%error, "Failed to accept TCP connection"),
            },
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

/// Bridge one WebSocket client to the hub: subscription requests flow in, correlation views
/// flow out.
async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    policy: Arc<OriginPolicy>,
) {
    let ws_stream = match accept_hdr_async(stream, |request: &Request, response: Response| {
        policy.check(request, response)
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {}", peer_addr, e);
            return;
        }
    };

    let (id, mut payloads) = match hub.connect().await {
        Ok(subscriber) => subscriber,
        Err(error) => {
            error!(%error, "Hub unavailable, closing connection from {}", peer_addr);
            return;
        }
    };

    info!(subscriber = %id, "WebSocket handshake completed for {}", peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = serde_json::json!({
        "type": "welcome",
        "message": "Connected to corr-server, send a comma separated symbol list to subscribe",
        "timestamp": Utc::now()
    });
    if let Ok(msg) = serde_json::to_string(&welcome) {
        let _ = ws_sender.send(Message::Text(msg.into())).await;
    }

    // Write loop: forward every queued view until the queue or the socket closes
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = payloads.recv().await {
            if ws_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let subscriptions = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => match parse_subscription(text.as_str()) {
                    Ok(symbols) => {
                        debug!(subscriber = %id, symbols = %symbols.joined(), "Subscription request");
                        if subscriptions.subscribe(id, symbols.iter().cloned()).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(subscriber = %id, %error, "Ignoring invalid subscription request from {}", peer_addr);
                    }
                },
                Ok(Message::Ping(_)) => debug!("Received ping from {}", peer_addr),
                Err(e) => {
                    error!("WebSocket error for {}: {}", peer_addr, e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!("Send task completed for {}", peer_addr);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("Receive task completed for {}", peer_addr);
            send_task.abort();
        }
    }

    let _ = hub.disconnect(id).await;
    info!(subscriber = %id, "WebSocket connection closed for {}", peer_addr);
}

/// Initialise logging, `LOG_FORMAT=json` selects JSON output.
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
