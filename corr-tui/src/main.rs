use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::{SinkExt, StreamExt};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table},
};
use serde::Deserialize;
use std::{collections::BTreeMap, io, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Server address, configurable via `CORR_SERVER_URL`.
const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8080/ws";

/// Symbols requested when none are passed on the command line.
const DEFAULT_SYMBOLS: [&str; 2] = ["BTCUSDT", "ETHUSDT"];

/// Correlation view pushed by corr-server, keyed by row then column symbol.
type Matrix = BTreeMap<String, BTreeMap<String, f64>>;

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum ServerMessage {
    Welcome {
        #[serde(rename = "type")]
        kind: String,
        message: String,
    },
    Matrix(Matrix),
}

/// Application state
#[derive(Debug, Clone)]
struct AppState {
    symbols: Vec<String>,
    matrix: Matrix,
    updates: u64,
    last_update: Option<DateTime<Utc>>,
    server_message: Option<String>,
    last_error: Option<String>,
    connected: bool,
}

impl AppState {
    fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            matrix: Matrix::new(),
            updates: 0,
            last_update: None,
            server_message: None,
            last_error: None,
            connected: false,
        }
    }

    fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Welcome { kind, message } => {
                self.server_message = Some(format!("{kind}: {message}"));
            }
            ServerMessage::Matrix(matrix) => {
                self.matrix = matrix;
                self.updates += 1;
                self.last_update = Some(Utc::now());
            }
        }
    }

    /// Row labels in display order: the matrix keys once a view arrived, otherwise the request.
    fn labels(&self) -> Vec<String> {
        if self.matrix.is_empty() {
            self.symbols.clone()
        } else {
            self.matrix.keys().cloned().collect()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::var("CORR_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let symbols = parse_symbols(std::env::args().skip(1));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let state = Arc::new(Mutex::new(AppState::new(symbols.clone())));

    let state_clone = state.clone();
    tokio::spawn(async move {
        websocket_client(url, symbols, state_clone).await;
    });

    let res = run_app(&mut terminal, state).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

/// Uppercase and deduplicate symbols from the command line, falling back to the defaults.
fn parse_symbols<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut symbols = args
        .into_iter()
        .flat_map(|arg| {
            arg.split(',')
                .map(|symbol| symbol.trim().to_uppercase())
                .filter(|symbol| !symbol.is_empty())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    if symbols.is_empty() {
        symbols = DEFAULT_SYMBOLS.iter().map(|symbol| symbol.to_string()).collect();
    }

    symbols.sort();
    symbols.dedup();
    symbols
}

async fn websocket_client(url: String, symbols: Vec<String>, state: Arc<Mutex<AppState>>) {
    let request = symbols.join(",");

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                {
                    let mut s = state.lock().await;
                    s.connected = true;
                    s.last_error = None;
                }

                let (mut write, mut read) = ws_stream.split();

                if let Err(e) = write.send(Message::Text(request.clone().into())).await {
                    state.lock().await.last_error = Some(format!("subscribe failed: {e}"));
                } else {
                    // Spawn ping task to keep connection alive
                    let (ping_tx, mut ping_rx) = tokio::sync::mpsc::channel::<()>(1);
                    let ping = tokio::spawn(async move {
                        let mut interval = tokio::time::interval(Duration::from_secs(30));
                        loop {
                            interval.tick().await;
                            if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                                break;
                            }
                        }
                        let _ = ping_tx.send(()).await;
                    });

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                let Some(msg) = msg else {
                                    break;
                                };
                                match msg {
                                    Ok(Message::Text(text)) => {
                                        let parsed = serde_json::from_str::<ServerMessage>(text.as_str());
                                        let mut s = state.lock().await;
                                        match parsed {
                                            Ok(message) => s.apply(message),
                                            Err(e) => s.last_error = Some(format!("bad message: {e}")),
                                        }
                                    }
                                    Ok(Message::Close(_)) => break,
                                    Err(e) => {
                                        state.lock().await.last_error = Some(e.to_string());
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                            _ = ping_rx.recv() => break,
                        }
                    }

                    ping.abort();
                }

                state.lock().await.connected = false;
            }
            Err(e) => {
                state.lock().await.last_error = Some(format!("connect failed: {e}"));
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        // Wait before reconnecting
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    state: Arc<Mutex<AppState>>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = std::time::Instant::now();

    loop {
        let state_snapshot = {
            let s = state.lock().await;
            s.clone()
        };

        terminal.draw(|f| ui(f, &state_snapshot))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') || key.code == KeyCode::Esc {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = std::time::Instant::now();
        }
    }
}

fn ui(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_status_bar(f, chunks[0], state);
    render_matrix(f, chunks[1], state);
    render_footer(f, chunks[2], state);
}

fn render_status_bar(f: &mut Frame, area: Rect, state: &AppState) {
    let status_symbol = if state.connected { "●" } else { "○" };
    let status_color = if state.connected {
        Color::Rgb(0, 255, 127)
    } else {
        Color::Rgb(255, 69, 58)
    };
    let status_text = if state.connected {
        "CONNECTED"
    } else {
        "DISCONNECTED"
    };

    let status = Span::styled(
        format!(" {} {} ", status_symbol, status_text),
        Style::default()
            .fg(status_color)
            .add_modifier(Modifier::BOLD),
    );

    let time = match state.last_update {
        Some(time) => format!(" ⏱  {} ", time.format("%H:%M:%S%.3f")),
        None => " ⏱  waiting ".to_string(),
    };
    let time = Span::styled(time, Style::default().fg(Color::Rgb(100, 149, 237)));

    let title = Span::styled(
        " ◆ CORRELATION MATRIX ◆ ",
        Style::default()
            .fg(Color::Rgb(255, 215, 0))
            .add_modifier(Modifier::BOLD),
    );

    let help = Span::styled(" [Q] Quit ", Style::default().fg(Color::Rgb(128, 128, 128)));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(Color::Rgb(138, 43, 226)))
        .style(Style::default().bg(Color::Rgb(18, 18, 28)));

    let paragraph = Paragraph::new(Line::from(vec![status, time, title, help]))
        .block(block)
        .alignment(Alignment::Center);

    f.render_widget(paragraph, area);
}

fn render_matrix(f: &mut Frame, area: Rect, state: &AppState) {
    let labels = state.labels();
    let label_width = labels.iter().map(String::len).max().unwrap_or(0).max(8) as u16;

    let header = Row::new(
        std::iter::once(Cell::from(""))
            .chain(labels.iter().map(|label| Cell::from(label.as_str())))
            .collect::<Vec<_>>(),
    )
    .style(
        Style::default()
            .fg(Color::Rgb(255, 215, 0))
            .add_modifier(Modifier::BOLD),
    );

    let rows = labels.iter().map(|row| {
        let cells = std::iter::once(Cell::from(row.as_str()).style(
            Style::default()
                .fg(Color::Rgb(255, 215, 0))
                .add_modifier(Modifier::BOLD),
        ))
        .chain(labels.iter().map(|col| {
            match state.matrix.get(row).and_then(|cols| cols.get(col)) {
                Some(value) => Cell::from(format!("{value:>7.4}"))
                    .style(Style::default().fg(Color::Black).bg(heat_color(*value))),
                None => Cell::from("    --").style(Style::default().fg(Color::DarkGray)),
            }
        }))
        .collect::<Vec<_>>();
        Row::new(cells)
    });

    let widths = std::iter::once(Constraint::Length(label_width))
        .chain(labels.iter().map(|_| Constraint::Length(label_width.max(8))))
        .collect::<Vec<_>>();

    let table = Table::new(rows, widths).header(header).column_spacing(1).block(
        Block::default()
            .title(format!(" Rolling Pearson ({} symbols) ", labels.len()))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Rgb(100, 149, 237))),
    );

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, area: Rect, state: &AppState) {
    let mut spans = vec![Span::styled(
        format!(" updates: {} ", state.updates),
        Style::default().fg(Color::Rgb(200, 200, 200)),
    )];

    if let Some(message) = &state.server_message {
        spans.push(Span::styled(
            format!(" {message} "),
            Style::default().fg(Color::Rgb(128, 128, 128)),
        ));
    }
    if let Some(error) = &state.last_error {
        spans.push(Span::styled(
            format!(" ✗ {error} "),
            Style::default().fg(Color::Rgb(255, 69, 58)),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Rgb(128, 128, 128))),
    );

    f.render_widget(paragraph, area);
}

/// Map a coefficient in [-1, 1] to a cell background: green for positive, red for negative,
/// brighter the stronger the correlation.
fn heat_color(value: f64) -> Color {
    let strength = value.abs().clamp(0.0, 1.0);
    let intensity = (55.0 + strength * 200.0).round() as u8;
    if value >= 0.0 {
        Color::Rgb(0, intensity, 0)
    } else {
        Color::Rgb(intensity, 0, 0)
    }
}
