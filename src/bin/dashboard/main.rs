mod app;

use std::io;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use app::{format_age, format_pct, format_price, truncate, AppState, ConnectionStatus, Pane, StockResponse};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut tables = Selection::default();
    let result = run_loop(&mut terminal, &mut app, &client, &mut tables).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Row selection for both tables.
#[derive(Default)]
struct Selection {
    survivors: TableState,
    rejected: TableState,
}

impl Selection {
    fn focused(&mut self, pane: Pane) -> &mut TableState {
        match pane {
            Pane::Survivors => &mut self.survivors,
            Pane::Rejected => &mut self.rejected,
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    tables: &mut Selection,
) -> io::Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| render(f, app, tables))?;

        let timeout = REFRESH_INTERVAL
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = Instant::now();
                        }
                        KeyCode::Tab => app.focus = app.focus.toggle(),
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.focused_len().saturating_sub(1);
                            let state = tables.focused(app.focus);
                            let next = state.selected().map_or(0, |i| (i + 1).min(max));
                            state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let state = tables.focused(app.focus);
                            let prev = state.selected().map_or(0, |i| i.saturating_sub(1));
                            state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= REFRESH_INTERVAL {
            app.refresh(client).await;
            last_tick = Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, tables: &mut Selection) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),      // header
            Constraint::Percentage(60), // survivors
            Constraint::Min(0),         // rejected
            Constraint::Length(1),      // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_survivors(f, app, &mut tables.survivors, chunks[1]);
    render_rejected(f, app, &mut tables.rejected, chunks[2]);
    render_footer(f, chunks[3]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let scan_text = if app.health.scan_in_progress {
        let done = app.health.analyzed + app.health.cached + app.health.skipped;
        format!("scanning {done}/{}", app.health.universe_size)
    } else {
        app.summary
            .last_scan_finished_at_ms
            .map_or("no scan yet".to_string(), |t| format!("last scan {}", format_age(t, now_ms())))
    };

    let line = Line::from(vec![
        Span::styled(" Equity Screener  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(format!("{} scanned", app.summary.total), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(format!("{} rejected", app.summary.rejected), Style::default().fg(Color::Red)),
        Span::raw("  │  "),
        Span::styled(format!("{} survivors", app.summary.survivors), Style::default().fg(Color::Green)),
        Span::raw("  │  "),
        Span::styled(scan_text, Style::default().fg(Color::DarkGray)),
    ]);

    let paragraph = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_survivors(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header = header_row(&["Ticker", "Company", "Price", "Value", "ROIC", "Yield", "Safety", "Quality", "Cash"]);

    let rows: Vec<Row> = app
        .survivors
        .iter()
        .map(|s| {
            let (cash_text, cash_color) = if s.cash_quality == "SUSPICIOUS" {
                ("⚠ check", Color::Red)
            } else {
                ("✓", Color::Green)
            };
            Row::new(vec![
                Cell::from(s.ticker.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
                Cell::from(truncate(&s.company_name, 24)),
                Cell::from(format_price(s.price)),
                Cell::from(s.valuation.clone()).style(Style::default().fg(valuation_color(&s.valuation))),
                Cell::from(format_pct(s.roic)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_pct(s.fcf_yield)),
                Cell::from(format!("{}/100", s.safety_score)),
                Cell::from(format!("{}/100", s.cash_engine_score)),
                Cell::from(cash_text).style(Style::default().fg(cash_color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(7),
            Constraint::Min(12),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(pane_block(" SURVIVORS ", app.focus == Pane::Survivors))
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_rejected(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header = header_row(&["Ticker", "Company", "Reasons"]);

    let rows: Vec<Row> = app
        .rejected
        .iter()
        .map(|s: &StockResponse| {
            Row::new(vec![
                Cell::from(s.ticker.clone()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&s.company_name, 24)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(s.reasons.join(" · ")).style(Style::default().fg(Color::Red)),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(7), Constraint::Length(25), Constraint::Min(10)])
        .header(header)
        .block(pane_block(" REJECTED ", app.focus == Pane::Rejected))
        .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[tab] ", Style::default().fg(Color::Yellow)),
        Span::raw("switch table  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll  "),
        Span::styled("auto-refresh: 5s", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn header_row(labels: &[&'static str]) -> Row<'static> {
    let cells = labels
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    Row::new(cells).height(1)
}

fn pane_block(title: &'static str, focused: bool) -> Block<'static> {
    let border = if focused { Color::Cyan } else { Color::DarkGray };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)))
}

fn valuation_color(bucket: &str) -> Color {
    match bucket {
        "BARGAIN" => Color::Green,
        "FAIR" => Color::Yellow,
        _ => Color::Red,
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
