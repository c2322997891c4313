//! The interactive terminal dashboard (`SPEC_FULL.md` §3.8, spec.md
//! §6): a simulation list, a per-simulation register snapshot table,
//! and an add-simulation prompt, polling `Supervisor::snapshot` on a
//! fixed redraw interval. Holds no state the core depends on — closing
//! the dashboard never stops a simulation.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use modsim::{Defaults, RegisterConfig, RegisterSnapshot, SimulationConfig, SimulationInfo, Supervisor};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use ratatui::Frame;

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

/// Runs the dashboard until the user quits (`q`/`Esc`). Returns once
/// the terminal is restored to its original mode. `register_template`
/// is the register list new simulations started from the dashboard are
/// built with (spec.md §4.7: `add`'s schema "is shared from the parsed
/// configuration") — `None` if no simulation was configured at startup
/// to draw a template from, in which case the add prompt reports an
/// error instead of constructing a schema out of nothing.
pub async fn run(supervisor: Arc<Supervisor>, register_template: Option<Vec<RegisterConfig>>) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &supervisor, register_template).await;
    ratatui::restore();
    result
}

/// Which field of the add-simulation prompt currently receives
/// keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddField {
    Ip,
    Port,
    SlaveId,
}

impl AddField {
    fn next(self) -> Self {
        match self {
            AddField::Ip => AddField::Port,
            AddField::Port => AddField::SlaveId,
            AddField::SlaveId => AddField::Ip,
        }
    }

    fn prev(self) -> Self {
        match self {
            AddField::Ip => AddField::SlaveId,
            AddField::Port => AddField::Ip,
            AddField::SlaveId => AddField::Port,
        }
    }
}

/// Mutable state of the add-simulation prompt (spec.md §4.7 `add`,
/// spec.md §6 "the supervisor exposes ... `add`").
struct AddForm {
    field: AddField,
    ip: String,
    port: String,
    slave_id: String,
    error: Option<String>,
}

impl AddForm {
    fn new() -> Self {
        Self {
            field: AddField::Ip,
            ip: "127.0.0.1".to_string(),
            port: String::new(),
            slave_id: "1".to_string(),
            error: None,
        }
    }

    fn buffer_mut(&mut self) -> &mut String {
        match self.field {
            AddField::Ip => &mut self.ip,
            AddField::Port => &mut self.port,
            AddField::SlaveId => &mut self.slave_id,
        }
    }

    fn push(&mut self, c: char) {
        let accepted = match self.field {
            AddField::Ip => c.is_ascii_digit() || c == '.',
            AddField::Port | AddField::SlaveId => c.is_ascii_digit(),
        };
        if accepted {
            self.buffer_mut().push(c);
        }
    }

    fn backspace(&mut self) {
        self.buffer_mut().pop();
    }

    /// Parse the form's fields into a simulation's `defaults` (spec.md
    /// §6), or a field-specific error message to show back in the form.
    fn parse_defaults(&self) -> Result<Defaults, String> {
        let ip = Ipv4Addr::from_str(&self.ip).map_err(|_| format!("invalid IPv4 address {:?}", self.ip))?;
        let port = u16::from_str(&self.port).map_err(|_| format!("invalid port {:?}", self.port))?;
        let slave_id = u8::from_str(&self.slave_id)
            .map_err(|_| format!("invalid slave id {:?}", self.slave_id))?;
        Ok(Defaults { ip, port, slave_id })
    }
}

enum Mode {
    List,
    Add(AddForm),
}

async fn event_loop(
    terminal: &mut ratatui::DefaultTerminal,
    supervisor: &Supervisor,
    register_template: Option<Vec<RegisterConfig>>,
) -> Result<()> {
    let mut selected = 0usize;
    let mut mode = Mode::List;
    let mut status: Option<String> = None;

    loop {
        let simulations = supervisor.list().await;
        if !simulations.is_empty() {
            selected = selected.min(simulations.len() - 1);
        }
        let snapshot = match simulations.get(selected) {
            Some(info) => supervisor.snapshot(info.id).await.unwrap_or_default(),
            None => Vec::new(),
        };

        terminal.draw(|frame| draw(frame, &simulations, selected, &snapshot, &mode, status.as_deref()))?;

        if event::poll(REDRAW_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                // `next_mode` defers the List/Add transition until after the
                // match below returns, so it never reassigns `mode` while
                // the match's `&mut mode` borrow (held by the `Mode::Add`
                // arm's `form` binding) is still live.
                let mut next_mode = None;
                match &mut mode {
                    Mode::List => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Down | KeyCode::Char('j') => selected = selected.saturating_add(1),
                        KeyCode::Up | KeyCode::Char('k') => selected = selected.saturating_sub(1),
                        KeyCode::Char('a') => {
                            status = None;
                            if register_template.is_some() {
                                next_mode = Some(Mode::Add(AddForm::new()));
                            } else {
                                status = Some(
                                    "no register template available: configure at least one simulation at startup"
                                        .to_string(),
                                );
                            }
                        }
                        _ => {}
                    },
                    Mode::Add(form) => match key.code {
                        KeyCode::Esc => next_mode = Some(Mode::List),
                        KeyCode::Tab | KeyCode::Down => form.field = form.field.next(),
                        KeyCode::BackTab | KeyCode::Up => form.field = form.field.prev(),
                        KeyCode::Backspace => form.backspace(),
                        KeyCode::Char(c) => form.push(c),
                        KeyCode::Enter => match form.parse_defaults() {
                            Err(message) => form.error = Some(message),
                            Ok(defaults) => {
                                // `register_template` is only `None` when no
                                // simulation was configured at startup, in
                                // which case the prompt never opens (see
                                // above) — this clone always succeeds here.
                                let registers = register_template.clone().unwrap_or_default();
                                let config = SimulationConfig { defaults, registers };
                                match supervisor.add(&config).await {
                                    Ok(id) => {
                                        status = Some(format!(
                                            "started simulation {id} on {}:{} (slave {})",
                                            config.defaults.ip, config.defaults.port, config.defaults.slave_id
                                        ));
                                        next_mode = Some(Mode::List);
                                    }
                                    Err(err) => form.error = Some(err.to_string()),
                                }
                            }
                        },
                        _ => {}
                    },
                }
                if let Some(mode_transition) = next_mode {
                    mode = mode_transition;
                }
            }
        }
    }
}

fn draw(
    frame: &mut Frame,
    simulations: &[SimulationInfo],
    selected: usize,
    snapshot: &[RegisterSnapshot],
    mode: &Mode,
    status: Option<&str>,
) {
    let area = frame.area();
    let list_height = (simulations.len() as u16).max(1) + 2;
    let footer_height = 1;
    let [list_area, table_area, footer_area] = Layout::vertical([
        Constraint::Length(list_height),
        Constraint::Min(0),
        Constraint::Length(footer_height),
    ])
    .areas(area);

    let rows: Vec<Row> = simulations
        .iter()
        .enumerate()
        .map(|(i, info)| {
            let marker = if i == selected { "> " } else { "  " };
            Row::new(vec![format!(
                "{marker}sim {} — {}:{} (slave {})",
                info.id, info.ip, info.port, info.slave_id
            )])
        })
        .collect();
    let list = Table::new(rows, [Constraint::Percentage(100)])
        .block(Block::default().borders(Borders::ALL).title("Simulations"));
    frame.render_widget(list, list_area);

    let register_rows: Vec<Row> = snapshot
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(r.name.clone()),
                Cell::from(format!("{:05}", 40001 + r.address as u32)),
                Cell::from(format!("{:.3}", r.scaled)),
                Cell::from(format!("{:?}", r.raw_words)),
                Cell::from(if r.writable { "rw" } else { "ro" }),
                Cell::from(r.description.clone()),
            ])
        })
        .collect();
    let table = Table::new(
        register_rows,
        [
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(4),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["name", "addr", "scaled", "raw", "mode", "description"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Registers"));
    frame.render_widget(table, table_area);

    let footer_text = match status {
        Some(message) => message.to_string(),
        None => "q quit · ↑/↓ select · a add simulation".to_string(),
    };
    frame.render_widget(Paragraph::new(footer_text), footer_area);

    if let Mode::Add(form) = mode {
        draw_add_prompt(frame, area, form);
    }
}

/// A small centered popup collecting `ip`/`port`/`slave_id` for
/// `Supervisor::add` (spec.md §4.7, §6).
fn draw_add_prompt(frame: &mut Frame, area: Rect, form: &AddForm) {
    let popup = centered_rect(44, 9, area);
    frame.render_widget(Clear, popup);

    let field_row = |label: &str, value: &str, active: bool| {
        let marker = if active { "> " } else { "  " };
        Row::new(vec![format!("{marker}{label}"), value.to_string()])
    };
    let mut rows = vec![
        field_row("ip", &form.ip, form.field == AddField::Ip),
        field_row("port", &form.port, form.field == AddField::Port),
        field_row("slave id", &form.slave_id, form.field == AddField::SlaveId),
    ];
    if let Some(error) = &form.error {
        rows.push(Row::new(vec![String::new(), error.clone()]));
    }
    let table = Table::new(rows, [Constraint::Length(12), Constraint::Min(10)]).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Add simulation — Tab next field, Enter confirm, Esc cancel"),
    );
    frame.render_widget(table, popup);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
