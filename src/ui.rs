use std::{
    collections::HashMap,
    io::stdout,
};

use color_eyre::eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::client::{AppSnapshot, Phase};
use crate::types::{DiceRoll, TurnOption, TurnRecord};

const MAX_HP: f64 = 100.0;
const MAX_MP: f64 = 50.0;
const DEFAULT_STAT: i64 = 10;

pub enum UserEvent {
    Quit,
    NextItem,
    PrevItem,
    StartSession,
    SubmitAction,
    ConfirmAction(String),
    ChooseOption,
    ShowHistory,
    CloseHistory,
    Retry,
    Redraw,
}

#[derive(Debug)]
pub struct UiState {
    mode: Mode,
    phase: Phase,
    action_draft: String,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            phase: Phase::Uninitialized,
            action_draft: String::new(),
            terminal: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    ActionEditor(EditorState),
    History,
    QuitModal,
}

#[derive(Clone, Debug, Default)]
struct EditorState {
    buffer: String,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    // cache the pieces key handling needs between draws
    state.phase = snap.phase.clone();
    state.action_draft = snap.action_draft.clone();
    // the history modal tracks the loaded view: it opens only once a load
    // succeeded and closes when the view is cleared
    match state.mode {
        Mode::Normal if snap.history_view.is_some() => state.mode = Mode::History,
        Mode::History if snap.history_view.is_none() => state.mode = Mode::Normal,
        _ => {}
    }
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub async fn next_event(state: &mut UiState) -> Result<UserEvent> {
    loop {
        if let Event::Key(k) = event::read()? {
            if k.kind != KeyEventKind::Press {
                continue;
            }
            // Modal handling
            match &mut state.mode {
                Mode::ActionEditor(ed) => match k.code {
                    KeyCode::Esc => {
                        state.mode = Mode::Normal;
                        return Ok(UserEvent::Redraw);
                    }
                    KeyCode::Enter => {
                        let draft = ed.buffer.clone();
                        state.mode = Mode::Normal;
                        if draft.trim().is_empty() {
                            return Ok(UserEvent::Redraw);
                        }
                        return Ok(UserEvent::ConfirmAction(draft));
                    }
                    KeyCode::Backspace => {
                        ed.buffer.pop();
                        return Ok(UserEvent::Redraw);
                    }
                    KeyCode::Char(c) => {
                        ed.buffer.push(c);
                        return Ok(UserEvent::Redraw);
                    }
                    _ => {}
                },
                Mode::History => match k.code {
                    KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('q') => {
                        state.mode = Mode::Normal;
                        return Ok(UserEvent::CloseHistory);
                    }
                    _ => {}
                },
                Mode::QuitModal => match k.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(UserEvent::Quit),
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        state.mode = Mode::Normal;
                        return Ok(UserEvent::Redraw);
                    }
                    _ => {}
                },
                Mode::Normal => {}
            }
            if !matches!(state.mode, Mode::Normal) {
                continue;
            }
            match k.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    state.mode = Mode::QuitModal;
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Up | KeyCode::Char('k') => return Ok(UserEvent::PrevItem),
                KeyCode::Down | KeyCode::Char('j') => return Ok(UserEvent::NextItem),
                _ => {}
            }
            // Remaining keys depend on the current phase
            match state.phase {
                Phase::ScenarioSelect => match k.code {
                    KeyCode::Enter => return Ok(UserEvent::StartSession),
                    _ => continue,
                },
                Phase::AwaitingAction => match k.code {
                    KeyCode::Enter => return Ok(UserEvent::SubmitAction),
                    KeyCode::Char('e') => {
                        state.mode = Mode::ActionEditor(EditorState {
                            buffer: state.action_draft.clone(),
                        });
                        return Ok(UserEvent::Redraw);
                    }
                    KeyCode::Char('h') => return Ok(UserEvent::ShowHistory),
                    _ => continue,
                },
                Phase::AwaitingChoice => match k.code {
                    KeyCode::Enter => return Ok(UserEvent::ChooseOption),
                    KeyCode::Char('h') => return Ok(UserEvent::ShowHistory),
                    _ => continue,
                },
                Phase::Failed => match k.code {
                    KeyCode::Char('r') => return Ok(UserEvent::Retry),
                    _ => continue,
                },
                _ => continue,
            }
        }
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // status
            Constraint::Min(12),   // narration + lists + player panel
            Constraint::Length(6), // errors + help
        ])
        .split(f.area());

    draw_status(f, chunks[0], snap);
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(main[0]);
    draw_narration(f, left[0], snap);
    match snap.phase {
        Phase::Uninitialized | Phase::Initializing | Phase::ScenarioSelect => {
            draw_scenarios(f, left[1], snap)
        }
        _ => draw_turn_panel(f, left[1], snap),
    }
    draw_player(f, main[1], snap);
    draw_bottom(f, chunks[2], snap);
    draw_modals(f, state, snap);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let spinner = if snap.loading { " [working...]" } else { "" };
    let p = Paragraph::new(format!("{}{}", snap.status, spinner))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

fn draw_narration(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let turn = snap.session.as_ref().map(|s| s.turn).unwrap_or(0);
    let mut lines: Vec<Line> = Vec::new();
    match narration_text(snap) {
        Some(text) => lines.push(Line::from(text)),
        None => lines.push(Line::styled(
            "The story has not begun yet.",
            Style::default().fg(Color::DarkGray),
        )),
    }
    if let Some(option) = &snap.chosen_option {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!("You chose: {}", option.description),
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Some(roll) = &snap.last_roll {
        lines.push(Line::from(format_roll(roll)));
    }
    let board = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Narration | Turn {}", turn)),
    );
    f.render_widget(board, area);
}

// Most recent narration: the pending turn wins over history
fn narration_text(snap: &AppSnapshot) -> Option<String> {
    if let Some(turn) = &snap.pending_turn {
        return Some(turn.narration.clone());
    }
    snap.session
        .as_ref()?
        .history
        .iter()
        .rev()
        .find_map(|entry| entry.ai_narration.clone())
}

fn format_roll(roll: &DiceRoll) -> String {
    match &roll.player_id {
        Some(player) => format!("Dice: {} rolled {} for {}", roll.die, roll.result, player),
        None => format!("Dice: {} rolled {}", roll.die, roll.result),
    }
}

fn draw_scenarios(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    if snap.scenarios.is_empty() {
        lines.push(Line::styled(
            "No scenarios available",
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        for (i, scenario) in snap.scenarios.iter().enumerate() {
            let cursor = if i == snap.selected_scenario { ">" } else { " " };
            let text = format!(
                "{} {} ({:?}, up to {} players)",
                cursor, scenario.name, scenario.mode, scenario.max_players
            );
            if i == snap.selected_scenario {
                lines.push(Line::styled(
                    text,
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ));
            } else {
                lines.push(Line::from(text));
            }
        }
        if let Some(scenario) = snap.scenarios.get(snap.selected_scenario) {
            lines.push(Line::from(""));
            lines.push(Line::from(scenario.description.clone()));
        }
    }
    let list = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Scenarios"));
    f.render_widget(list, area);
}

fn draw_turn_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    match &snap.pending_turn {
        Some(turn) => {
            let stats = snap.player.as_ref().map(|p| &p.stats);
            let mut lines: Vec<Line> = Vec::new();
            for (i, option) in turn.options.iter().enumerate() {
                let cursor = if i == snap.selected_option { ">" } else { " " };
                let text = format!(
                    "{} {} | {:.0}% | HP {} | MP {} | {}",
                    cursor,
                    option.description,
                    adjusted_success(option, stats) * 100.0,
                    format_signed_delta(option.health_point_change),
                    format_signed_delta(option.mana_point_change),
                    option.related_stat,
                );
                if i == snap.selected_option {
                    lines.push(Line::styled(
                        text,
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    ));
                } else {
                    lines.push(Line::from(text));
                }
            }
            let list = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
                Block::default().borders(Borders::ALL).title("Options"),
            );
            f.render_widget(list, area);
        }
        None => {
            let p = Paragraph::new(format!("Next action: {}", snap.action_draft))
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title("Your Action"));
            f.render_widget(p, area);
        }
    }
}

fn draw_player(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let block = Block::default().borders(Borders::ALL).title("Player");
    let inner = block.inner(area);
    f.render_widget(block, area);
    let Some(player) = &snap.player else {
        let p = Paragraph::new("Not in a session")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, inner);
        return;
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Min(1),
        ])
        .split(inner);
    let header = Paragraph::new(format!("{} ({})", player.display_name, player.role));
    f.render_widget(header, rows[0]);
    let hp = Gauge::default()
        .gauge_style(Style::default().fg(Color::Red))
        .ratio((player.hp / MAX_HP).clamp(0.0, 1.0))
        .label(format!("HP {:.0}/{:.0}", player.hp, MAX_HP));
    f.render_widget(hp, rows[1]);
    let mp = Gauge::default()
        .gauge_style(Style::default().fg(Color::Blue))
        .ratio((player.mp / MAX_MP).clamp(0.0, 1.0))
        .label(format!("MP {:.0}/{:.0}", player.mp, MAX_MP));
    f.render_widget(mp, rows[2]);
    let mut stat_lines: Vec<Line> = Vec::new();
    for (name, value) in &player.stats {
        stat_lines.push(Line::from(format!("{}: {}", name, value)));
    }
    f.render_widget(Paragraph::new(stat_lines), rows[3]);
}

fn draw_bottom(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3)])
        .split(area);

    let mut lines: Vec<Line> = Vec::new();
    if snap.errors.is_empty() {
        lines.push(Line::from("No errors"));
    } else {
        for e in &snap.errors {
            lines.push(Line::from(e.clone()));
        }
    }
    let color = if snap.errors.is_empty() { Color::Green } else { Color::Red };
    let errors = Paragraph::new(lines)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Errors"));
    f.render_widget(errors, chunks[0]);

    let help = Paragraph::new(help_line(&snap.phase))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn help_line(phase: &Phase) -> &'static str {
    match phase {
        Phase::ScenarioSelect => "up/down select | Enter start | q quit",
        Phase::AwaitingAction => "Enter send action | e edit | h history | q quit",
        Phase::AwaitingChoice => "up/down select | Enter choose | h history | q quit",
        Phase::Failed => "r retry | q quit",
        _ => "q quit",
    }
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::ActionEditor(ed) => {
            let area = centered_rect(60, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("Edit Action");
            let p = Paragraph::new(format!(
                "{}_\n\nEnter=send Esc=cancel",
                ed.buffer
            ))
            .wrap(Wrap { trim: false });
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::History => {
            let area = centered_rect(80, 70, f.area());
            let block = Block::default().borders(Borders::ALL).title("History");
            let mut lines: Vec<Line> = Vec::new();
            let history = snap.history_view.as_deref().unwrap_or(&[]);
            if history.is_empty() {
                lines.push(Line::from("No turns on record"));
            } else {
                for entry in history {
                    lines.push(Line::styled(
                        format_history_header(entry),
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                    if let Some(narration) = &entry.ai_narration {
                        lines.push(Line::from(format!("  {}", narration)));
                    }
                }
            }
            lines.push(Line::from(""));
            lines.push(Line::from("Esc=close"));
            let p = Paragraph::new(lines).wrap(Wrap { trim: true });
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the game? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn format_history_header(entry: &TurnRecord) -> String {
    match entry.chosen_option {
        Some(id) => format!(
            "[{}] {}: {} (chose option {})",
            entry.timestamp, entry.actor, entry.action, id
        ),
        None => format!("[{}] {}: {}", entry.timestamp, entry.actor, entry.action),
    }
}

/// Success chance adjusted by the player's related stat, where 10 is the
/// baseline and missing stats count as the baseline.
fn adjusted_success(option: &TurnOption, stats: Option<&HashMap<String, i64>>) -> f64 {
    let stat = stats
        .and_then(|s| s.get(&option.related_stat))
        .copied()
        .unwrap_or(DEFAULT_STAT);
    option.success_rate * (stat as f64 / 10.0)
}

// Wire deltas are -1..1 fractions; shown as signed whole points.
fn format_signed_delta(delta: f64) -> String {
    format!("{:+.0}", delta * 100.0)
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option_with(rate: f64, stat: &str) -> TurnOption {
        TurnOption {
            id: 1,
            description: String::from("test"),
            success_rate: rate,
            health_point_change: -0.2,
            mana_point_change: 0.1,
            related_stat: String::from(stat),
        }
    }

    #[test]
    fn adjusted_success__scales_by_the_related_stat() {
        // given
        let option = option_with(0.5, "force");
        let stats = HashMap::from([(String::from("force"), 18)]);

        // when
        let adjusted = adjusted_success(&option, Some(&stats));

        // then
        assert!((adjusted - 0.9).abs() < 1e-9);
    }

    #[test]
    fn adjusted_success__uses_baseline_when_stat_is_missing() {
        let option = option_with(0.5, "charisma");
        let stats = HashMap::from([(String::from("force"), 18)]);

        let adjusted = adjusted_success(&option, Some(&stats));

        assert!((adjusted - 0.5).abs() < 1e-9);
    }

    #[test]
    fn adjusted_success__uses_baseline_without_a_player() {
        let option = option_with(0.7, "force");

        assert!((adjusted_success(&option, None) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn format_signed_delta__scales_and_signs_wire_fractions() {
        assert_eq!(format_signed_delta(-0.2), "-20");
        assert_eq!(format_signed_delta(0.1), "+10");
        assert_eq!(format_signed_delta(0.0), "+0");
    }

    fn empty_snapshot() -> AppSnapshot {
        AppSnapshot {
            phase: Phase::AwaitingAction,
            scenarios: Vec::new(),
            selected_scenario: 0,
            session: None,
            player: None,
            pending_turn: None,
            selected_option: 0,
            chosen_option: None,
            last_roll: None,
            action_draft: String::new(),
            history_view: None,
            status: String::new(),
            errors: Vec::new(),
            loading: false,
        }
    }

    #[test]
    fn draw__opens_the_history_modal_once_a_view_is_loaded() {
        // given
        let mut state = UiState::default();
        let mut snap = empty_snapshot();
        snap.history_view = Some(Vec::new());

        // when
        draw(&mut state, &snap).unwrap();

        // then
        assert!(matches!(state.mode, Mode::History));
    }

    #[test]
    fn draw__keeps_the_modal_closed_while_no_view_exists() {
        // a failed load leaves history_view empty, so retry keys stay live
        let mut state = UiState::default();
        let snap = empty_snapshot();

        draw(&mut state, &snap).unwrap();

        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn draw__closes_the_history_modal_when_the_view_clears() {
        // given
        let mut state = UiState::default();
        state.mode = Mode::History;
        let snap = empty_snapshot();

        // when
        draw(&mut state, &snap).unwrap();

        // then
        assert!(matches!(state.mode, Mode::Normal));
    }
}
