use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

use crate::session::{
    MatchOutcome, Modality, RoundState, RoundSummary, SessionConfig, MAX_GRID_SIZE,
};

const HORIZONTAL_MARGIN: u16 = 2;

/// Everything the screen shows, snapshotted from the controller each frame
#[derive(Debug, Clone, Default)]
pub struct App {
    pub round: RoundState,
    pub next: SessionConfig,
    pub high_score: u32,
    pub last_summary: Option<RoundSummary>,
    pub best_at_level: Option<u32>,
    pub status: Option<String>,
}

impl App {
    // A round that has shown stimuli stays on screen until the next one starts.
    fn shows_round(&self) -> bool {
        self.round.is_running() || self.round.current_event_index > 0
    }

    /// Modality on screen: the current round's, else the one selected next
    fn shown_modality(&self) -> Modality {
        if self.shows_round() {
            self.round.modality
        } else {
            self.next.modality
        }
    }

    fn header(&self) -> Line<'static> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let settings = if self.round.is_running() {
            self.round.config.settings
        } else {
            self.next.settings
        };
        let mut spans = vec![
            Span::styled(format!("{}-back", settings.n_back), bold.fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled(self.shown_modality().to_string(), bold),
            Span::raw(format!("  score {}", self.round.score)),
            Span::raw(format!("  high {}", self.high_score)),
        ];
        if let Some(best) = self.best_at_level {
            spans.push(Span::styled(
                format!("  best here {best}"),
                Style::default().add_modifier(Modifier::DIM),
            ));
        }
        if self.round.is_running() {
            spans.push(Span::raw(format!(
                "  event {}/{}",
                self.round.current_event_index, settings.total_events
            )));
        }
        Line::from(spans)
    }

    fn feedback(&self) -> Line<'static> {
        if let Some(status) = &self.status {
            return Line::from(Span::styled(status.clone(), Style::default().fg(Color::Red)));
        }
        if self.round.is_running() {
            return match self.round.match_outcome {
                MatchOutcome::Match => Line::from(Span::styled(
                    "match!",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )),
                MatchOutcome::NoMatch => Line::from(Span::styled(
                    "no match",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                MatchOutcome::Undetermined => Line::from(""),
            };
        }
        match &self.last_summary {
            Some(summary) => {
                let mut text = format!(
                    "round over: {} of {} matches found",
                    summary.score, summary.possible_matches
                );
                if summary.new_high_score {
                    text.push_str("  new high score!");
                }
                Line::from(Span::styled(text, Style::default().fg(Color::Yellow)))
            }
            None => Line::from(Span::styled(
                "press enter to start",
                Style::default().add_modifier(Modifier::ITALIC),
            )),
        }
    }

    fn render_grid(&self, area: Rect, buf: &mut Buffer) {
        let side = if self.shows_round() {
            self.round.config.settings.grid_size
        } else {
            self.next.settings.grid_size
        }
        .clamp(1, MAX_GRID_SIZE);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Ratio(1, side as u32); side])
            .split(area);

        for (r, row_area) in rows.iter().enumerate() {
            let cells = Layout::default()
                .direction(Direction::Horizontal)
                .constraints(vec![Constraint::Ratio(1, side as u32); side])
                .split(*row_area);
            for (c, cell_area) in cells.iter().enumerate() {
                let value = (r * side + c + 1) as u32;
                let lit = self.round.current_visual_value == Some(value);
                let style = if lit {
                    Style::default().bg(Color::Cyan)
                } else {
                    Style::default()
                };
                Block::default()
                    .borders(Borders::ALL)
                    .style(style)
                    .render(*cell_area, buf);
            }
        }
    }

    fn render_letter(&self, area: Rect, buf: &mut Buffer) {
        let letter = self.round.current_audio_label.clone().unwrap_or_default();
        let top_pad = area.height.saturating_sub(3) / 2;
        let mut lines = vec![Line::from(""); top_pad as usize];
        lines.push(Line::from(Span::styled(
            letter,
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        )));
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("letter"))
            .render(area, buf);
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(2),
            ])
            .split(area);

        Paragraph::new(self.header()).render(chunks[0], buf);

        let modality = self.shown_modality();
        let body = match modality {
            Modality::AudioVisual => Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
                .split(chunks[1])
                .to_vec(),
            _ => vec![chunks[1]],
        };
        match modality {
            Modality::Visual => self.render_grid(body[0], buf),
            Modality::Audio => self.render_letter(body[0], buf),
            Modality::AudioVisual => {
                self.render_grid(body[0], buf);
                self.render_letter(body[1], buf);
            }
        }

        Paragraph::new(self.feedback())
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        let help = "enter start  1 visual  2 audio  3 both  f/← position match  j/→ letter match  q quit";
        Paragraph::new(Span::styled(help, Style::default().add_modifier(Modifier::DIM)))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[3], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RoundPhase, Settings};

    fn rendered(app: &App) -> String {
        let area = Rect::new(0, 0, 90, 24);
        let mut buf = Buffer::empty(area);
        app.render(area, &mut buf);
        buf.content.iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn idle_screen_prompts_to_start() {
        let app = App::default();
        let text = rendered(&app);
        assert!(text.contains("press enter to start"));
        assert!(text.contains("1-back"));
    }

    #[test]
    fn running_audio_round_shows_letter_and_feedback() {
        let config = SessionConfig::new(Modality::Audio, Settings::default());
        let mut round = RoundState::new(config, 1);
        round.phase = RoundPhase::Running;
        round.current_event_index = 3;
        round.current_audio_value = Some(2);
        round.current_audio_label = Some("B".into());
        round.match_outcome = MatchOutcome::Match;
        round.score = 1;
        let app = App {
            round,
            ..App::default()
        };

        let text = rendered(&app);
        assert!(text.contains("match!"));
        assert!(text.contains("event 3/10"));
        assert!(text.contains("score 1"));
        assert!(text.contains('B'));
    }

    #[test]
    fn lit_cell_is_highlighted() {
        let config = SessionConfig::new(Modality::Visual, Settings::default());
        let mut round = RoundState::new(config, 1);
        round.phase = RoundPhase::Running;
        round.current_event_index = 1;
        round.current_visual_value = Some(5);
        let app = App {
            round,
            ..App::default()
        };

        let area = Rect::new(0, 0, 90, 24);
        let mut buf = Buffer::empty(area);
        (&app).render(area, &mut buf);
        assert!(buf.content.iter().any(|cell| cell.bg == Color::Cyan));
    }
}
