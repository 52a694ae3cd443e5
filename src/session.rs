use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{NbackError, Result};

/// Largest alphabet the audio channel can render as single letters (A..Z)
pub const MAX_AUDIO_ALPHABET: usize = 26;

/// Largest grid side the terminal can still draw as bordered cells
pub const MAX_GRID_SIZE: usize = 8;

/// Which stimulus channels a round presents
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Visual,
    Audio,
    AudioVisual,
}

impl Modality {
    pub fn has_visual(self) -> bool {
        matches!(self, Modality::Visual | Modality::AudioVisual)
    }

    pub fn has_audio(self) -> bool {
        matches!(self, Modality::Audio | Modality::AudioVisual)
    }

    pub fn channels(self) -> &'static [Channel] {
        match self {
            Modality::Visual => &[Channel::Visual],
            Modality::Audio => &[Channel::Audio],
            Modality::AudioVisual => &[Channel::Audio, Channel::Visual],
        }
    }

    pub fn includes(self, channel: Channel) -> bool {
        match channel {
            Channel::Visual => self.has_visual(),
            Channel::Audio => self.has_audio(),
        }
    }
}

/// A single stimulus stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Visual,
    Audio,
}

/// Persisted tunables; the next round is built from these
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub n_back: usize,
    pub event_interval_ms: u64,
    pub total_events: usize,
    pub grid_size: usize,
    pub audio_alphabet_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            n_back: 1,
            event_interval_ms: 2000,
            total_events: 10,
            grid_size: 3,
            audio_alphabet_size: 3,
        }
    }
}

/// Immutable configuration of one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub modality: Modality,
    pub settings: Settings,
}

impl SessionConfig {
    pub fn new(modality: Modality, settings: Settings) -> Self {
        Self { modality, settings }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if s.n_back < 1 {
            return Err(NbackError::invalid("n_back must be at least 1"));
        }
        if s.total_events <= s.n_back {
            return Err(NbackError::invalid(format!(
                "total_events ({}) must exceed n_back ({})",
                s.total_events, s.n_back
            )));
        }
        if s.event_interval_ms == 0 {
            return Err(NbackError::invalid("event_interval_ms must be positive"));
        }
        if !(2..=MAX_GRID_SIZE).contains(&s.grid_size) {
            return Err(NbackError::invalid(format!(
                "grid_size ({}) must be between 2 and {MAX_GRID_SIZE}",
                s.grid_size
            )));
        }
        if !(3..=MAX_AUDIO_ALPHABET).contains(&s.audio_alphabet_size) {
            return Err(NbackError::invalid(format!(
                "audio_alphabet_size ({}) must be between 3 and {MAX_AUDIO_ALPHABET}",
                s.audio_alphabet_size
            )));
        }
        Ok(())
    }

    /// Number of distinct stimuli on `channel`; saturates for grids that
    /// `validate()` rejects
    pub fn space_size(&self, channel: Channel) -> usize {
        match channel {
            Channel::Visual => self
                .settings
                .grid_size
                .checked_mul(self.settings.grid_size)
                .unwrap_or(usize::MAX),
            Channel::Audio => self.settings.audio_alphabet_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchOutcome {
    Match,
    NoMatch,
    #[default]
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    #[default]
    Idle,
    Running,
}

/// Observable state of the current round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    pub modality: Modality,
    pub phase: RoundPhase,
    /// Round identifier; bumped by every `start()`
    pub epoch: u64,
    /// Number of stimuli emitted so far
    pub current_event_index: usize,
    pub current_visual_value: Option<u32>,
    pub current_audio_value: Option<u32>,
    pub current_audio_label: Option<String>,
    pub match_outcome: MatchOutcome,
    pub match_claimed_this_event: bool,
    pub score: u32,
    pub config: SessionConfig,
}

impl RoundState {
    pub fn new(config: SessionConfig, epoch: u64) -> Self {
        Self {
            modality: config.modality,
            phase: RoundPhase::Idle,
            epoch,
            current_event_index: 0,
            current_visual_value: None,
            current_audio_value: None,
            current_audio_label: None,
            match_outcome: MatchOutcome::Undetermined,
            match_claimed_this_event: false,
            score: 0,
            config,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == RoundPhase::Running
    }

    /// Zero-based position of the stimulus on screen, if any
    pub fn current_position(&self) -> Option<usize> {
        self.current_event_index.checked_sub(1)
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new(SessionConfig::default(), 0)
    }
}

/// Result of a completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub modality: Modality,
    pub n_back: usize,
    pub total_events: usize,
    pub score: u32,
    pub possible_matches: u32,
    pub new_high_score: bool,
    pub finished_at: DateTime<Local>,
}

/// Letter shown/spoken for an audio stimulus: 1 -> "A", 2 -> "B", ...
pub fn letter_for(stimulus: u32) -> Option<String> {
    let offset = stimulus.checked_sub(1)?;
    if offset as usize >= MAX_AUDIO_ALPHABET {
        return None;
    }
    char::from_u32('A' as u32 + offset).map(|c| c.to_string())
}
