use chrono::Local;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Preferences, PreferencesStore};
use crate::error::{NbackError, Result};
use crate::sequence::{count_matches, GeneratedSequences, Sequence, SequenceSource};
use crate::session::{
    letter_for, Channel, MatchOutcome, Modality, RoundPhase, RoundState, RoundSummary,
    SessionConfig, Settings,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sequences and state of the round currently owned by the controller
#[derive(Debug, Default)]
struct Round {
    state: RoundState,
    visual: Sequence,
    audio: Sequence,
}

impl Round {
    fn history(&self, channel: Channel) -> &[u32] {
        match channel {
            Channel::Visual => &self.visual,
            Channel::Audio => &self.audio,
        }
    }
}

/// State reachable from the controller, the round loop and the preference watcher
struct Shared {
    round: Mutex<Round>,
    next: Mutex<SessionConfig>,
    store: Arc<dyn PreferencesStore>,
    state_tx: watch::Sender<RoundState>,
    score_tx: watch::Sender<u32>,
    high_score_tx: watch::Sender<u32>,
    summary_tx: watch::Sender<Option<RoundSummary>>,
}

impl Shared {
    // Called with the round lock held so observers see writes in lock order.
    fn publish(&self, round: &Round) {
        self.score_tx.send_if_modified(|score| {
            let changed = *score != round.state.score;
            *score = round.state.score;
            changed
        });
        self.state_tx.send_replace(round.state.clone());
    }

    /// Show stimulus `index` of round `epoch`; false once the round is superseded
    fn present(&self, epoch: u64, index: usize) -> bool {
        let mut guard = lock(&self.round);
        let round = &mut *guard;
        if round.state.epoch != epoch {
            debug!(epoch, current = round.state.epoch, index, "dropping stale stimulus");
            return false;
        }

        let visual = round.visual.get(index).copied();
        let audio = round.audio.get(index).copied();

        let state = &mut round.state;
        state.match_outcome = MatchOutcome::Undetermined;
        state.match_claimed_this_event = false;
        state.current_event_index = index + 1;
        state.current_visual_value = visual;
        state.current_audio_value = audio;
        state.current_audio_label = audio.and_then(letter_for);
        debug!(epoch, index, ?visual, ?audio, "stimulus");

        self.publish(round);
        true
    }

    fn claim(&self, channel: Channel) -> MatchOutcome {
        let mut guard = lock(&self.round);
        let round = &mut *guard;
        let history = match channel {
            Channel::Visual => &round.visual,
            Channel::Audio => &round.audio,
        };
        let state = &mut round.state;

        if !state.is_running() || !state.modality.includes(channel) || state.match_claimed_this_event
        {
            return state.match_outcome;
        }

        let n_back = state.config.settings.n_back;
        let outcome = match state.current_position() {
            Some(pos) if pos >= n_back && pos < history.len() => {
                if history[pos] == history[pos - n_back] {
                    MatchOutcome::Match
                } else {
                    MatchOutcome::NoMatch
                }
            }
            _ => MatchOutcome::Undetermined,
        };

        state.match_outcome = outcome;
        if outcome != MatchOutcome::Undetermined {
            // An early claim leaves the slot open for this stimulus.
            state.match_claimed_this_event = true;
        }
        if outcome == MatchOutcome::Match {
            state.score += 1;
        }
        debug!(%channel, ?outcome, score = state.score, "match claim");

        self.publish(round);
        outcome
    }

    fn finish(&self, epoch: u64) {
        let summary = {
            let mut guard = lock(&self.round);
            let round = &mut *guard;
            if round.state.epoch != epoch {
                debug!(epoch, current = round.state.epoch, "dropping stale round completion");
                return;
            }
            round.state.phase = RoundPhase::Idle;

            let config = round.state.config;
            let score = round.state.score;
            let new_high_score = score > *self.high_score_tx.borrow();
            if new_high_score {
                self.high_score_tx.send_replace(score);
            }
            let possible_matches = config
                .modality
                .channels()
                .iter()
                .map(|channel| count_matches(round.history(*channel), config.settings.n_back))
                .sum::<usize>() as u32;

            let summary = RoundSummary {
                modality: config.modality,
                n_back: config.settings.n_back,
                total_events: config.settings.total_events,
                score,
                possible_matches,
                new_high_score,
                finished_at: Local::now(),
            };
            self.publish(round);
            self.summary_tx.send_replace(Some(summary.clone()));
            summary
        };

        info!(
            modality = %summary.modality,
            n_back = summary.n_back,
            score = summary.score,
            possible = summary.possible_matches,
            "round finished"
        );
        if summary.new_high_score {
            if let Err(err) = self.store.save_high_score(summary.score) {
                warn!(%err, score = summary.score, "could not persist high score");
            }
        }
    }

    fn merge_preferences(&self, prefs: Preferences) {
        lock(&self.next).settings = prefs.settings;
        self.high_score_tx.send_if_modified(|high| {
            let changed = *high != prefs.high_score;
            *high = prefs.high_score;
            changed
        });
    }

    /// Invalidate the current round so any late loop write is dropped
    fn retire(&self) -> u64 {
        let mut guard = lock(&self.round);
        let state = &mut guard.state;
        state.epoch += 1;
        state.phase = RoundPhase::Idle;
        state.current_visual_value = None;
        state.current_audio_value = None;
        state.current_audio_label = None;
        self.publish(&guard);
        guard.state.epoch
    }
}

async fn run_round(shared: Arc<Shared>, epoch: u64, config: SessionConfig) {
    let interval = Duration::from_millis(config.settings.event_interval_ms);
    for index in 0..config.settings.total_events {
        if !shared.present(epoch, index) {
            return;
        }
        tokio::time::sleep(interval).await;
    }
    shared.finish(epoch);
}

async fn follow_preferences(shared: Arc<Shared>, mut rx: watch::Receiver<Preferences>) {
    while rx.changed().await.is_ok() {
        let prefs = *rx.borrow_and_update();
        debug!(?prefs, "preferences changed");
        shared.merge_preferences(prefs);
    }
}

/// Owns one N-back round at a time: builds its sequences, paces the stimuli
/// and scores match claims.
///
/// Construct inside a Tokio runtime; the round loop and the preference
/// watcher run as spawned tasks. Dropping the controller cancels both.
pub struct GameController {
    shared: Arc<Shared>,
    source: Mutex<Box<dyn SequenceSource>>,
    round_task: Mutex<Option<JoinHandle<()>>>,
    prefs_task: JoinHandle<()>,
}

impl GameController {
    pub fn new(store: Arc<dyn PreferencesStore>, source: impl SequenceSource + 'static) -> Self {
        let rx = store.subscribe();
        let prefs = *rx.borrow();
        let next = SessionConfig::new(Modality::default(), prefs.settings);

        let (state_tx, _) = watch::channel(RoundState::new(next, 0));
        let (score_tx, _) = watch::channel(0);
        let (high_score_tx, _) = watch::channel(prefs.high_score);
        let (summary_tx, _) = watch::channel(None);

        let shared = Arc::new(Shared {
            round: Mutex::new(Round {
                state: RoundState::new(next, 0),
                ..Round::default()
            }),
            next: Mutex::new(next),
            store,
            state_tx,
            score_tx,
            high_score_tx,
            summary_tx,
        });
        let prefs_task = tokio::spawn(follow_preferences(Arc::clone(&shared), rx));

        Self {
            shared,
            source: Mutex::new(Box::new(source)),
            round_task: Mutex::new(None),
            prefs_task,
        }
    }

    /// Controller drawing fresh random sequences for every round
    pub fn with_random_sequences(store: Arc<dyn PreferencesStore>) -> Self {
        Self::new(store, GeneratedSequences::from_entropy())
    }

    /// Select the modality of the next round
    pub fn configure(&self, modality: Modality) {
        lock(&self.shared.next).modality = modality;
    }

    /// Configuration the next `start()` will use
    pub fn next_config(&self) -> SessionConfig {
        *lock(&self.shared.next)
    }

    /// Cancel any running round and begin a new one.
    ///
    /// The previous round is retired before the new configuration is checked,
    /// so a failed start leaves the controller idle.
    pub fn start(&self) -> Result<()> {
        let mut task = lock(&self.round_task);
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.shared.retire();

        let config = self.next_config();
        if let Err(err) = config.validate() {
            warn!(%err, "round not started");
            return Err(err);
        }

        let (visual, audio) = {
            let mut source = lock(&self.source);
            let mut draw = |channel: Channel| -> Result<Sequence> {
                if !config.modality.includes(channel) {
                    return Ok(Vec::new());
                }
                let seq = source.sequence(channel, &config)?;
                if seq.len() < config.settings.total_events {
                    return Err(NbackError::invalid(format!(
                        "{channel} sequence has {} values, round needs {}",
                        seq.len(),
                        config.settings.total_events
                    )));
                }
                Ok(seq)
            };
            (draw(Channel::Visual)?, draw(Channel::Audio)?)
        };
        debug!(?visual, ?audio, "generated sequences");

        let epoch = {
            let mut guard = lock(&self.shared.round);
            let epoch = guard.state.epoch + 1;
            let mut state = RoundState::new(config, epoch);
            state.phase = RoundPhase::Running;
            *guard = Round {
                state,
                visual,
                audio,
            };
            self.shared.publish(&guard);
            epoch
        };

        info!(
            epoch,
            modality = %config.modality,
            n_back = config.settings.n_back,
            events = config.settings.total_events,
            interval_ms = config.settings.event_interval_ms,
            "round started"
        );
        *task = Some(tokio::spawn(run_round(
            Arc::clone(&self.shared),
            epoch,
            config,
        )));
        Ok(())
    }

    pub fn claim_visual_match(&self) -> MatchOutcome {
        self.shared.claim(Channel::Visual)
    }

    pub fn claim_audio_match(&self) -> MatchOutcome {
        self.shared.claim(Channel::Audio)
    }

    /// Store settings for the next round and persist them
    pub fn update_settings(&self, settings: Settings) {
        lock(&self.shared.next).settings = settings;
        if let Err(err) = self.shared.store.save_settings(&settings) {
            warn!(%err, "could not persist settings");
        }
        info!(?settings, "settings updated");
    }

    /// Cancel the running round, if any, and stop following preferences
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.round_task).take() {
            task.abort();
        }
        self.prefs_task.abort();
        let epoch = self.shared.retire();
        debug!(epoch, "controller shut down");
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RoundState> {
        self.shared.state_tx.subscribe()
    }

    pub fn state(&self) -> RoundState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn subscribe_score(&self) -> watch::Receiver<u32> {
        self.shared.score_tx.subscribe()
    }

    pub fn score(&self) -> u32 {
        *self.shared.score_tx.borrow()
    }

    pub fn subscribe_high_score(&self) -> watch::Receiver<u32> {
        self.shared.high_score_tx.subscribe()
    }

    pub fn high_score(&self) -> u32 {
        *self.shared.high_score_tx.borrow()
    }

    /// Latest completed round; `None` until one finishes
    pub fn subscribe_summary(&self) -> watch::Receiver<Option<RoundSummary>> {
        self.shared.summary_tx.subscribe()
    }
}

impl Drop for GameController {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.round_task).take() {
            task.abort();
        }
        self.prefs_task.abort();
    }
}
