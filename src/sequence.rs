use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{NbackError, Result};
use crate::session::{Channel, SessionConfig};

/// Ordered stimuli of one channel; values are in `1..=space_size`
pub type Sequence = Vec<u32>;

/// Share of eligible positions forced into a match for played rounds
pub const DEFAULT_MATCH_TARGET: MatchTarget = MatchTarget::Percent(30);

/// How many built-in matches a generated sequence should carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    /// Exact number of forced positions
    Count(usize),
    /// Percentage of the eligible positions (`length - n_back`), rounded
    Percent(u8),
}

impl MatchTarget {
    /// Number of positions to force, never more than `eligible`
    pub fn resolve(self, eligible: usize) -> usize {
        let wanted = match self {
            MatchTarget::Count(count) => count,
            MatchTarget::Percent(pct) => (eligible * pct as usize + 50) / 100,
        };
        wanted.min(eligible)
    }
}

/// Generate a sequence of `length` stimuli drawn from `1..=space_size` where at
/// least `target` positions repeat their `n_back` predecessor.
///
/// Unforced positions keep their uniform draw, so incidental matches can push
/// the total above the target. No two neighbours are equal, except where a
/// forced match is itself a neighbour repeat (`n_back == 1`) or a two-value
/// space leaves no other choice.
pub fn generate<R: Rng + ?Sized>(
    rng: &mut R,
    length: usize,
    space_size: usize,
    target: MatchTarget,
    n_back: usize,
) -> Result<Sequence> {
    if n_back == 0 {
        return Err(NbackError::invalid("n_back must be at least 1"));
    }
    if length <= n_back {
        return Err(NbackError::invalid(format!(
            "sequence length ({length}) must exceed n_back ({n_back})"
        )));
    }
    if space_size < 2 {
        return Err(NbackError::invalid(format!(
            "stimulus space ({space_size}) must hold at least 2 values"
        )));
    }
    if space_size > u32::MAX as usize {
        return Err(NbackError::invalid(format!(
            "stimulus space ({space_size}) exceeds {} values",
            u32::MAX
        )));
    }
    let top = space_size as u32;

    let mut seq: Sequence = (0..length).map(|_| rng.gen_range(1..=top)).collect();

    let eligible = length - n_back;
    let mut forced = vec![false; length];
    for offset in index::sample(rng, eligible, target.resolve(eligible)).into_iter() {
        forced[n_back + offset] = true;
    }

    // Left to right: every value a position depends on is already final.
    for i in 0..length {
        if forced[i] {
            seq[i] = seq[i - n_back];
            continue;
        }

        let prev = i.checked_sub(1).map(|p| seq[p]);
        // With n_back >= 2 a forced successor copies an already final value.
        let next = (n_back >= 2 && i + 1 < length && forced[i + 1]).then(|| seq[i + 1 - n_back]);

        let current = seq[i];
        if prev != Some(current) && next != Some(current) {
            continue;
        }

        let mut candidates: Vec<u32> = (1..=top)
            .filter(|v| Some(*v) != prev && Some(*v) != next)
            .collect();
        if candidates.is_empty() {
            debug!(position = i, "no value avoids both neighbours; keeping the forced match");
            candidates = (1..=top).filter(|v| Some(*v) != prev).collect();
        }
        if let Some(value) = candidates.choose(rng) {
            seq[i] = *value;
        }
    }

    Ok(seq)
}

/// Positions `i >= n_back` whose value equals the one `n_back` steps earlier
pub fn count_matches(seq: &[u32], n_back: usize) -> usize {
    if n_back == 0 {
        return 0;
    }
    seq.iter()
        .zip(seq.iter().skip(n_back))
        .filter(|(earlier, later)| earlier == later)
        .count()
}

/// Supplies the stimulus sequences for a round
pub trait SequenceSource: Send {
    fn sequence(&mut self, channel: Channel, config: &SessionConfig) -> Result<Sequence>;
}

/// Random sequences built by [`generate`]
pub struct GeneratedSequences<R: Rng + Send = StdRng> {
    rng: R,
    target: MatchTarget,
}

impl GeneratedSequences<StdRng> {
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> GeneratedSequences<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            target: DEFAULT_MATCH_TARGET,
        }
    }

    pub fn with_target(mut self, target: MatchTarget) -> Self {
        self.target = target;
        self
    }
}

impl Default for GeneratedSequences<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl<R: Rng + Send> SequenceSource for GeneratedSequences<R> {
    fn sequence(&mut self, channel: Channel, config: &SessionConfig) -> Result<Sequence> {
        generate(
            &mut self.rng,
            config.settings.total_events,
            config.space_size(channel),
            self.target,
            config.settings.n_back,
        )
    }
}

/// Replays fixed sequences; each round gets the first `total_events` values
#[derive(Debug, Clone, Default)]
pub struct ScriptedSequences {
    visual: Sequence,
    audio: Sequence,
}

impl ScriptedSequences {
    pub fn new(visual: Sequence, audio: Sequence) -> Self {
        Self { visual, audio }
    }

    pub fn visual(visual: Sequence) -> Self {
        Self::new(visual, Vec::new())
    }

    pub fn audio(audio: Sequence) -> Self {
        Self::new(Vec::new(), audio)
    }
}

impl SequenceSource for ScriptedSequences {
    fn sequence(&mut self, channel: Channel, config: &SessionConfig) -> Result<Sequence> {
        let script = match channel {
            Channel::Visual => &self.visual,
            Channel::Audio => &self.audio,
        };
        let wanted = config.settings.total_events;
        if script.len() < wanted {
            return Err(NbackError::invalid(format!(
                "scripted {channel} sequence has {} values, round needs {wanted}",
                script.len()
            )));
        }
        Ok(script[..wanted].to_vec())
    }
}
