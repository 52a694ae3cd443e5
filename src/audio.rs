use std::io::{self, Write};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::RoundState;

/// Renders audio stimuli, e.g. by speaking or flashing the letter
pub trait AudioSink: Send + Sync + 'static {
    fn announce(&self, label: &str);
}

/// Remembers which stimulus was last announced.
///
/// Stimuli are told apart by round epoch and event index, so a letter that
/// repeats on consecutive events is announced each time.
#[derive(Debug, Default, Clone)]
pub struct CueTracker {
    last: Option<(u64, usize)>,
}

impl CueTracker {
    /// Letter to announce for `state`, if it is a stimulus not seen before
    pub fn next_cue(&mut self, state: &RoundState) -> Option<String> {
        let label = state
            .current_audio_label
            .as_ref()
            .filter(|label| !label.is_empty())?;
        let key = (state.epoch, state.current_event_index);
        if self.last == Some(key) {
            return None;
        }
        self.last = Some(key);
        Some(label.clone())
    }
}

/// Writes the terminal bell to `out`. Call it from the thread that owns the
/// terminal so the byte never splits a frame.
pub fn ring_bell<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    out.write_all(b"\x07")?;
    out.flush()
}

/// Calls `sink` once for every newly presented stimulus that carries a letter
pub fn spawn_announcer<S: AudioSink>(mut rx: watch::Receiver<RoundState>, sink: S) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cues = CueTracker::default();
        loop {
            let cue = cues.next_cue(&rx.borrow_and_update());
            if let Some(label) = cue {
                debug!(%label, "announce");
                sink.announce(&label);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}
