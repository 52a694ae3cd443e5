use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use nback::config::{MemoryPreferencesStore, Preferences};
use nback::runtime::{intent_for, AppEvent, FixedTicker, Intent, Runner, TestEventSource};
use nback::sequence::ScriptedSequences;
use nback::session::{MatchOutcome, Modality, Settings};
use nback::GameController;

// Headless run of the front-end loop without a TTY: key events go through
// Runner/TestEventSource and the key bindings into a real controller.

fn key(code: KeyCode) -> AppEvent {
    AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn headless_round_scores_a_key_press() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();
    let _guard = rt.enter();

    let store = Arc::new(MemoryPreferencesStore::new(Preferences {
        high_score: 0,
        settings: Settings {
            n_back: 1,
            total_events: 4,
            event_interval_ms: 300,
            ..Settings::default()
        },
    }));
    let controller = GameController::new(store, ScriptedSequences::visual(vec![6, 6, 1, 2]));

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    let drive = |event: AppEvent| {
        tx.send(event).unwrap();
        loop {
            if let AppEvent::Key(k) = runner.step() {
                match intent_for(&k) {
                    Some(Intent::StartRound) => controller.start().unwrap(),
                    Some(Intent::SelectModality(m)) => controller.configure(m),
                    Some(Intent::ClaimVisual) => {
                        controller.claim_visual_match();
                    }
                    Some(Intent::ClaimAudio) => {
                        controller.claim_audio_match();
                    }
                    Some(Intent::Quit) | None => {}
                }
                break;
            }
        }
    };

    drive(key(KeyCode::Char('1')));
    assert_eq!(controller.next_config().modality, Modality::Visual);

    drive(key(KeyCode::Enter));
    assert!(wait_until(Duration::from_secs(2), || {
        controller.state().current_event_index == 2
    }));

    drive(key(KeyCode::Char('f')));
    assert_eq!(controller.state().match_outcome, MatchOutcome::Match);
    assert_eq!(controller.score(), 1);

    assert!(wait_until(Duration::from_secs(3), || !controller.state().is_running()));
    assert_eq!(controller.high_score(), 1);
    drop(controller);
}
