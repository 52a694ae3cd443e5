use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use nback::{
    app_dirs::AppDirs,
    audio::{ring_bell, CueTracker},
    config::{FilePreferencesStore, PreferencesStore},
    history::HistoryDb,
    runtime::{intent_for, AppEvent, CrosstermEventSource, FixedTicker, Intent, Runner},
    sequence::{GeneratedSequences, SequenceSource},
    session::{Channel, Modality, SessionConfig, Settings},
    ui::App,
    GameController,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, stdin, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 50;

/// n-back working memory trainer for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Train working memory with the n-back task: watch positions on a grid, letters, or both, and flag every stimulus that matches the one N steps back. Settings given on the command line are saved for later runs."
)]
pub struct Cli {
    /// stimulus channels to train
    #[clap(short = 'm', long, value_enum, default_value_t = Modality::Visual)]
    modality: Modality,

    /// how many steps back a match refers to
    #[clap(short = 'n', long)]
    n_back: Option<usize>,

    /// milliseconds each stimulus stays on screen
    #[clap(short = 'i', long)]
    interval_ms: Option<u64>,

    /// number of stimuli per round
    #[clap(short = 'e', long)]
    events: Option<usize>,

    /// side length of the position grid
    #[clap(short = 'g', long)]
    grid_size: Option<usize>,

    /// number of distinct letters on the audio channel
    #[clap(short = 'a', long)]
    alphabet: Option<usize>,

    /// preferences file to use instead of the platform default
    #[clap(long)]
    config: Option<PathBuf>,

    /// seed the sequence generator for reproducible rounds
    #[clap(long)]
    seed: Option<u64>,

    /// print one generated round as JSON and exit
    #[clap(long)]
    show_sequence: bool,
}

impl Cli {
    /// Saved settings with command line overrides applied
    fn settings(&self, saved: Settings) -> Settings {
        Settings {
            n_back: self.n_back.unwrap_or(saved.n_back),
            event_interval_ms: self.interval_ms.unwrap_or(saved.event_interval_ms),
            total_events: self.events.unwrap_or(saved.total_events),
            grid_size: self.grid_size.unwrap_or(saved.grid_size),
            audio_alphabet_size: self.alphabet.unwrap_or(saved.audio_alphabet_size),
        }
    }

    fn sequence_source(&self) -> GeneratedSequences {
        match self.seed {
            Some(seed) => GeneratedSequences::seeded(seed),
            None => GeneratedSequences::from_entropy(),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("NBACK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
}

fn print_sequences(cli: &Cli, settings: Settings) -> Result<(), Box<dyn Error>> {
    let config = SessionConfig::new(cli.modality, settings);
    if let Err(err) = config.validate() {
        Cli::command().error(ErrorKind::ValueValidation, err).exit();
    }
    let mut source = cli.sequence_source();
    let mut out = serde_json::Map::new();
    for channel in cli.modality.channels() {
        let seq = source.sequence(*channel, &config)?;
        let key = match channel {
            Channel::Visual => "visual",
            Channel::Audio => "audio",
        };
        out.insert(key.to_string(), serde_json::json!(seq));
    }
    println!("{}", serde_json::Value::Object(out));
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    let store = Arc::new(match &cli.config {
        Some(path) => FilePreferencesStore::with_path(path),
        None => FilePreferencesStore::new(),
    });
    let saved = store.load().settings;
    let settings = cli.settings(saved);

    if cli.show_sequence {
        return print_sequences(&cli, settings);
    }

    // Overrides are persisted below, so they must form a playable round.
    if settings != saved {
        if let Err(err) = SessionConfig::new(cli.modality, settings).validate() {
            Cli::command().error(ErrorKind::ValueValidation, err).exit();
        }
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let controller = GameController::new(store, cli.sequence_source());
    controller.configure(cli.modality);
    if settings != saved {
        controller.update_settings(settings);
    }

    let history = AppDirs::history_path().and_then(|path| match HistoryDb::open(&path) {
        Ok(db) => Some(db),
        Err(err) => {
            warn!(%err, path = %path.display(), "round history unavailable");
            None
        }
    });

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &controller, history.as_ref());

    controller.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

fn best_at_level(history: Option<&HistoryDb>, config: &SessionConfig) -> Option<u32> {
    history?
        .best_score(config.modality, config.settings.n_back)
        .unwrap_or_else(|err| {
            warn!(%err, "could not read best score");
            None
        })
}

fn start_tui<B: Backend + Write>(
    terminal: &mut Terminal<B>,
    controller: &GameController,
    history: Option<&HistoryDb>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut summaries = controller.subscribe_summary();
    let mut cues = CueTracker::default();

    let mut app = App {
        next: controller.next_config(),
        ..App::default()
    };
    app.best_at_level = best_at_level(history, &app.next);

    loop {
        app.round = controller.state();
        app.next = controller.next_config();
        app.high_score = controller.high_score();

        if summaries.has_changed().unwrap_or(false) {
            let latest = summaries.borrow_and_update().clone();
            if let Some(summary) = latest {
                if let Some(db) = history {
                    if let Err(err) = db.record(&summary) {
                        warn!(%err, "could not record round");
                    }
                }
                app.last_summary = Some(summary);
                app.best_at_level = best_at_level(history, &app.next);
            }
        }

        terminal.draw(|f| f.render_widget(&app, f.area()))?;
        if let Some(label) = cues.next_cue(&app.round) {
            debug!(%label, "announce");
            ring_bell(terminal.backend_mut())?;
        }

        let AppEvent::Key(key) = runner.step() else {
            continue;
        };
        match intent_for(&key) {
            Some(Intent::Quit) => break,
            Some(Intent::StartRound) => {
                app.status = controller.start().err().map(|err| err.to_string());
            }
            Some(Intent::SelectModality(modality)) => {
                controller.configure(modality);
                app.next = controller.next_config();
                app.best_at_level = best_at_level(history, &app.next);
            }
            Some(Intent::ClaimVisual) => {
                controller.claim_visual_match();
            }
            Some(Intent::ClaimAudio) => {
                controller.claim_audio_match();
            }
            None => {}
        }
    }

    Ok(())
}
