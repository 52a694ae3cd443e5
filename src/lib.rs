// Library surface for the terminal front-end, headless drivers and tests.
// The binary in main.rs only wires these together.
pub mod app_dirs;
pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod runtime;
pub mod sequence;
pub mod session;
pub mod ui;

pub use controller::GameController;
pub use error::{NbackError, Result};
