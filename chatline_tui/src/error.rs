use thiserror::Error;

/// Input the TUI itself rejects before anything reaches the session.
#[derive(Error, Debug)]
pub enum TuiError {
    #[error("Usage: {usage}")]
    Usage { usage: &'static str },

    #[error("Unknown command: {command} (try /help)")]
    UnknownCommand { command: String },
}

pub type Result<T> = std::result::Result<T, TuiError>;
