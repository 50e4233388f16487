pub mod audio;
pub mod client;
pub mod integration;
pub mod messages;
pub mod render;
pub mod session;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParrotError {
    #[error("Input is empty")]
    EmptyInput,

    #[error("A submission is already in flight")]
    SubmissionPending,

    #[error("Rate limited by the completion endpoint")]
    RateLimited,

    #[error("Completion endpoint returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Audio device busy: {0}")]
    DeviceBusy(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl From<std::io::Error> for ParrotError {
    fn from(e: std::io::Error) -> Self {
        ParrotError::Io(e.to_string())
    }
}

impl From<reqwest::Error> for ParrotError {
    fn from(e: reqwest::Error) -> Self {
        ParrotError::Transport(e.to_string())
    }
}

impl ParrotError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The user simply resubmits
            ParrotError::EmptyInput => true,
            ParrotError::SubmissionPending => true,
            ParrotError::RateLimited => true,
            ParrotError::Http { .. } => true,
            ParrotError::Transport(_) => true,
            ParrotError::InvalidResponse(_) => true,
            ParrotError::Stream(_) => true,
            ParrotError::AudioProcessing(_) => true,
            ParrotError::DeviceBusy(_) => true,
            // Hardware/device errors may require user intervention
            ParrotError::AudioDevice(_) => false,
            ParrotError::ModelLoad(_) => false,
            ParrotError::Config(_) => false,
            ParrotError::Io(_) => false,
            ParrotError::Channel(_) => false,
        }
    }

    /// Get a user-facing notification text
    pub fn user_message(&self) -> String {
        match self {
            ParrotError::EmptyInput => "Please type or say something first.".to_string(),
            ParrotError::SubmissionPending => {
                "Still working on the previous message.".to_string()
            }
            ParrotError::RateLimited => "Too many requests. Please try again later.".to_string(),
            ParrotError::Http { message, .. } => {
                if message.trim().is_empty() {
                    "An error occurred.".to_string()
                } else {
                    message.clone()
                }
            }
            ParrotError::Transport(_) => "Something went wrong. Please try again.".to_string(),
            ParrotError::InvalidResponse(_) => "Invalid response from server".to_string(),
            ParrotError::Stream(message) => message.clone(),
            ParrotError::AudioDevice(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            ParrotError::AudioProcessing(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            ParrotError::ModelLoad(_) => "Failed to load speech detection.".to_string(),
            ParrotError::Config(_) => "Configuration error. Please check settings.".to_string(),
            ParrotError::Io(_) => "File system error occurred.".to_string(),
            ParrotError::DeviceBusy(_) => "Audio device is busy.".to_string(),
            ParrotError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ParrotError>;
