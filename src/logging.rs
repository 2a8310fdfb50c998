//! A verbosity-gated front for the `log` facade.
//!
//! Each [`crate::FieldDataProcessor`] owns its own [`PipelineLogger`], so one
//! instance can be silenced with [`Verbosity::None`] while others keep logging.

use crate::config::Verbosity;
use log::Level;
use std::fmt::Arguments;

pub const LOG_TARGET: &str = "field_data_processor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLogger {
    max_level: Option<Level>,
}

impl PipelineLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        let max_level = match verbosity {
            Verbosity::Debug => Some(Level::Debug),
            Verbosity::Info => Some(Level::Info),
            Verbosity::None => None,
        };
        Self { max_level }
    }

    /// A logger that drops every record.
    pub fn noop() -> Self {
        Self { max_level: None }
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.max_level.is_some_and(|max| level <= max)
    }

    pub fn log(&self, level: Level, args: Arguments<'_>) {
        if self.enabled(level) {
            log::log!(target: LOG_TARGET, level, "{}", args);
        }
    }

    pub fn debug(&self, args: Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn info(&self, args: Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn error(&self, args: Arguments<'_>) {
        self.log(Level::Error, args);
    }
}
