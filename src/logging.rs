//! `log4rs` backend for the `log` facade: a console appender and, when
//! configured, a file appender with the same pattern.
use crate::config::LoggingSettings;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::str::FromStr;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {t} - {l} - {m}{n}";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level `{0}`")]
    Level(String),
    #[error("cannot open log file: {0}")]
    File(#[from] std::io::Error),
    #[error("invalid logging configuration: {0}")]
    Config(#[from] log4rs::config::runtime::ConfigErrors),
    #[error("a logger is already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// # Errors
/// If the level is unknown or the log file cannot be opened.
pub fn build_config(settings: &LoggingSettings) -> Result<Config, LoggingError> {
    let level = LevelFilter::from_str(&settings.level)
        .map_err(|_| LoggingError::Level(settings.level.clone()))?;
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");
    if let Some(path) = &settings.file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(path)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }
    Ok(builder.build(root.build(level))?)
}

/// Installs the global logger. Call once from the embedding binary.
///
/// # Errors
/// See [`build_config`]; also fails if a logger was already installed.
pub fn init(settings: &LoggingSettings) -> Result<log4rs::Handle, LoggingError> {
    let config = build_config(settings)?;
    Ok(log4rs::init_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_level() {
        let settings = LoggingSettings {
            level: "loud".to_string(),
            file: None,
        };
        assert!(matches!(build_config(&settings), Err(LoggingError::Level(_))));
    }

    #[test]
    fn builds_file_appender() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LoggingSettings {
            level: "debug".to_string(),
            file: Some(dir.path().join("robustness.log")),
        };
        let config = build_config(&settings).unwrap();
        assert_eq!(config.appenders().len(), 2);
        assert_eq!(config.root().level(), LevelFilter::Debug);
    }
}
