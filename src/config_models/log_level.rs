use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;

/// Log verbosity of a launched node instance.
///
/// The numeric severities (0, 10, .., 50) are the wire format older
/// deployments used in their settings files; [`LogLevel::from_severity`]
/// keeps them readable.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    ValueEnum,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    NotSet,
    #[default]
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The numeric severity, compatible with stored settings.
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::NotSet => 0,
            LogLevel::Debug => 10,
            LogLevel::Info => 20,
            LogLevel::Warning => 30,
            LogLevel::Error => 40,
            LogLevel::Critical => 50,
        }
    }

    pub fn from_severity(severity: u8) -> Option<Self> {
        match severity {
            0 => Some(LogLevel::NotSet),
            10 => Some(LogLevel::Debug),
            20 => Some(LogLevel::Info),
            30 => Some(LogLevel::Warning),
            40 => Some(LogLevel::Error),
            50 => Some(LogLevel::Critical),
            _ => None,
        }
    }

    /// The equivalent `tracing` env-filter directive.
    ///
    /// `NotSet` maps to `trace` (log everything); `Critical` has no tracing
    /// counterpart and maps to `error`.
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::NotSet => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}
