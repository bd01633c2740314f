use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("run source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("run source timed out after {0}ms")]
    SourceTimeout(u64),

    #[error("runs out of order at position {position}")]
    UnorderedRuns { position: usize },

    #[error("character thread revisited run {run}")]
    ThreadRevisit { run: usize },

    #[error("persisted range corrupt: {0}")]
    PersistedStateCorrupt(String),

    #[error("invalid date range expression: {expr}")]
    RangeFormat { expr: String },

    #[error("start date {start} is after end date {end}")]
    RangeOrder { start: String, end: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatsError {
    /// Errors the cache absorbs by falling back to zeroed stats or the all-time window.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable(_)
                | Self::SourceTimeout(_)
                | Self::PersistedStateCorrupt(_)
                | Self::Io(_)
                | Self::Json(_)
        )
    }

    /// Message safe to show to an end user (chat command or web page).
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceUnavailable(_) | Self::SourceTimeout(_) => {
                "run history is not available right now".to_string()
            }
            Self::UnorderedRuns { .. } | Self::ThreadRevisit { .. } => {
                "run history is inconsistent; stats were not updated".to_string()
            }
            Self::PersistedStateCorrupt(_) => {
                "saved date range was unreadable; showing all-time stats".to_string()
            }
            Self::RangeFormat { expr } => format!(
                "could not read \"{expr}\" as a date range. Use YYYY, YYYY/MM/DD-YYYY/MM/DD, YYYY/MM/DD+ or YYYY/MM/DD-"
            ),
            Self::RangeOrder { start, end } => {
                format!("the start date {start} comes after the end date {end}")
            }
            Self::Io(_) | Self::Json(_) => "internal storage error".to_string(),
        }
    }
}
