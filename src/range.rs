use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Date format of the persisted range file and of range expressions.
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Inclusive `[start, end]` window. A missing side is unbounded; both missing is all-time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateWindow {
    pub fn all_time() -> Self {
        Self::default()
    }

    /// Window with its bounds checked for order.
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<Self, StatsError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Err(StatsError::RangeOrder {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn is_all_time(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Bounds are inclusive.
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start.is_none_or(|s| timestamp >= s) && self.end.is_none_or(|e| timestamp <= e)
    }

    /// Window covering whole calendar days.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start: start.map(start_of_day),
            end: end.map(end_of_day),
        }
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    // 23:59:59 is always a valid time
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Parse a date-range expression.
///
/// - `YYYY` / `YYYY/MM` / `YYYY/MM/DD`: the whole period
/// - `A-B`: start of period A through end of period B
/// - `A+`: from the start of A onwards
/// - `A-`: everything up to the end of A
pub fn parse_date_range(expr: &str) -> Result<DateWindow, StatsError> {
    let trimmed = expr.trim();
    let format_error = || StatsError::RangeFormat {
        expr: expr.to_string(),
    };

    if let Some(head) = trimmed.strip_suffix('+') {
        let (start, _) = parse_period(head).ok_or_else(format_error)?;
        return Ok(DateWindow {
            start: Some(start),
            end: None,
        });
    }
    if let Some(head) = trimmed.strip_suffix('-') {
        let (_, end) = parse_period(head).ok_or_else(format_error)?;
        return Ok(DateWindow {
            start: None,
            end: Some(end),
        });
    }
    if let Some((left, right)) = trimmed.split_once('-') {
        let (start, _) = parse_period(left).ok_or_else(format_error)?;
        let (_, end) = parse_period(right).ok_or_else(format_error)?;
        return DateWindow::new(Some(start), Some(end));
    }
    let (start, end) = parse_period(trimmed).ok_or_else(format_error)?;
    Ok(DateWindow {
        start: Some(start),
        end: Some(end),
    })
}

/// First and last second of a `YYYY[/MM[/DD]]` period.
fn parse_period(text: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let parts: Vec<&str> = text.trim().split('/').collect();
    let number = |s: &str, max_len: usize| -> Option<u32> {
        if s.is_empty() || s.len() > max_len || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    };

    let year = match parts.first() {
        Some(y) if y.len() == 4 => number(*y, 4)? as i32,
        _ => return None,
    };
    let (first, last) = match parts.as_slice() {
        [_] => (
            NaiveDate::from_ymd_opt(year, 1, 1)?,
            NaiveDate::from_ymd_opt(year, 12, 31)?,
        ),
        [_, m] => {
            let month = number(*m, 2)?;
            (
                NaiveDate::from_ymd_opt(year, month, 1)?,
                last_day_of_month(year, month)?,
            )
        }
        [_, m, d] => {
            let day = NaiveDate::from_ymd_opt(year, number(*m, 2)?, number(*d, 2)?)?;
            (day, day)
        }
        _ => return None,
    };
    Some((start_of_day(first), end_of_day(last)))
}

/// On-disk shape of the persisted window.
#[derive(Debug, Default, Deserialize, Serialize)]
struct PersistedRange {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl PersistedRange {
    fn from_window(window: &DateWindow) -> Self {
        Self {
            start_date: window.start.map(|d| d.format(DATE_FORMAT).to_string()),
            end_date: window.end.map(|d| d.format(DATE_FORMAT).to_string()),
        }
    }

    fn into_window(self) -> Result<DateWindow, StatsError> {
        let parse = |value: Option<String>| -> Result<Option<NaiveDate>, StatsError> {
            value
                .map(|s| {
                    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                        StatsError::PersistedStateCorrupt(format!("bad date \"{s}\": {e}"))
                    })
                })
                .transpose()
        };
        let window = DateWindow::from_dates(parse(self.start_date)?, parse(self.end_date)?);
        window
            .validate()
            .map_err(|e| StatsError::PersistedStateCorrupt(e.to_string()))?;
        Ok(window)
    }
}

/// The user-selected window, persisted as JSON and loaded lazily.
#[derive(Debug)]
pub struct RangeCache {
    path: PathBuf,
    loaded: bool,
    window: DateWindow,
}

impl RangeCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            loaded: false,
            window: DateWindow::all_time(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Read the persisted window. Missing or corrupt files mean all-time.
    pub async fn load(&mut self) -> DateWindow {
        self.window = match read_persisted(&self.path).await {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!("range: {e}; using all-time");
                DateWindow::all_time()
            }
        };
        self.loaded = true;
        self.window
    }

    /// Replace the window and persist it. The in-memory value is kept even if the write fails.
    pub async fn update(&mut self, window: DateWindow) -> Result<(), StatsError> {
        window.validate()?;
        self.window = window;
        self.loaded = true;
        write_persisted(&self.path, &window).await
    }
}

async fn read_persisted(path: &Path) -> Result<DateWindow, StatsError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("range: {} not found; using all-time", path.display());
            return Ok(DateWindow::all_time());
        }
        Err(e) => return Err(e.into()),
    };
    let persisted: PersistedRange = serde_json::from_slice(&bytes)
        .map_err(|e| StatsError::PersistedStateCorrupt(format!("{}: {e}", path.display())))?;
    persisted.into_window()
}

/// Write via temp file + rename so readers never see a partial file.
async fn write_persisted(path: &Path, window: &DateWindow) -> Result<(), StatsError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(&PersistedRange::from_window(window))?;
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, json.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Short label for a window, e.g. `2023` or `2023/05/01+`.
pub fn window_label(window: &DateWindow) -> String {
    match (window.start, window.end) {
        (None, None) => "all-time".to_string(),
        (Some(s), None) => format!("{}+", s.format(DATE_FORMAT)),
        (None, Some(e)) => format!("{}-", e.format(DATE_FORMAT)),
        (Some(s), Some(e)) if s.year() == e.year() && s.ordinal() == 1 && e.month() == 12 && e.day() == 31 => {
            s.year().to_string()
        }
        (Some(s), Some(e)) => format!("{}-{}", s.format(DATE_FORMAT), e.format(DATE_FORMAT)),
    }
}
