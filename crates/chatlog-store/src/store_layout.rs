//! On-disk naming rules for conversations, period files, and media copies.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local};

const UNSAFE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const EMPTY_NAME_PLACEHOLDER: &str = "unknown";
const LOG_FILE_EXTENSION: &str = "log";

/// Replaces filesystem-unsafe characters so `name` can be used as one path
/// component.
pub fn safe_name(name: &str) -> String {
    let replaced = name
        .chars()
        .map(|ch| {
            if UNSAFE_NAME_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect::<String>();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        return EMPTY_NAME_PLACEHOLDER.to_string();
    }
    if trimmed.chars().all(|ch| ch == '.') {
        return trimmed.replace('.', "_");
    }
    trimmed.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// One calendar month; the partition unit of the log files.
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    /// Parses `YYYYMM`, `YYYY-MM`, or any string whose first six digits form
    /// a year and month (e.g. `2024-03-15`).
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw
            .chars()
            .filter(char::is_ascii_digit)
            .take(6)
            .collect::<String>();
        if digits.len() != 6 {
            return None;
        }
        let year = digits[..4].parse::<i32>().ok()?;
        let month = digits[4..].parse::<u32>().ok()?;
        Self::new(year, month)
    }

    pub fn from_datetime(datetime: &DateTime<Local>) -> Self {
        Self {
            year: datetime.year(),
            month: datetime.month(),
        }
    }

    pub fn from_unix_ms(unix_ms: u64) -> Self {
        Self::from_datetime(&crate::local_datetime_from_unix_ms(unix_ms))
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn file_stem(self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    pub fn file_name(self) -> String {
        format!("{}.{LOG_FILE_EXTENSION}", self.file_stem())
    }

    /// Recognizes `YYYYMM.log` period files.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(&format!(".{LOG_FILE_EXTENSION}"))?;
        if stem.len() != 6 || !stem.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        Self::parse(stem)
    }

    pub fn within(self, start: Option<Period>, end: Option<Period>) -> bool {
        start.map_or(true, |start| self >= start) && end.map_or(true, |end| self <= end)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| format!("invalid period '{raw}' (expected YYYYMM)"))
    }
}

/// `media/<type>/<YYYYMMDD>` under a conversation directory.
pub(crate) fn media_dir(
    conversation_dir: &Path,
    media_type: &str,
    now: &DateTime<Local>,
) -> PathBuf {
    conversation_dir
        .join("media")
        .join(media_type)
        .join(now.format("%Y%m%d").to_string())
}

/// `<HHMMSS>_<safe_stem><ext>`, with `_<attempt>` before the extension on
/// retries after a name collision.
pub(crate) fn media_file_name(now: &DateTime<Local>, original_name: &str, attempt: usize) -> String {
    let original = Path::new(original_name);
    let stem = original
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = original
        .extension()
        .map(|extension| format!(".{}", safe_name(&extension.to_string_lossy())))
        .unwrap_or_default();
    let stem = if stem.trim().is_empty() {
        "media".to_string()
    } else {
        safe_name(&stem)
    };
    let time = now.format("%H%M%S");
    if attempt == 0 {
        format!("{time}_{stem}{extension}")
    } else {
        format!("{time}_{stem}_{attempt}{extension}")
    }
}

/// Renders `path` relative to `root` with `/` separators.
pub(crate) fn relative_store_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
