use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Split};
use std::path::{Path, PathBuf};

use crate::{LogEntry, Period, StoreError};

/// Lazy reader over the period files of one conversation.
///
/// Files are visited in period order and each line is parsed on its own.
/// Lines that are blank, not UTF-8, or not a valid entry are skipped and
/// counted. The file list is fixed when the iterator is opened; `restart`
/// reads it again from the first file.
#[derive(Debug)]
pub struct HistoryIter {
    files: Vec<(Period, PathBuf)>,
    next_file: usize,
    current: Option<(PathBuf, Split<BufReader<File>>)>,
    skipped_lines: usize,
}

impl HistoryIter {
    fn new(files: Vec<(Period, PathBuf)>) -> Self {
        Self {
            files,
            next_file: 0,
            current: None,
            skipped_lines: 0,
        }
    }

    /// Periods that matched the requested range, in read order.
    pub fn periods(&self) -> Vec<Period> {
        self.files.iter().map(|(period, _)| *period).collect()
    }

    /// Lines skipped so far because they could not be parsed.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn restart(&mut self) {
        self.next_file = 0;
        self.current = None;
        self.skipped_lines = 0;
    }

    fn open_next_file(&mut self) -> bool {
        while let Some((_, path)) = self.files.get(self.next_file) {
            self.next_file += 1;
            match File::open(path) {
                Ok(file) => {
                    self.current = Some((path.clone(), BufReader::new(file).split(b'\n')));
                    return true;
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable log file");
                }
            }
        }
        false
    }
}

impl Iterator for HistoryIter {
    type Item = LogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() && !self.open_next_file() {
                return None;
            }
            let Some((path, lines)) = self.current.as_mut() else {
                return None;
            };
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(error)) => {
                    tracing::warn!(path = %path.display(), %error, "stopped reading log file");
                    self.current = None;
                    continue;
                }
                None => {
                    self.current = None;
                    continue;
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<LogEntry>(&line) {
                Ok(entry) => return Some(entry),
                Err(error) => {
                    self.skipped_lines += 1;
                    tracing::debug!(path = %path.display(), %error, "skipping malformed log line");
                }
            }
        }
    }
}

/// Lists `YYYYMM.log` files under `conversation_dir` within the period range.
pub(crate) fn open_history(
    conversation_dir: &Path,
    start: Option<Period>,
    end: Option<Period>,
) -> Result<HistoryIter, StoreError> {
    let read_dir = match fs::read_dir(conversation_dir) {
        Ok(read_dir) => read_dir,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(HistoryIter::new(Vec::new()));
        }
        Err(error) => {
            return Err(StoreError::io("list conversation dir", conversation_dir, error));
        }
    };

    let mut files = Vec::new();
    for dir_entry in read_dir {
        let dir_entry = dir_entry
            .map_err(|error| StoreError::io("list conversation dir", conversation_dir, error))?;
        let path = dir_entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(period) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(Period::from_file_name)
        else {
            continue;
        };
        if period.within(start, end) {
            files.push((period, path));
        }
    }
    files.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(HistoryIter::new(files))
}
