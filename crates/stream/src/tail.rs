//! File tailing primitives.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::StreamResult;

/// Bytes read from the end of a file when looking for its last line.
const TAIL_WINDOW: u64 = 4096;

/// Last non-empty line of `path`, reading at most the final 4 KiB.
///
/// Returns `Ok(None)` for a missing or empty file.
pub fn tail_last_line(path: &Path) -> StreamResult<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let end = file.seek(SeekFrom::End(0))?;
    if end == 0 {
        return Ok(None);
    }
    let start = end.saturating_sub(TAIL_WINDOW);
    file.seek(SeekFrom::Start(start))?;

    let mut chunk = Vec::with_capacity((end - start) as usize);
    file.take(TAIL_WINDOW).read_to_end(&mut chunk)?;

    let last = chunk
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .last();
    Ok(last.map(|line| String::from_utf8_lossy(line).into_owned()))
}

/// Read position in an append-only line log.
///
/// The file is opened lazily. When it is first seen the cursor starts at
/// its end, so history written before the observer arrived is never
/// replayed. Only complete, newline-terminated lines are returned; a
/// partially written trailing line is picked up on a later drain.
#[derive(Debug)]
pub struct LogCursor {
    path: PathBuf,
    position: Option<u64>,
}

impl LogCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: None,
        }
    }

    /// Byte offset of the next unread line, once the file has been seen.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// New complete lines since the previous drain, blank lines skipped.
    pub fn drain(&mut self) -> StreamResult<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let end = file.seek(SeekFrom::End(0))?;

        let position = match self.position {
            None => {
                self.position = Some(end);
                return Ok(Vec::new());
            }
            // Truncated or replaced: follow the new end
            Some(pos) if pos > end => {
                self.position = Some(end);
                return Ok(Vec::new());
            }
            Some(pos) => pos,
        };
        if position == end {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(position))?;
        let mut buf = Vec::with_capacity((end - position) as usize);
        file.take(end - position).read_to_end(&mut buf)?;

        let Some(complete) = buf.iter().rposition(|b| *b == b'\n').map(|i| i + 1) else {
            return Ok(Vec::new());
        };
        self.position = Some(position + complete as u64);

        Ok(buf[..complete]
            .split(|b| *b == b'\n')
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}
