use std::fs::{self, File, OpenOptions};
use std::io::{Read as _, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::CoreError;
use crate::model::{DownloadRecord, REGISTRY_HEADER};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const LOCK_POLL: Duration = Duration::from_millis(20);

/// Append-only CSV ledger of every fetch attempt.
///
/// All access goes through an advisory lock on the registry file itself:
/// shared for reads, exclusive for appends. Existing bytes are never
/// rewritten; a torn trailing line from a crashed writer is fenced off with a
/// newline and skipped by readers.
#[derive(Debug, Clone)]
pub struct RegistryLedger {
    path: PathBuf,
    lock_timeout: Duration,
}

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

impl RegistryLedger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the registry with just its header if it does not exist yet.
    pub fn ensure_header(&self) -> Result<(), CoreError> {
        let mut file = self.open_for_append()?;
        self.acquire(&file, LockMode::Exclusive)?;
        let result = (|| {
            if file.metadata()?.len() == 0 {
                file.write_all(format!("{REGISTRY_HEADER}\n").as_bytes())?;
                file.sync_all()?;
            }
            Ok::<_, std::io::Error>(())
        })()
        .map_err(|e| self.write_error(e));
        let _ = FileExt::unlock(&file);
        result
    }

    /// Append one row and fsync before returning.
    pub fn append(&self, record: &DownloadRecord) -> Result<(), CoreError> {
        let row = encode_row(record)?;
        let mut file = self.open_for_append()?;
        self.acquire(&file, LockMode::Exclusive)?;
        let result = append_locked(&mut file, &row).map_err(|e| self.write_error(e));
        let _ = FileExt::unlock(&file);
        result?;

        tracing::debug!(
            registry = %self.path.display(),
            name = %record.name,
            status = %record.status,
            "appended registry row"
        );
        Ok(())
    }

    /// Every readable row in file order. A missing registry is empty.
    pub fn records(&self) -> Result<Vec<DownloadRecord>, CoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::Io(e)),
        };
        self.acquire(&file, LockMode::Shared)?;
        let mut data = Vec::new();
        let read = (&file).read_to_end(&mut data);
        let _ = FileExt::unlock(&file);
        read?;
        Ok(parse_rows(&data))
    }

    /// Latest `succeeded` row for `(name, url)`, if any.
    pub fn lookup(&self, name: &str, url: &str) -> Result<Option<DownloadRecord>, CoreError> {
        Ok(self
            .records()?
            .into_iter()
            .rev()
            .find(|r| r.is_succeeded() && r.name == name && r.url == url))
    }

    fn open_for_append(&self) -> Result<File, CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))
    }

    fn acquire(&self, file: &File, mode: LockMode) -> Result<(), CoreError> {
        let deadline = Instant::now() + self.lock_timeout;
        let contended = fs2::lock_contended_error().raw_os_error();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(file),
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if e.raw_os_error() == contended => {
                    if Instant::now() >= deadline {
                        return Err(CoreError::RegistryWrite(format!(
                            "timed out after {:?} waiting for lock on {}",
                            self.lock_timeout,
                            self.path.display()
                        )));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(self.write_error(e)),
            }
        }
    }

    fn write_error(&self, e: std::io::Error) -> CoreError {
        CoreError::RegistryWrite(format!("{}: {e}", self.path.display()))
    }
}

fn encode_row(record: &DownloadRecord) -> Result<Vec<u8>, CoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.serialize(record)?;
    let row = writer
        .into_inner()
        .map_err(|e| CoreError::RegistryWrite(format!("encode row: {e}")))?;
    // One record per physical line.
    let body = row.strip_suffix(b"\n").unwrap_or(&row);
    if body.iter().any(|b| *b == b'\n' || *b == b'\r') {
        return Err(CoreError::RegistryWrite(format!(
            "row for '{}' contains a line break",
            record.name.escape_debug()
        )));
    }
    Ok(row)
}

/// Caller holds the exclusive lock.
fn append_locked(file: &mut File, row: &[u8]) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    let mut buf = Vec::with_capacity(REGISTRY_HEADER.len() + row.len() + 2);
    if len == 0 {
        buf.extend_from_slice(REGISTRY_HEADER.as_bytes());
        buf.push(b'\n');
    } else if !ends_with_newline(file, len)? {
        tracing::warn!("registry ends with a partial line; fencing it off");
        buf.push(b'\n');
    }
    buf.extend_from_slice(row);
    // One write so a crash leaves at most one torn line.
    file.write_all(&buf)?;
    file.sync_all()
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Rows never span physical lines, so each line is parsed on its own and a
/// damaged line (an unclosed quote from a torn write) only loses itself.
fn parse_rows(data: &[u8]) -> Vec<DownloadRecord> {
    let mut lines = data.split(|b| *b == b'\n');
    let header = match lines.next().and_then(parse_line) {
        Some(header) => header,
        None => return Vec::new(),
    };

    let mut out = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let parsed = parse_line(line)
            .ok_or_else(|| "malformed CSV".to_string())
            .and_then(|row| row.deserialize::<DownloadRecord>(Some(&header)).map_err(|e| e.to_string()));
        match parsed {
            Ok(record) => out.push(record),
            Err(error) => tracing::warn!(row = idx + 1, %error, "skipping unreadable registry row"),
        }
    }
    out
}

fn parse_line(line: &[u8]) -> Option<csv::StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line);
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Some(record),
        _ => None,
    }
}
