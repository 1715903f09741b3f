use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashwork_core::job::JobResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::result::ExpiredSink;
use crate::service::{SaveSink, SavedResult, Sinks};

pub const RESULTS_FILE: &str = "results.jsonl";
pub const EXPIRED_FILE: &str = "expired.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecord {
    pub node_id: String,
    pub request_id: String,
    pub difficulty: u8,
    pub data: String,
    pub nonce: String,
    pub hash: String,
    pub saved_at: u64,
}

impl From<&SavedResult> for SavedRecord {
    fn from(r: &SavedResult) -> Self {
        Self {
            node_id: r.node_id.to_string(),
            request_id: r.request_id.to_string(),
            difficulty: r.difficulty,
            data: hex::encode(&r.data),
            nonce: hex::encode(&r.nonce),
            hash: hex::encode(&r.hash),
            saved_at: unix_now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredRecord {
    pub request_id: String,
    pub nonce: String,
    pub hash: String,
    pub expired_at: u64,
}

impl From<&JobResult> for ExpiredRecord {
    fn from(r: &JobResult) -> Self {
        Self {
            request_id: r.id.to_string(),
            nonce: hex::encode(&r.nonce),
            hash: hex::encode(&r.hash),
            expired_at: unix_now(),
        }
    }
}

/// Appends one JSON object per line to a file.
///
/// Records are queued to a writer on the blocking pool, so appending never
/// touches the disk from the calling task.
#[derive(Clone)]
pub struct JsonlSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl JsonlSink {
    /// Open `path` for appending and start its writer.
    ///
    /// The writer drains every queued line and exits once all clones of the
    /// sink are dropped; the returned handle completes at that point.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<(Self, JoinHandle<()>)> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::task::spawn_blocking(move || write_lines(path, file, rx));
        Ok((Self { tx }, writer))
    }

    pub fn append<T: Serialize>(&self, record: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.tx
            .send(line)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "record writer stopped"))
    }

    /// Queue failures are logged and swallowed.
    fn append_logged<T: Serialize>(&self, record: &T) {
        if let Err(e) = self.append(record) {
            tracing::warn!(error = %e, "failed to persist record");
        }
    }
}

fn write_lines(path: PathBuf, mut file: File, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(line) = rx.blocking_recv() {
        if let Err(e) = file.write_all(&line).and_then(|()| file.flush()) {
            tracing::warn!(?path, error = %e, "failed to persist record");
        }
    }
    tracing::debug!(?path, "record writer stopped");
}

/// Both sinks, writing `results.jsonl` and `expired.jsonl` under `dir`.
///
/// Await the returned writers after the sinks are dropped to be sure every
/// record reached the disk.
pub fn file_sinks(dir: &Path) -> io::Result<(Sinks, Vec<JoinHandle<()>>)> {
    let (saved, saved_writer) = JsonlSink::open(dir.join(RESULTS_FILE))?;
    let (expired, expired_writer) = JsonlSink::open(dir.join(EXPIRED_FILE))?;
    tracing::info!(dir = ?dir, "persisting results");
    let sinks = Sinks {
        save: Some(save_sink(saved)),
        expired: Some(expired_sink(expired)),
    };
    Ok((sinks, vec![saved_writer, expired_writer]))
}

pub fn save_sink(sink: JsonlSink) -> SaveSink {
    Arc::new(move |result: SavedResult| sink.append_logged(&SavedRecord::from(&result)))
}

pub fn expired_sink(sink: JsonlSink) -> ExpiredSink {
    Arc::new(move |result: JobResult| sink.append_logged(&ExpiredRecord::from(&result)))
}

/// Read back saved results. Returns an empty list if the file doesn't exist;
/// unparseable lines are skipped.
pub fn load_saved(path: &Path) -> Vec<SavedRecord> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => {
            tracing::info!(?path, "no saved results found");
            return Vec::new();
        }
    };

    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(&line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(?path, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
