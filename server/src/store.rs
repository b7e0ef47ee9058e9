//! Match result persistence.
//!
//! The session manager never waits on storage. It submits [`StoreCommand`]s
//! through a [`MatchSink`], and a background recorder task applies them to a
//! [`MatchStore`], retrying failed writes a bounded number of times.

use log::{debug, error, info, warn};
use shared::{MatchRecord, PlayerId, PlayerStatus};
use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Attempts per command before it is dropped.
pub const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    SetStatus {
        player_id: PlayerId,
        status: PlayerStatus,
    },
    SaveMatch(MatchRecord),
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Encode(serde_json::Error),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "storage I/O failed: {}", e),
            StoreError::Encode(e) => write!(f, "failed to encode record: {}", e),
            StoreError::Unavailable(reason) => write!(f, "storage unavailable: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Encode(e) => Some(e),
            StoreError::Unavailable(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encode(e)
    }
}

/// Fire-and-forget submission of storage work.
pub trait MatchSink: Send + Sync {
    fn submit(&self, command: StoreCommand);
}

impl MatchSink for mpsc::UnboundedSender<StoreCommand> {
    fn submit(&self, command: StoreCommand) {
        if let Err(e) = self.send(command) {
            error!("Recorder is gone, dropping {:?}", e.0);
        }
    }
}

/// Durable storage for finished matches and player availability.
pub trait MatchStore: Send {
    fn save_match(&mut self, record: &MatchRecord) -> Result<(), StoreError>;
    fn set_player_status(
        &mut self,
        player_id: PlayerId,
        status: PlayerStatus,
    ) -> Result<(), StoreError>;

    fn apply(&mut self, command: &StoreCommand) -> Result<(), StoreError> {
        match command {
            StoreCommand::SetStatus { player_id, status } => {
                self.set_player_status(*player_id, *status)
            }
            StoreCommand::SaveMatch(record) => self.save_match(record),
        }
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub matches: Vec<MatchRecord>,
    pub statuses: HashMap<PlayerId, PlayerStatus>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for MemoryStore {
    fn save_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        self.matches.push(record.clone());
        Ok(())
    }

    fn set_player_status(
        &mut self,
        player_id: PlayerId,
        status: PlayerStatus,
    ) -> Result<(), StoreError> {
        self.statuses.insert(player_id, status);
        Ok(())
    }
}

/// Appends one JSON object per finished match to a file. Player statuses are
/// kept in memory only.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    statuses: HashMap<PlayerId, PlayerStatus>,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            statuses: HashMap::new(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn status(&self, player_id: PlayerId) -> Option<PlayerStatus> {
        self.statuses.get(&player_id).copied()
    }
}

impl MatchStore for JsonLinesStore {
    fn save_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn set_player_status(
        &mut self,
        player_id: PlayerId,
        status: PlayerStatus,
    ) -> Result<(), StoreError> {
        self.statuses.insert(player_id, status);
        Ok(())
    }
}

/// Spawns the recorder on the blocking pool, since stores do synchronous
/// I/O. It runs until every sender is dropped and then hands the store back
/// through its join handle.
pub fn spawn_recorder<S>(mut store: S) -> (mpsc::UnboundedSender<StoreCommand>, JoinHandle<S>)
where
    S: MatchStore + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<StoreCommand>();

    let handle = tokio::task::spawn_blocking(move || {
        while let Some(command) = rx.blocking_recv() {
            apply_with_retry(&mut store, &command);
        }
        info!("Recorder stopped");
        store
    });

    (tx, handle)
}

fn apply_with_retry<S: MatchStore>(store: &mut S, command: &StoreCommand) {
    for attempt in 1..=MAX_ATTEMPTS {
        match store.apply(command) {
            Ok(()) => {
                debug!("Stored {:?}", command);
                return;
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!("Store attempt {} failed: {}, retrying", attempt, e);
                std::thread::sleep(RETRY_BACKOFF * attempt);
            }
            Err(e) => {
                error!(
                    "Giving up on {:?} after {} attempts: {}",
                    command, MAX_ATTEMPTS, e
                );
            }
        }
    }
}
