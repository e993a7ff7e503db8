//! Append-only audit trail of match events.
//!
//! The trail is separate from diagnostic logging: it records what happened in
//! each match (who played, every shot, how it ended) in a stable text form.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::ShotOutcome;
use crate::pool::SlotId;

/// One entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    MatchStarted {
        slot: SlotId,
        players: [String; 2],
    },
    /// A participant finished placing; `board` is the owner's rendered grid.
    FleetPlaced {
        slot: SlotId,
        player: String,
        board: String,
    },
    ShotFired {
        slot: SlotId,
        shooter: String,
        row: usize,
        col: usize,
        outcome: ShotOutcome,
    },
    TurnTimedOut {
        slot: SlotId,
        player: String,
    },
    /// `winner`/`loser` are `None` when the match ended without a winner.
    MatchEnded {
        slot: SlotId,
        winner: Option<String>,
        loser: Option<String>,
        reason: &'static str,
    },
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::MatchStarted { slot, players } => write!(
                f,
                "=== MATCH START {} ===\nPlayer 1: {}\nPlayer 2: {}",
                slot, players[0], players[1]
            ),
            AuditEvent::FleetPlaced {
                slot,
                player,
                board,
            } => write!(f, "[{}] board of {}:\n{}", slot, player, board),
            AuditEvent::ShotFired {
                slot,
                shooter,
                row,
                col,
                outcome,
            } => {
                let outcome = match outcome {
                    ShotOutcome::Miss => "miss",
                    ShotOutcome::Hit => "hit",
                    ShotOutcome::Sunk => "sunk",
                    ShotOutcome::AlreadyShot => "already shot",
                };
                write!(f, "[{}] {} fires ({},{}): {}", slot, shooter, row, col, outcome)
            }
            AuditEvent::TurnTimedOut { slot, player } => {
                write!(f, "[{}] {} ran out of time", slot, player)
            }
            AuditEvent::MatchEnded {
                slot,
                winner,
                loser,
                reason,
            } => write!(
                f,
                "=== MATCH END {} ({}) ===\nWinner: {}\nLoser: {}",
                slot,
                reason,
                winner.as_deref().unwrap_or("-"),
                loser.as_deref().unwrap_or("-"),
            ),
        }
    }
}

/// Sink for audit events, shared by every match worker.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Appends each event to a text file as a single write.
pub struct FileAuditLog {
    file: Mutex<File>,
}

impl FileAuditLog {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("Cannot open audit log {}: {}", path.display(), e))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditLog for FileAuditLog {
    fn record(&self, event: &AuditEvent) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let entry = format!("{} {}\n", ts, event);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(entry.as_bytes()).and_then(|()| file.flush()) {
            log::warn!("audit log write failed: {}", e);
        }
    }
}

/// Keeps events in memory, in order.
#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Discards every event.
pub struct NullAuditLog;

impl AuditLog for NullAuditLog {
    fn record(&self, _event: &AuditEvent) {}
}
