//! Server configuration and the fleet manifest.
//!
//! Everything a match needs to know about its rules lives in [`ServerConfig`]:
//! timeouts, name limits and the list of ships each participant must place.
//! The config can be built in code with the `with_*` methods or loaded from
//! JSON with [`ServerConfig::from_json_file`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Width and height of every grid.
pub const BOARD_SIZE: usize = 10;

/// Longest ship the board model accepts.
pub const MAX_SHIP_LENGTH: usize = 5;

/// Errors returned by [`ServerConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_sessions must be greater than 0")]
    NoSessions,
    #[error("{0} must be greater than 0")]
    ZeroTimeout(&'static str),
    #[error("max_name_len must be greater than 0")]
    ZeroNameLength,
    #[error("fleet manifest is empty")]
    EmptyFleet,
    #[error("ship {name:?} has invalid length {length} (expected 1..={max})")]
    InvalidShipLength {
        name: String,
        length: usize,
        max: usize,
    },
    #[error("ship name {0:?} is empty or contains a reserved character")]
    InvalidShipName(String),
    #[error("fleet needs {cells} cells but the board only has {capacity}")]
    FleetTooLarge { cells: usize, capacity: usize },
}

/// A ship every participant has to place: name and length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipDef {
    name: String,
    length: usize,
}

impl ShipDef {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// Ordered list of ships placed once per participant per match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FleetManifest {
    ships: Vec<ShipDef>,
}

impl FleetManifest {
    pub fn new(ships: Vec<ShipDef>) -> Self {
        Self { ships }
    }

    /// One carrier, one battleship, two cruisers, two destroyers and three
    /// submarines.
    pub fn standard() -> Self {
        Self::new(vec![
            ShipDef::new("Carrier", 5),
            ShipDef::new("Battleship", 4),
            ShipDef::new("Cruiser 1", 3),
            ShipDef::new("Cruiser 2", 3),
            ShipDef::new("Destroyer 1", 2),
            ShipDef::new("Destroyer 2", 2),
            ShipDef::new("Submarine 1", 1),
            ShipDef::new("Submarine 2", 1),
            ShipDef::new("Submarine 3", 1),
        ])
    }

    pub fn ships(&self) -> &[ShipDef] {
        &self.ships
    }

    pub fn len(&self) -> usize {
        self.ships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ships.is_empty()
    }

    /// Total number of cells the fleet occupies once placed.
    pub fn total_cells(&self) -> usize {
        self.ships.iter().map(ShipDef::length).sum()
    }

    /// Look up a ship definition by name.
    pub fn find(&self, name: &str) -> Option<&ShipDef> {
        self.ships.iter().find(|def| def.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ships.is_empty() {
            return Err(ConfigError::EmptyFleet);
        }
        for def in &self.ships {
            // '|' would split the PLACE_SHIP frame
            if def.name.trim().is_empty() || def.name.contains(['|', '\n', '\r']) {
                return Err(ConfigError::InvalidShipName(def.name.clone()));
            }
            if def.length == 0 || def.length > MAX_SHIP_LENGTH {
                return Err(ConfigError::InvalidShipLength {
                    name: def.name.clone(),
                    length: def.length,
                    max: MAX_SHIP_LENGTH,
                });
            }
        }
        let capacity = BOARD_SIZE * BOARD_SIZE;
        let cells = self.total_cells();
        if cells > capacity {
            return Err(ConfigError::FleetTooLarge { cells, capacity });
        }
        Ok(())
    }
}

impl Default for FleetManifest {
    fn default() -> Self {
        Self::standard()
    }
}

/// Runtime configuration for the server and every match it hosts.
///
/// ```
/// use battleship_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_sessions(4)
///     .with_turn_timeout(Duration::from_secs(15));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the acceptor listens on.
    pub bind_address: String,

    /// Number of session slots, fixed for the lifetime of the pool.
    pub max_sessions: usize,

    /// Time a participant has to fire once their turn begins.
    #[serde(with = "duration_secs")]
    pub turn_timeout: Duration,

    /// Time a participant has to answer each `PLACE_SHIP` prompt.
    #[serde(with = "duration_secs")]
    pub placement_timeout: Duration,

    /// Time a fresh connection has to send its `LOGIN` frame.
    #[serde(with = "duration_secs")]
    pub login_timeout: Duration,

    /// Upper bound for writing a single frame to a TCP peer.
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,

    /// Delay between attempts to claim a slot while the pool is full.
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,

    /// Longest accepted participant name, in characters.
    pub max_name_len: usize,

    /// Longest accepted inbound frame, in bytes.
    pub max_frame_len: usize,

    /// Forfeit a participant after this many expired turns in a row.
    ///
    /// `None` keeps expiry a plain turn pass no matter how often it happens.
    pub max_consecutive_timeouts: Option<u32>,

    /// Audit trail file. `None` disables the file log.
    pub audit_log: Option<PathBuf>,

    /// Ships each participant places, in prompt order.
    pub fleet: FleetManifest,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_sessions: 10,
            turn_timeout: Duration::from_secs(30),
            placement_timeout: Duration::from_secs(30),
            login_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(1),
            max_name_len: 49,
            max_frame_len: 1024,
            max_consecutive_timeouts: None,
            audit_log: Some(PathBuf::from("game_log.txt")),
            fleet: FleetManifest::standard(),
        }
    }
}

impl ServerConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {}", path.display(), e))?;
        let config: ServerConfig = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_placement_timeout(mut self, timeout: Duration) -> Self {
        self.placement_timeout = timeout;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_consecutive_timeouts(mut self, limit: Option<u32>) -> Self {
        self.max_consecutive_timeouts = limit;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn with_audit_log(mut self, path: Option<PathBuf>) -> Self {
        self.audit_log = path;
        self
    }

    pub fn with_fleet(mut self, fleet: FleetManifest) -> Self {
        self.fleet = fleet;
        self
    }

    /// Check the configuration for values a match cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::NoSessions);
        }
        for (name, value) in [
            ("turn_timeout", self.turn_timeout),
            ("placement_timeout", self.placement_timeout),
            ("login_timeout", self.login_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        if self.max_name_len == 0 {
            return Err(ConfigError::ZeroNameLength);
        }
        self.fleet.validate()
    }
}

/// Durations as (fractional) seconds in config files.
mod duration_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
