//! Text wire protocol.
//!
//! Every frame is one line of the form `TYPE|PAYLOAD`; the transport strips
//! and appends the newline. Shots are the exception: a bare `<row>,<col>`.

use core::fmt;
use core::str::FromStr;

use crate::common::ShotOutcome;
use crate::ship::Orientation;

/// Errors produced while parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("malformed {kind} payload {payload:?}")]
    Malformed { kind: &'static str, payload: String },
}

fn malformed(kind: &'static str, payload: &str) -> ProtocolError {
    ProtocolError::Malformed {
        kind,
        payload: payload.to_string(),
    }
}

/// Parse `"<row>,<col>"` into a coordinate pair.
fn parse_coords(kind: &'static str, payload: &str) -> Result<(usize, usize), ProtocolError> {
    let (row, col) = payload
        .split_once(',')
        .ok_or_else(|| malformed(kind, payload))?;
    let row = row.trim().parse().map_err(|_| malformed(kind, payload))?;
    let col = col.trim().parse().map_err(|_| malformed(kind, payload))?;
    Ok((row, col))
}

/// Messages a participant sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `LOGIN|<name>`
    Login { name: String },
    /// `SHIP_POS|<row>,<col>,<H|V>`
    ShipPos {
        row: usize,
        col: usize,
        orientation: Orientation,
    },
    /// `<row>,<col>`
    Shot { row: usize, col: usize },
    /// `QUIT|`
    Quit,
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        let frame = frame.trim();
        if frame.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let Some((kind, payload)) = frame.split_once('|') else {
            let (row, col) = parse_coords("shot", frame)?;
            return Ok(ClientMessage::Shot { row, col });
        };
        match kind {
            "LOGIN" => Ok(ClientMessage::Login {
                name: payload.trim().to_string(),
            }),
            "SHIP_POS" => {
                let bad = || malformed("SHIP_POS", payload);
                let mut parts = payload.split(',').map(str::trim);
                let (Some(row), Some(col), Some(orient), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(bad());
                };
                Ok(ClientMessage::ShipPos {
                    row: row.parse().map_err(|_| bad())?,
                    col: col.parse().map_err(|_| bad())?,
                    orientation: orient.parse().map_err(|_| bad())?,
                })
            }
            "QUIT" => Ok(ClientMessage::Quit),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Login { name } => write!(f, "LOGIN|{}", name),
            ClientMessage::ShipPos {
                row,
                col,
                orientation,
            } => write!(f, "SHIP_POS|{},{},{}", row, col, orientation),
            ClientMessage::Shot { row, col } => write!(f, "{},{}", row, col),
            ClientMessage::Quit => write!(f, "QUIT|"),
        }
    }
}

/// Reason carried by an `ERROR|<reason>` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    InvalidLogin,
    InvalidShipPosition,
    /// Shot coordinate is out of bounds or unparseable.
    InvalidPosition,
    /// Shot at a cell that was already resolved.
    AlreadyShot,
    NotYourTurn,
    UnexpectedMessage,
}

impl ErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorReason::InvalidLogin => "INVALID_LOGIN",
            ErrorReason::InvalidShipPosition => "INVALID_SHIP_POSITION",
            ErrorReason::InvalidPosition => "POSICION_INVALIDA",
            ErrorReason::AlreadyShot => "YA_DISPARASTE_AQUI",
            ErrorReason::NotYourTurn => "NOT_YOUR_TURN",
            ErrorReason::UnexpectedMessage => "UNEXPECTED_MESSAGE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        [
            ErrorReason::InvalidLogin,
            ErrorReason::InvalidShipPosition,
            ErrorReason::InvalidPosition,
            ErrorReason::AlreadyShot,
            ErrorReason::NotYourTurn,
            ErrorReason::UnexpectedMessage,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
    }
}

/// Reason carried by a `GAME_OVER|<reason>` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    YouWin,
    YouLose,
    YouQuit,
    OpponentQuit,
    OpponentDisconnected,
    OpponentTimeout,
    /// The match ended without a winner.
    MatchAborted,
}

impl GameOverReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GameOverReason::YouWin => "YOU_WIN",
            GameOverReason::YouLose => "YOU_LOSE",
            GameOverReason::YouQuit => "YOU_QUIT",
            GameOverReason::OpponentQuit => "OPPONENT_QUIT",
            GameOverReason::OpponentDisconnected => "OPPONENT_DISCONNECTED",
            GameOverReason::OpponentTimeout => "OPPONENT_TIMEOUT",
            GameOverReason::MatchAborted => "MATCH_ABORTED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        [
            GameOverReason::YouWin,
            GameOverReason::YouLose,
            GameOverReason::YouQuit,
            GameOverReason::OpponentQuit,
            GameOverReason::OpponentDisconnected,
            GameOverReason::OpponentTimeout,
            GameOverReason::MatchAborted,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
    }
}

/// Outcome reported to the shooter in a `RESULT|...` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    Hit,
    Miss,
    Sunk,
}

impl ShotResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ShotResult::Hit => "HIT",
            ShotResult::Miss => "MISS",
            ShotResult::Sunk => "SUNK",
        }
    }
}

impl TryFrom<ShotOutcome> for ShotResult {
    type Error = ShotOutcome;

    fn try_from(outcome: ShotOutcome) -> Result<Self, Self::Error> {
        match outcome {
            ShotOutcome::Hit => Ok(ShotResult::Hit),
            ShotOutcome::Miss => Ok(ShotResult::Miss),
            ShotOutcome::Sunk => Ok(ShotResult::Sunk),
            ShotOutcome::AlreadyShot => Err(outcome),
        }
    }
}

/// Messages the server sends to a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    LoginOk,
    Error(ErrorReason),
    PlaceShip { name: String, length: usize },
    /// Carries the whole seconds left before the turn expires.
    YourTurn { seconds: u64 },
    /// Carries the name of the participant holding the turn.
    WaitTurn { opponent: String },
    Result(ShotResult),
    EnemyHit { row: usize, col: usize },
    EnemySunk { row: usize, col: usize },
    EnemyMiss { row: usize, col: usize },
    TurnTimedOut,
    GameOver(GameOverReason),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::LoginOk => write!(f, "LOGIN|OK"),
            ServerMessage::Error(reason) => write!(f, "ERROR|{}", reason.as_str()),
            ServerMessage::PlaceShip { name, length } => {
                write!(f, "PLACE_SHIP|{}|{}", name, length)
            }
            ServerMessage::YourTurn { seconds } => write!(f, "YOUR_TURN|{}", seconds),
            ServerMessage::WaitTurn { opponent } => write!(f, "WAIT_TURN|{}", opponent),
            ServerMessage::Result(result) => write!(f, "RESULT|{}", result.as_str()),
            ServerMessage::EnemyHit { row, col } => write!(f, "ENEMY_HIT|{},{}", row, col),
            ServerMessage::EnemySunk { row, col } => write!(f, "ENEMY_SUNK|{},{}", row, col),
            ServerMessage::EnemyMiss { row, col } => write!(f, "ENEMY_MISS|{},{}", row, col),
            ServerMessage::TurnTimedOut => write!(f, "TURN_END|TIME_OUT"),
            ServerMessage::GameOver(reason) => write!(f, "GAME_OVER|{}", reason.as_str()),
        }
    }
}

/// Client-side parsing, used by the bundled bot.
impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        let frame = frame.trim();
        if frame.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (kind, payload) = frame.split_once('|').unwrap_or((frame, ""));
        let msg = match kind {
            "LOGIN" if payload == "OK" => ServerMessage::LoginOk,
            "ERROR" => ServerMessage::Error(
                ErrorReason::parse(payload).ok_or_else(|| malformed("ERROR", payload))?,
            ),
            "PLACE_SHIP" => {
                let (name, length) = payload
                    .rsplit_once('|')
                    .ok_or_else(|| malformed("PLACE_SHIP", payload))?;
                let length = length
                    .trim()
                    .parse()
                    .map_err(|_| malformed("PLACE_SHIP", payload))?;
                ServerMessage::PlaceShip {
                    name: name.to_string(),
                    length,
                }
            }
            "YOUR_TURN" => ServerMessage::YourTurn {
                seconds: payload
                    .trim()
                    .parse()
                    .map_err(|_| malformed("YOUR_TURN", payload))?,
            },
            "WAIT_TURN" => ServerMessage::WaitTurn {
                opponent: payload.to_string(),
            },
            "RESULT" => ServerMessage::Result(match payload {
                "HIT" => ShotResult::Hit,
                "MISS" => ShotResult::Miss,
                "SUNK" => ShotResult::Sunk,
                _ => return Err(malformed("RESULT", payload)),
            }),
            "ENEMY_HIT" => {
                let (row, col) = parse_coords("ENEMY_HIT", payload)?;
                ServerMessage::EnemyHit { row, col }
            }
            "ENEMY_SUNK" => {
                let (row, col) = parse_coords("ENEMY_SUNK", payload)?;
                ServerMessage::EnemySunk { row, col }
            }
            "ENEMY_MISS" => {
                let (row, col) = parse_coords("ENEMY_MISS", payload)?;
                ServerMessage::EnemyMiss { row, col }
            }
            "TURN_END" if payload == "TIME_OUT" => ServerMessage::TurnTimedOut,
            "GAME_OVER" => ServerMessage::GameOver(
                GameOverReason::parse(payload).ok_or_else(|| malformed("GAME_OVER", payload))?,
            ),
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(msg)
    }
}
