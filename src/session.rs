//! Match worker: one task per match, driving login, fleet placement and the
//! turn loop over two transports.
//!
//! Every wait inside a match goes through [`MatchWorker::next_event`], which
//! races both connections against a deadline. Terminal conditions travel out
//! of any step as `Err(Termination)`, so protocol steps compose with `?`.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};

use crate::audit::{AuditEvent, AuditLog};
use crate::board::Board;
use crate::clock::TurnClock;
use crate::config::{ServerConfig, ShipDef};
use crate::pool::{SessionPool, SlotId, SlotLease};
use crate::protocol::{
    ClientMessage, ErrorReason, GameOverReason, ProtocolError, ServerMessage, ShotResult,
};
use crate::transport::{is_frame_error, Transport};

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticating,
    Placing,
    TurnLoop,
    GameOver,
}

/// Why a match ended. Seats are 0 (first connection) and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    FleetDestroyed { winner: usize },
    Quit { seat: usize },
    Disconnected { seat: usize },
    PlacementTimeout { seat: usize },
    InvalidPlacement { seat: usize },
    /// Too many expired turns in a row.
    TurnTimeouts { seat: usize },
    LoginFailed { seat: usize },
}

impl Termination {
    pub fn code(self) -> &'static str {
        match self {
            Termination::FleetDestroyed { .. } => "FLEET_DESTROYED",
            Termination::Quit { .. } => "QUIT",
            Termination::Disconnected { .. } => "DISCONNECTED",
            Termination::PlacementTimeout { .. } => "PLACEMENT_TIMEOUT",
            Termination::InvalidPlacement { .. } => "INVALID_PLACEMENT",
            Termination::TurnTimeouts { .. } => "TURN_TIMEOUTS",
            Termination::LoginFailed { .. } => "LOGIN_FAILED",
        }
    }

    /// Seat whose action ended the match. For a win this is the loser.
    pub fn offender(self) -> usize {
        match self {
            Termination::FleetDestroyed { winner } => 1 - winner,
            Termination::Quit { seat }
            | Termination::Disconnected { seat }
            | Termination::PlacementTimeout { seat }
            | Termination::InvalidPlacement { seat }
            | Termination::TurnTimeouts { seat }
            | Termination::LoginFailed { seat } => seat,
        }
    }
}

type Step<T> = Result<T, Termination>;

/// One side of a match.
pub struct Participant {
    name: String,
    transport: Box<dyn Transport>,
    board: Board,
    connected: bool,
    fleet_placed: bool,
    missed_deadlines: u32,
}

impl Participant {
    fn new(seat: usize, transport: Box<dyn Transport>) -> Self {
        Self {
            name: format!("player{}", seat + 1),
            transport,
            board: Board::new(),
            connected: true,
            fleet_placed: false,
            missed_deadlines: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn fleet_placed(&self) -> bool {
        self.fleet_placed
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("connected", &self.connected)
            .field("fleet_placed", &self.fleet_placed)
            .finish()
    }
}

/// State of one match, owned by its worker.
#[derive(Debug)]
pub struct Match {
    participants: [Participant; 2],
    current_turn: usize,
    phase: Phase,
    started_at: Instant,
    game_over: Option<Termination>,
}

impl Match {
    fn new(first: Box<dyn Transport>, second: Box<dyn Transport>) -> Self {
        Self {
            participants: [Participant::new(0, first), Participant::new(1, second)],
            current_turn: 0,
            phase: Phase::Authenticating,
            started_at: Instant::now(),
            game_over: None,
        }
    }

    pub fn participant(&self, seat: usize) -> &Participant {
        &self.participants[seat % 2]
    }

    pub fn current_turn(&self) -> usize {
        self.current_turn
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn game_over(&self) -> Option<Termination> {
        self.game_over
    }

    fn names(&self) -> [String; 2] {
        [
            self.participants[0].name.clone(),
            self.participants[1].name.clone(),
        ]
    }
}

/// What the worker woke up for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    Frame { seat: usize, frame: String },
    /// A line that could not be decoded. The connection stays open.
    Malformed { seat: usize },
    Closed { seat: usize },
    DeadlineExpired,
}

/// Summary returned when a match task finishes.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub slot: SlotId,
    pub players: [String; 2],
    pub winner: Option<String>,
    pub termination: Termination,
    pub shots_fired: usize,
    pub duration: Duration,
}

#[derive(Debug)]
enum LoginFault {
    Timeout,
    Closed,
    Invalid,
}

fn valid_name(name: &str, max_len: usize) -> bool {
    !name.is_empty()
        && name.chars().count() <= max_len
        && !name.chars().any(|c| c.is_control() || c == '|')
}

async fn login(p: &mut Participant, limit: Duration, max_len: usize) -> Result<(), LoginFault> {
    let frame = match timeout(limit, p.transport.recv()).await {
        Err(_) => {
            let _ = p
                .transport
                .send_message(&ServerMessage::Error(ErrorReason::InvalidLogin))
                .await;
            return Err(LoginFault::Timeout);
        }
        Ok(Ok(Some(frame))) => frame,
        Ok(Err(e)) if is_frame_error(&e) => {
            debug!("undecodable login frame: {}", e);
            let _ = p
                .transport
                .send_message(&ServerMessage::Error(ErrorReason::InvalidLogin))
                .await;
            return Err(LoginFault::Invalid);
        }
        Ok(Ok(None)) | Ok(Err(_)) => {
            p.connected = false;
            return Err(LoginFault::Closed);
        }
    };
    match frame.parse::<ClientMessage>() {
        Ok(ClientMessage::Login { name }) if valid_name(&name, max_len) => {
            p.name = name;
            if p.transport.send_message(&ServerMessage::LoginOk).await.is_err() {
                p.connected = false;
                return Err(LoginFault::Closed);
            }
            Ok(())
        }
        _ => {
            debug!("rejected login frame {:?}", frame);
            let _ = p
                .transport
                .send_message(&ServerMessage::Error(ErrorReason::InvalidLogin))
                .await;
            Err(LoginFault::Invalid)
        }
    }
}

fn frame_event(seat: usize, received: anyhow::Result<Option<String>>) -> MatchEvent {
    match received {
        Ok(Some(frame)) => MatchEvent::Frame { seat, frame },
        Ok(None) => MatchEvent::Closed { seat },
        Err(e) if is_frame_error(&e) => {
            debug!("seat {} sent an undecodable frame: {}", seat, e);
            MatchEvent::Malformed { seat }
        }
        Err(e) => {
            debug!("read from seat {} failed: {}", seat, e);
            MatchEvent::Closed { seat }
        }
    }
}

/// Drives one match from login to game over.
pub struct MatchWorker {
    lease: SlotLease,
    state: Match,
    config: Arc<ServerConfig>,
    audit: Arc<dyn AuditLog>,
    shots_fired: usize,
}

impl MatchWorker {
    pub fn new(
        lease: SlotLease,
        first: Box<dyn Transport>,
        second: Box<dyn Transport>,
        config: Arc<ServerConfig>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            lease,
            state: Match::new(first, second),
            config,
            audit,
            shots_fired: 0,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.lease.id()
    }

    pub fn state(&self) -> &Match {
        &self.state
    }

    /// Play the match to completion, then close both connections and free
    /// the slot.
    pub async fn run(mut self) -> MatchReport {
        let slot = self.slot();
        debug!("match {} waiting for logins", slot);
        let outcome = async {
            self.authenticate().await?;
            self.place_fleets().await?;
            self.turn_loop().await
        }
        .await;
        let termination = outcome.unwrap_or_else(|t| t);
        let winner = self.conclude(termination).await;

        let MatchWorker {
            lease,
            state,
            shots_fired,
            ..
        } = self;
        lease.release();
        MatchReport {
            slot,
            players: state.names(),
            winner,
            termination,
            shots_fired,
            duration: state.started_at.elapsed(),
        }
    }

    async fn send(&mut self, seat: usize, msg: ServerMessage) -> Step<()> {
        let p = &mut self.state.participants[seat];
        if !p.connected {
            return Err(Termination::Disconnected { seat });
        }
        if let Err(e) = p.transport.send_message(&msg).await {
            debug!("write to {} failed: {}", p.name, e);
            p.connected = false;
            return Err(Termination::Disconnected { seat });
        }
        Ok(())
    }

    /// Wait for a frame from either participant, a closed connection, or
    /// `deadline`, whichever comes first.
    pub async fn next_event(&mut self, deadline: Instant) -> MatchEvent {
        let [a, b] = &mut self.state.participants;
        let (a_live, b_live) = (a.connected, b.connected);
        let event = tokio::select! {
            r = a.transport.recv(), if a_live => frame_event(0, r),
            r = b.transport.recv(), if b_live => frame_event(1, r),
            _ = sleep_until(deadline) => MatchEvent::DeadlineExpired,
        };
        if let MatchEvent::Closed { seat } = event {
            self.state.participants[seat].connected = false;
        }
        event
    }

    /// A frame from the participant who is not expected to act.
    async fn bystander_frame(&mut self, seat: usize, frame: &str) -> Step<()> {
        match frame.parse::<ClientMessage>() {
            Ok(ClientMessage::Quit) => Err(Termination::Quit { seat }),
            _ => {
                debug!("seat {} sent {:?} out of turn", seat, frame);
                self.out_of_turn(seat).await
            }
        }
    }

    async fn out_of_turn(&mut self, seat: usize) -> Step<()> {
        self.send(seat, ServerMessage::Error(ErrorReason::NotYourTurn))
            .await
    }

    async fn authenticate(&mut self) -> Step<()> {
        let limit = self.config.login_timeout;
        let max_len = self.config.max_name_len;
        let [a, b] = &mut self.state.participants;
        let logins = tokio::try_join!(
            async { login(a, limit, max_len).await.map_err(|fault| (0, fault)) },
            async { login(b, limit, max_len).await.map_err(|fault| (1, fault)) },
        );
        if let Err((seat, fault)) = logins {
            warn!(
                "match {}: login failed for seat {} ({:?})",
                self.lease.id(),
                seat,
                fault
            );
            return Err(Termination::LoginFailed { seat });
        }
        info!(
            "match {} started: {} vs {}",
            self.lease.id(),
            self.state.participants[0].name,
            self.state.participants[1].name
        );
        self.audit.record(&AuditEvent::MatchStarted {
            slot: self.lease.id(),
            players: self.state.names(),
        });
        Ok(())
    }

    async fn place_fleets(&mut self) -> Step<()> {
        self.state.phase = Phase::Placing;
        let config = Arc::clone(&self.config);
        for seat in 0..2 {
            for def in config.fleet.ships() {
                self.place_ship(seat, def).await?;
            }
            let p = &mut self.state.participants[seat];
            p.fleet_placed = true;
            debug!("{} placed {} ships", p.name, p.board.ships().len());
            self.audit.record(&AuditEvent::FleetPlaced {
                slot: self.lease.id(),
                player: p.name.clone(),
                board: p.board.render(true),
            });
        }
        Ok(())
    }

    async fn place_ship(&mut self, seat: usize, def: &ShipDef) -> Step<()> {
        self.send(
            seat,
            ServerMessage::PlaceShip {
                name: def.name().to_string(),
                length: def.length(),
            },
        )
        .await?;
        let deadline = Instant::now() + self.config.placement_timeout;
        loop {
            let frame = match self.next_event(deadline).await {
                MatchEvent::DeadlineExpired => {
                    warn!(
                        "{} did not place {} in time",
                        self.state.participants[seat].name,
                        def.name()
                    );
                    return Err(Termination::PlacementTimeout { seat });
                }
                MatchEvent::Closed { seat } => return Err(Termination::Disconnected { seat }),
                MatchEvent::Frame { seat: other, frame } if other != seat => {
                    self.bystander_frame(other, &frame).await?;
                    continue;
                }
                MatchEvent::Malformed { seat: other } if other != seat => {
                    self.out_of_turn(other).await?;
                    continue;
                }
                MatchEvent::Malformed { .. } => {
                    self.send(seat, ServerMessage::Error(ErrorReason::InvalidShipPosition))
                        .await?;
                    return Err(Termination::InvalidPlacement { seat });
                }
                MatchEvent::Frame { frame, .. } => frame,
            };
            let placed = match frame.parse::<ClientMessage>() {
                Ok(ClientMessage::Quit) => return Err(Termination::Quit { seat }),
                Ok(ClientMessage::ShipPos {
                    row,
                    col,
                    orientation,
                }) => self.state.participants[seat].board.place_ship(
                    def.name(),
                    def.length(),
                    row,
                    col,
                    orientation,
                ),
                _ => {
                    debug!("unexpected placement frame {:?}", frame);
                    self.send(seat, ServerMessage::Error(ErrorReason::InvalidShipPosition))
                        .await?;
                    return Err(Termination::InvalidPlacement { seat });
                }
            };
            return match placed {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!(
                        "{} placed {} illegally: {}",
                        self.state.participants[seat].name,
                        def.name(),
                        e
                    );
                    self.send(seat, ServerMessage::Error(ErrorReason::InvalidShipPosition))
                        .await?;
                    Err(Termination::InvalidPlacement { seat })
                }
            };
        }
    }

    /// Alternate shots until a fleet is destroyed. `Ok` carries the win.
    async fn turn_loop(&mut self) -> Step<Termination> {
        self.state.phase = Phase::TurnLoop;
        self.state.current_turn = 0;
        let mut clock = TurnClock::start(self.config.turn_timeout);
        self.announce_turn(&clock).await?;
        loop {
            let shooter = self.state.current_turn;
            match self.next_event(clock.deadline()).await {
                MatchEvent::DeadlineExpired => self.expire_turn(&mut clock).await?,
                MatchEvent::Closed { seat } => return Err(Termination::Disconnected { seat }),
                MatchEvent::Frame { seat, frame } if seat != shooter => {
                    self.bystander_frame(seat, &frame).await?
                }
                MatchEvent::Malformed { seat } if seat != shooter => self.out_of_turn(seat).await?,
                MatchEvent::Malformed { .. } => {
                    self.reject(ErrorReason::InvalidPosition, &clock).await?
                }
                MatchEvent::Frame { frame, .. } => {
                    if let Some(win) = self.take_shot(&frame, &mut clock).await? {
                        return Ok(win);
                    }
                }
            }
        }
    }

    async fn announce_turn(&mut self, clock: &TurnClock) -> Step<()> {
        let shooter = self.state.current_turn;
        self.send(
            shooter,
            ServerMessage::YourTurn {
                seconds: clock.remaining_secs(),
            },
        )
        .await?;
        let opponent = self.state.participants[shooter].name.clone();
        self.send(1 - shooter, ServerMessage::WaitTurn { opponent })
            .await
    }

    /// Refuse the shooter's frame and re-prompt with the time still left.
    async fn reject(&mut self, reason: ErrorReason, clock: &TurnClock) -> Step<()> {
        let shooter = self.state.current_turn;
        self.send(shooter, ServerMessage::Error(reason)).await?;
        self.send(
            shooter,
            ServerMessage::YourTurn {
                seconds: clock.remaining_secs(),
            },
        )
        .await
    }

    async fn pass_turn(&mut self, clock: &mut TurnClock) -> Step<()> {
        self.state.current_turn = 1 - self.state.current_turn;
        clock.rearm();
        self.announce_turn(clock).await
    }

    async fn expire_turn(&mut self, clock: &mut TurnClock) -> Step<()> {
        let seat = self.state.current_turn;
        self.send(seat, ServerMessage::TurnTimedOut).await?;
        let p = &mut self.state.participants[seat];
        p.missed_deadlines += 1;
        info!("{} ran out of time ({} in a row)", p.name, p.missed_deadlines);
        self.audit.record(&AuditEvent::TurnTimedOut {
            slot: self.lease.id(),
            player: p.name.clone(),
        });
        if let Some(limit) = self.config.max_consecutive_timeouts {
            if p.missed_deadlines >= limit {
                return Err(Termination::TurnTimeouts { seat });
            }
        }
        self.pass_turn(clock).await
    }

    /// Resolve one frame from the shooter. Returns the win if it ends the match.
    async fn take_shot(&mut self, frame: &str, clock: &mut TurnClock) -> Step<Option<Termination>> {
        let shooter = self.state.current_turn;
        let target = 1 - shooter;
        let (row, col) = match frame.parse::<ClientMessage>() {
            Ok(ClientMessage::Shot { row, col }) => (row, col),
            Ok(ClientMessage::Quit) => return Err(Termination::Quit { seat: shooter }),
            Ok(ClientMessage::Login { .. } | ClientMessage::ShipPos { .. })
            | Err(ProtocolError::UnknownType(_)) => {
                self.reject(ErrorReason::UnexpectedMessage, clock).await?;
                return Ok(None);
            }
            Err(e) => {
                debug!("bad shot {:?}: {}", frame, e);
                self.reject(ErrorReason::InvalidPosition, clock).await?;
                return Ok(None);
            }
        };

        let outcome = match self.state.participants[target].board.apply_shot(row, col) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("bad shot {:?}: {}", frame, e);
                self.reject(ErrorReason::InvalidPosition, clock).await?;
                return Ok(None);
            }
        };
        self.audit.record(&AuditEvent::ShotFired {
            slot: self.lease.id(),
            shooter: self.state.participants[shooter].name.clone(),
            row,
            col,
            outcome,
        });
        let Ok(result) = ShotResult::try_from(outcome) else {
            self.reject(ErrorReason::AlreadyShot, clock).await?;
            return Ok(None);
        };

        self.shots_fired += 1;
        self.state.participants[shooter].missed_deadlines = 0;
        self.send(shooter, ServerMessage::Result(result)).await?;
        let notice = match result {
            ShotResult::Miss => ServerMessage::EnemyMiss { row, col },
            ShotResult::Hit => ServerMessage::EnemyHit { row, col },
            ShotResult::Sunk => ServerMessage::EnemySunk { row, col },
        };
        self.send(target, notice).await?;

        if result == ShotResult::Miss {
            self.pass_turn(clock).await?;
            return Ok(None);
        }
        if self.state.participants[target].board.is_fleet_destroyed() {
            return Ok(Some(Termination::FleetDestroyed { winner: shooter }));
        }
        clock.rearm();
        self.announce_turn(clock).await?;
        Ok(None)
    }

    /// Tell both sides how the match ended, close the connections and write
    /// the final audit record. Returns the winner's name.
    async fn conclude(&mut self, termination: Termination) -> Option<String> {
        self.state.phase = Phase::GameOver;
        self.state.game_over = Some(termination);
        let offender = termination.offender();
        let other = 1 - offender;

        // a forfeit only produces a winner once that side had a full fleet down
        let winner = match termination {
            Termination::FleetDestroyed { winner } => Some(winner),
            Termination::LoginFailed { .. } => None,
            _ if self.state.participants[other].fleet_placed => Some(other),
            _ => None,
        };
        let lost_or_aborted = if winner.is_some() {
            GameOverReason::YouLose
        } else {
            GameOverReason::MatchAborted
        };
        let (to_offender, to_other) = match termination {
            Termination::FleetDestroyed { .. } => {
                (Some(GameOverReason::YouLose), GameOverReason::YouWin)
            }
            Termination::Quit { .. } => (Some(GameOverReason::YouQuit), GameOverReason::OpponentQuit),
            Termination::Disconnected { .. } => (None, GameOverReason::OpponentDisconnected),
            Termination::PlacementTimeout { .. } | Termination::TurnTimeouts { .. } => {
                (Some(lost_or_aborted), GameOverReason::OpponentTimeout)
            }
            Termination::InvalidPlacement { .. } => (
                Some(lost_or_aborted),
                if winner.is_some() {
                    GameOverReason::YouWin
                } else {
                    GameOverReason::MatchAborted
                },
            ),
            Termination::LoginFailed { .. } => (None, GameOverReason::MatchAborted),
        };

        if let Some(reason) = to_offender {
            let _ = self.send(offender, ServerMessage::GameOver(reason)).await;
        }
        let _ = self.send(other, ServerMessage::GameOver(to_other)).await;
        for p in self.state.participants.iter_mut() {
            if let Err(e) = p.transport.close().await {
                debug!("closing {} failed: {}", p.name, e);
            }
            p.connected = false;
        }

        let winner_name = winner.map(|seat| self.state.participants[seat].name.clone());
        let slot = self.lease.id();
        match termination {
            Termination::LoginFailed { .. } => {
                info!("match {} aborted before login completed", slot);
            }
            _ => {
                let loser = winner.map(|seat| self.state.participants[1 - seat].name.clone());
                info!(
                    "match {} over ({}): winner {}",
                    slot,
                    termination.code(),
                    winner_name.as_deref().unwrap_or("none")
                );
                self.audit.record(&AuditEvent::MatchEnded {
                    slot,
                    winner: winner_name.clone(),
                    loser,
                    reason: termination.code(),
                });
            }
        }
        winner_name
    }
}

/// Returned by [`spawn_match`] when every slot is taken. Hands both
/// connections back so the caller can retry.
#[derive(thiserror::Error)]
#[error("no session slot available")]
pub struct NoSlotAvailable {
    pub first: Box<dyn Transport>,
    pub second: Box<dyn Transport>,
}

impl NoSlotAvailable {
    pub fn into_transports(self) -> (Box<dyn Transport>, Box<dyn Transport>) {
        (self.first, self.second)
    }
}

impl fmt::Debug for NoSlotAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoSlotAvailable")
    }
}

/// Claim a slot and run a match between `first` and `second` on its own task.
pub fn spawn_match(
    pool: &Arc<SessionPool>,
    first: Box<dyn Transport>,
    second: Box<dyn Transport>,
    config: Arc<ServerConfig>,
    audit: Arc<dyn AuditLog>,
) -> Result<JoinHandle<MatchReport>, NoSlotAvailable> {
    let Some(lease) = pool.lease() else {
        return Err(NoSlotAvailable { first, second });
    };
    let worker = MatchWorker::new(lease, first, second, config, audit);
    Ok(tokio::spawn(worker.run()))
}
