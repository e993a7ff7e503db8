//! Reference client that plays a whole match with random moves.

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::board::Board;
use crate::config::BOARD_SIZE;
use crate::protocol::{ClientMessage, ErrorReason, GameOverReason, ServerMessage};
use crate::transport::Transport;

/// Places each prompted ship at a random legal spot and fires at random
/// cells it has not tried yet.
pub struct RandomBot {
    name: String,
    rng: SmallRng,
    fleet: Board,
    targets: Vec<(usize, usize)>,
    shots_fired: usize,
}

impl RandomBot {
    /// `seed` fixes every placement and shot for reproducible games.
    pub fn new(name: impl Into<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => {
                let mut seed_rng = rand::rng();
                SmallRng::from_rng(&mut seed_rng)
            }
        };
        Self {
            name: name.into(),
            rng,
            fleet: Board::new(),
            targets: (0..BOARD_SIZE)
                .flat_map(|r| (0..BOARD_SIZE).map(move |c| (r, c)))
                .collect(),
            shots_fired: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bot's own board as placed so far.
    pub fn fleet(&self) -> &Board {
        &self.fleet
    }

    pub fn shots_fired(&self) -> usize {
        self.shots_fired
    }

    /// Play until the server ends the match and return its verdict.
    pub async fn play<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> anyhow::Result<GameOverReason> {
        let login = ClientMessage::Login {
            name: self.name.clone(),
        };
        transport.send(&login.to_string()).await?;
        loop {
            let Some(frame) = transport.recv().await? else {
                anyhow::bail!("Server closed the connection before GAME_OVER");
            };
            let msg: ServerMessage = frame
                .parse()
                .map_err(|e| anyhow::anyhow!("Bad frame {:?}: {}", frame, e))?;
            match msg {
                ServerMessage::GameOver(reason) => {
                    info!("{}: game over ({})", self.name, reason.as_str());
                    return Ok(reason);
                }
                ServerMessage::Error(ErrorReason::InvalidLogin) => {
                    anyhow::bail!("Login rejected for {:?}", self.name)
                }
                ServerMessage::PlaceShip { name, length } => {
                    let (row, col, orientation) =
                        self.fleet.random_placement(&mut self.rng, length)?;
                    self.fleet
                        .place_ship(&name, length, row, col, orientation)?;
                    let reply = ClientMessage::ShipPos {
                        row,
                        col,
                        orientation,
                    };
                    transport.send(&reply.to_string()).await?;
                }
                ServerMessage::YourTurn { .. } => {
                    let reply = self.next_shot();
                    transport.send(&reply.to_string()).await?;
                }
                other => debug!("{}: {}", self.name, other),
            }
        }
    }

    fn next_shot(&mut self) -> ClientMessage {
        if self.targets.is_empty() {
            return ClientMessage::Quit;
        }
        let i = self.rng.random_range(0..self.targets.len());
        let (row, col) = self.targets.swap_remove(i);
        self.shots_fired += 1;
        ClientMessage::Shot { row, col }
    }
}
