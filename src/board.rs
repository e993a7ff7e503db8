//! A participant's grid and fleet: placement validation, shot resolution and
//! sunk/win detection.

use core::fmt;
use rand::Rng;

use crate::common::{BoardError, ShotOutcome};
use crate::config::BOARD_SIZE;
use crate::ship::{project, Orientation, Ship};

/// State of a single grid cell. Transitions only move forward:
/// `Water -> Occupied -> Hit -> Sunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Water,
    Occupied,
    Hit,
    Sunk,
}

impl CellState {
    /// Diagnostic symbol. Ships are only drawn in the owner's view.
    pub fn symbol(self, own_view: bool) -> char {
        match self {
            CellState::Water => '~',
            CellState::Occupied if own_view => 'O',
            CellState::Occupied => '~',
            CellState::Hit => 'X',
            CellState::Sunk => '#',
        }
    }
}

type Grid<T> = [[T; BOARD_SIZE]; BOARD_SIZE];

/// Grid plus the ships placed on it.
#[derive(Clone)]
pub struct Board {
    grid: Grid<CellState>,
    // water that has already been fired on; the cell itself stays `Water`
    misses: Grid<bool>,
    ships: Vec<Ship>,
}

impl Board {
    /// Create an empty board (all water, no ships).
    pub fn new() -> Self {
        Board {
            grid: [[CellState::Water; BOARD_SIZE]; BOARD_SIZE],
            misses: [[false; BOARD_SIZE]; BOARD_SIZE],
            ships: Vec::new(),
        }
    }

    /// Reset every cell to water and forget all ships.
    pub fn init_grid(&mut self) {
        *self = Board::new();
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    /// State of (`row`, `col`), or `None` if out of bounds.
    pub fn cell(&self, row: usize, col: usize) -> Option<CellState> {
        self.grid.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Number of cells currently in `state`.
    pub fn count(&self, state: CellState) -> usize {
        self.grid.iter().flatten().filter(|&&c| c == state).count()
    }

    /// Place a ship of `length` at (`row`, `col`).
    ///
    /// Nothing changes unless every projected cell is in bounds and water.
    pub fn place_ship(
        &mut self,
        name: &str,
        length: usize,
        row: usize,
        col: usize,
        orientation: Orientation,
    ) -> Result<(), BoardError> {
        let cells = project(length, row, col, orientation)?;
        if cells
            .iter()
            .any(|&(r, c)| self.grid[r][c] != CellState::Water)
        {
            return Err(BoardError::ShipOverlaps);
        }
        for &(r, c) in &cells {
            self.grid[r][c] = CellState::Occupied;
        }
        self.ships.push(Ship::new(name, length, row, col, orientation)?);
        Ok(())
    }

    /// Returns a random legal (row, col, orientation) for a ship of `length`.
    pub fn random_placement<R: Rng>(
        &self,
        rng: &mut R,
        length: usize,
    ) -> Result<(usize, usize, Orientation), BoardError> {
        if length == 0 || length > BOARD_SIZE {
            return Err(BoardError::InvalidLength(length));
        }
        for _ in 0..100 {
            let orient = if rng.random() {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let (max_r, max_c) = match orient {
                Orientation::Horizontal => (BOARD_SIZE - 1, BOARD_SIZE - length),
                Orientation::Vertical => (BOARD_SIZE - length, BOARD_SIZE - 1),
            };
            let r = rng.random_range(0..=max_r);
            let c = rng.random_range(0..=max_c);
            let cells = project(length, r, c, orient)?;
            if cells
                .iter()
                .all(|&(r, c)| self.grid[r][c] == CellState::Water)
            {
                return Ok((r, c, orient));
            }
        }
        Err(BoardError::UnableToPlaceShip)
    }

    /// Resolve a shot at (`row`, `col`).
    ///
    /// Repeating a shot on a resolved cell returns
    /// [`ShotOutcome::AlreadyShot`] and changes nothing.
    pub fn apply_shot(&mut self, row: usize, col: usize) -> Result<ShotOutcome, BoardError> {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Err(BoardError::OutOfBounds { row, col });
        }
        match self.grid[row][col] {
            CellState::Hit | CellState::Sunk => Ok(ShotOutcome::AlreadyShot),
            CellState::Water if self.misses[row][col] => Ok(ShotOutcome::AlreadyShot),
            CellState::Water => {
                self.misses[row][col] = true;
                Ok(ShotOutcome::Miss)
            }
            CellState::Occupied => {
                self.grid[row][col] = CellState::Hit;
                let Some(ship) = self.ships.iter_mut().find(|s| s.occupies(row, col)) else {
                    // an occupied cell always belongs to a placed ship
                    return Ok(ShotOutcome::Hit);
                };
                ship.record_hit();
                if !ship.is_sunk() {
                    return Ok(ShotOutcome::Hit);
                }
                for &(r, c) in ship.cells() {
                    self.grid[r][c] = CellState::Sunk;
                }
                Ok(ShotOutcome::Sunk)
            }
        }
    }

    /// Returns `true` when every ship has been sunk.
    pub fn is_fleet_destroyed(&self) -> bool {
        self.ships.iter().all(Ship::is_sunk)
    }

    /// Text grid with row and column headers, one row per line.
    pub fn render(&self, own_view: bool) -> String {
        let mut out = String::from(" ");
        for c in 0..BOARD_SIZE {
            out.push_str(&format!(" {}", c));
        }
        for (r, row) in self.grid.iter().enumerate() {
            out.push_str(&format!("\n{}", r));
            for cell in row {
                out.push(' ');
                out.push(cell.symbol(own_view));
            }
        }
        out
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board {{\n  ships: {:?},\n  grid:", self.ships)?;
        for line in self.render(true).lines() {
            writeln!(f, "    {}", line)?;
        }
        write!(f, "}}")
    }
}
