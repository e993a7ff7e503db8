//! Ship placement geometry and hit tracking.

use core::fmt;
use core::str::FromStr;

use crate::common::BoardError;
use crate::config::{BOARD_SIZE, MAX_SHIP_LENGTH};

/// Orientation of a ship on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// Wire letter: `H` or `V`.
    pub fn as_char(self) -> char {
        match self {
            Orientation::Horizontal => 'H',
            Orientation::Vertical => 'V',
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H" => Ok(Orientation::Horizontal),
            "V" => Ok(Orientation::Vertical),
            other => Err(format!("invalid orientation {:?}", other)),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Cells a ship of `length` would cover starting at (`row`, `col`).
///
/// Fails with [`BoardError::ShipOutOfBounds`] if any cell falls outside the
/// grid.
pub fn project(
    length: usize,
    row: usize,
    col: usize,
    orientation: Orientation,
) -> Result<Vec<(usize, usize)>, BoardError> {
    if length == 0 || length > MAX_SHIP_LENGTH {
        return Err(BoardError::InvalidLength(length));
    }
    let fits = match orientation {
        Orientation::Horizontal => row < BOARD_SIZE && col + length <= BOARD_SIZE,
        Orientation::Vertical => col < BOARD_SIZE && row + length <= BOARD_SIZE,
    };
    if !fits {
        return Err(BoardError::ShipOutOfBounds);
    }
    Ok((0..length)
        .map(|i| match orientation {
            Orientation::Horizontal => (row, col + i),
            Orientation::Vertical => (row + i, col),
        })
        .collect())
}

/// A ship placed on a board.
#[derive(Clone, PartialEq, Eq)]
pub struct Ship {
    name: String,
    orientation: Orientation,
    cells: Vec<(usize, usize)>,
    hits: usize,
}

impl Ship {
    /// Place a ship at (`row`, `col`) with `orientation`.
    pub fn new(
        name: impl Into<String>,
        length: usize,
        row: usize,
        col: usize,
        orientation: Orientation,
    ) -> Result<Self, BoardError> {
        let cells = project(length, row, col, orientation)?;
        Ok(Ship {
            name: name.into(),
            orientation,
            cells,
            hits: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> usize {
        self.cells.len()
    }

    /// Occupied cells, ordered from the origin outwards.
    pub fn cells(&self) -> &[(usize, usize)] {
        &self.cells
    }

    pub fn origin(&self) -> (usize, usize) {
        self.cells[0]
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn occupies(&self, row: usize, col: usize) -> bool {
        self.cells.contains(&(row, col))
    }

    /// Check if the ship is sunk (all segments hit).
    pub fn is_sunk(&self) -> bool {
        self.hits == self.cells.len()
    }

    /// Count one more hit. The board guarantees each cell is hit at most once.
    pub(crate) fn record_hit(&mut self) {
        self.hits = (self.hits + 1).min(self.cells.len());
    }
}

impl fmt::Debug for Ship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (row, col) = self.origin();
        write!(
            f,
            "Ship {{ name: {:?}, origin: ({}, {}), orientation: {:?}, length: {}, hits: {} }}",
            self.name,
            row,
            col,
            self.orientation,
            self.length(),
            self.hits,
        )
    }
}
