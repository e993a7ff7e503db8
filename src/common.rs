//! Common types for the board model: shot outcomes and board errors.

/// Result of applying a shot to a fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    /// Shot landed on water.
    Miss,
    /// Shot hit a ship that still has intact segments.
    Hit,
    /// Shot hit the last intact segment of a ship.
    Sunk,
    /// The cell was already resolved; nothing changed.
    AlreadyShot,
}

/// Errors returned by board operations. A failed operation never mutates the
/// board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Row or column is outside the grid.
    #[error("coordinate ({row}, {col}) is out of bounds")]
    OutOfBounds { row: usize, col: usize },
    /// Ship would extend past the edge of the grid.
    #[error("ship placement is out of bounds")]
    ShipOutOfBounds,
    /// Ship placement overlaps another ship.
    #[error("ship placement overlaps with another ship")]
    ShipOverlaps,
    /// Ship length outside `1..=MAX_SHIP_LENGTH`.
    #[error("invalid ship length {0}")]
    InvalidLength(usize),
    /// Unable to find a random placement.
    #[error("unable to place ship")]
    UnableToPlaceShip,
}
