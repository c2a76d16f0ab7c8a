use thiserror::Error;

/// Caller misuse. Gameplay outcomes such as hitting a mine are reported
/// through [`crate::Outcome`], never through this type.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Coordinates ({row}, {col}) are outside the board")]
    OutOfBounds { row: i32, col: i32 },
    #[error("Board must have at least one cell")]
    EmptyBoard,
    #[error("Board of {width}x{height} exceeds {max} cells", max = crate::MAX_CELLS)]
    BoardTooLarge { width: usize, height: usize },
    #[error("Too many mines: {mines} requested but the board has {cells} cells")]
    TooManyMines { mines: usize, cells: usize },
    #[error("Mine listed twice at ({row}, {col})")]
    DuplicateMine { row: i32, col: i32 },
}

pub type Result<T> = std::result::Result<T, EngineError>;
