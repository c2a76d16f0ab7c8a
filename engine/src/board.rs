use followsweeper_common::models::{self, AvatarRecord, Pos};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::{EngineError, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Cell {
    pub is_mine: bool,
    pub is_revealed: bool,
    pub is_flagged: bool,
    pub adjacent_mines: u8,
    /// Only ever set on mines.
    pub avatar: Option<AvatarRecord>,
}

impl From<&Cell> for models::Cell {
    fn from(value: &Cell) -> Self {
        match value {
            Cell {
                is_revealed: true,
                is_mine: true,
                avatar,
                ..
            } => Self::Mine {
                avatar: avatar.clone(),
            },
            Cell {
                is_revealed: true,
                adjacent_mines,
                ..
            } => Self::Revealed {
                adjacent: *adjacent_mines,
            },
            Cell {
                is_flagged: true, ..
            } => Self::Flagged,
            _ => Self::Hidden,
        }
    }
}

const DISPLACEMENTS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Largest board accepted, counted in cells. Keeps every coordinate within
/// `i32` and bounds the allocation a request can cause.
pub const MAX_CELLS: usize = 64 * 64;

/// Row-major grid of cells plus the layout bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Board {
    width: usize,
    height: usize,
    mine_count: usize,
    mines_placed: bool,
    cells: Vec<Cell>,
}

impl Board {
    pub(crate) fn new(width: usize, height: usize, mine_count: usize) -> Result<Self> {
        let total = width
            .checked_mul(height)
            .filter(|&total| total > 0)
            .ok_or(EngineError::EmptyBoard)?;

        if total > MAX_CELLS {
            return Err(EngineError::BoardTooLarge { width, height });
        }

        if mine_count >= total {
            return Err(EngineError::TooManyMines {
                mines: mine_count,
                cells: total,
            });
        }

        Ok(Self {
            width,
            height,
            mine_count,
            mines_placed: false,
            cells: vec![Cell::default(); total],
        })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn mine_count(&self) -> usize {
        self.mine_count
    }

    pub(crate) fn mines_placed(&self) -> bool {
        self.mines_placed
    }

    pub(crate) fn safe_cell_count(&self) -> usize {
        self.cells.len() - self.mine_count
    }

    pub(crate) fn index_of(&self, pos: Pos) -> Result<usize> {
        let out_of_bounds = EngineError::OutOfBounds {
            row: pos.row,
            col: pos.col,
        };
        let row = usize::try_from(pos.row).map_err(|_| out_of_bounds)?;
        let col = usize::try_from(pos.col).map_err(|_| out_of_bounds)?;

        if row < self.height && col < self.width {
            Ok(row * self.width + col)
        } else {
            Err(out_of_bounds)
        }
    }

    pub(crate) fn pos_of(&self, index: usize) -> Pos {
        // Board dimensions come from `usize` params but positions travel as
        // `i32`; boards that large are not playable anyway.
        Pos::new((index / self.width) as i32, (index % self.width) as i32)
    }

    pub(crate) fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub(crate) fn cell_mut(&mut self, index: usize) -> &mut Cell {
        &mut self.cells[index]
    }

    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width)
    }

    /// In-bounds Moore neighbourhood of `index`, without wrapping.
    pub(crate) fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + use<> {
        let (width, height) = (self.width, self.height);
        let row = (index / width) as isize;
        let col = (index % width) as isize;

        DISPLACEMENTS.into_iter().filter_map(move |(dr, dc)| {
            let r = row + dr;
            let c = col + dc;
            (r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width)
                .then(|| r as usize * width + c as usize)
        })
    }

    /// Places `mine_count` mines uniformly at random, never on `safe`.
    ///
    /// Plain reject-and-resample: the board always has more cells than mines
    /// so this terminates. The i-th mine placed gets the i-th avatar.
    pub(crate) fn place_random_mines<R: Rng>(
        &mut self,
        safe: usize,
        avatars: &[AvatarRecord],
        rng: &mut R,
    ) {
        let mut placed = 0;
        while placed < self.mine_count {
            let row = rng.random_range(0..self.height);
            let col = rng.random_range(0..self.width);
            let index = row * self.width + col;

            if index == safe || self.cells[index].is_mine {
                continue;
            }

            let cell = &mut self.cells[index];
            cell.is_mine = true;
            cell.avatar = avatars.get(placed).cloned();
            placed += 1;
        }

        debug!(
            "Placed {} mines around safe cell {}, {} carry avatars",
            placed,
            self.pos_of(safe),
            placed.min(avatars.len())
        );
        self.finish_layout();
    }

    /// Places mines at exactly the given cells, avatars in the same order.
    pub(crate) fn place_mines_at(&mut self, mines: &[usize], avatars: &[AvatarRecord]) -> Result<()> {
        for (i, &index) in mines.iter().enumerate() {
            if self.cells[index].is_mine {
                let pos = self.pos_of(index);
                return Err(EngineError::DuplicateMine {
                    row: pos.row,
                    col: pos.col,
                });
            }
            let cell = &mut self.cells[index];
            cell.is_mine = true;
            cell.avatar = avatars.get(i).cloned();
        }

        self.finish_layout();
        Ok(())
    }

    fn finish_layout(&mut self) {
        for index in 0..self.cells.len() {
            if self.cells[index].is_mine {
                continue;
            }
            let count = self
                .neighbors(index)
                .filter(|&n| self.cells[n].is_mine)
                .count();
            self.cells[index].adjacent_mines = count as u8;
        }
        self.mines_placed = true;
    }

    pub(crate) fn mine_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_mine)
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_cells_have_three_neighbors() {
        let board = Board::new(4, 3, 1).unwrap();

        assert_eq!(board.neighbors(0).count(), 3);
        assert_eq!(board.neighbors(11).count(), 3);
        assert_eq!(board.neighbors(1).count(), 5);
        assert_eq!(board.neighbors(5).count(), 8);
    }

    #[test]
    fn neighbors_do_not_wrap_across_rows() {
        let board = Board::new(3, 3, 1).unwrap();
        let mut neighbors: Vec<_> = board.neighbors(2).collect();
        neighbors.sort();

        assert_eq!(neighbors, vec![1, 4, 5]);
    }

    #[test]
    fn index_rejects_negative_and_overflowing_coordinates() {
        let board = Board::new(8, 8, 8).unwrap();

        assert!(board.index_of(Pos::new(-1, 0)).is_err());
        assert!(board.index_of(Pos::new(0, 8)).is_err());
        assert!(board.index_of(Pos::new(8, 0)).is_err());
        assert_eq!(board.index_of(Pos::new(7, 7)), Ok(63));
    }

    #[test]
    fn new_rejects_full_and_empty_boards() {
        assert_eq!(
            Board::new(2, 2, 4),
            Err(EngineError::TooManyMines { mines: 4, cells: 4 })
        );
        assert_eq!(Board::new(0, 5, 0), Err(EngineError::EmptyBoard));
    }

    #[test]
    fn new_rejects_oversized_boards() {
        assert_eq!(
            Board::new(65, 64, 8),
            Err(EngineError::BoardTooLarge {
                width: 65,
                height: 64
            })
        );
        assert_eq!(
            Board::new(1 << 20, 1 << 20, 8),
            Err(EngineError::BoardTooLarge {
                width: 1 << 20,
                height: 1 << 20
            })
        );
        assert!(Board::new(64, 64, 8).is_ok());
        assert!(Board::new(1, MAX_CELLS, 0).is_ok());
    }

    #[test]
    fn hidden_mine_projects_as_hidden() {
        let cell = Cell {
            is_mine: true,
            ..Default::default()
        };

        assert_eq!(models::Cell::from(&cell), models::Cell::Hidden);
    }
}
