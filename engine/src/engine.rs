use followsweeper_common::models::{self, AvatarRecord, GameParams, GameView, Phase, Pos};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::{Cell, Result, board::Board};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The command was legal but did nothing (revealed or flagged target).
    NoChange,
    /// A first reveal on a flagged cell: mines are now placed and the game is
    /// running, but nothing was uncovered.
    Started,
    Revealed,
    Flagged,
    Unflagged,
    Detonated,
    Won,
    /// The game had already ended; nothing was touched.
    AlreadyOver,
}

impl Outcome {
    pub const fn has_update(self) -> bool {
        use Outcome::*;
        match self {
            NoChange | AlreadyOver => false,
            Started | Revealed | Flagged | Unflagged | Detonated | Won => true,
        }
    }
}

/// What a single command did.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub outcome: Outcome,
    /// Cells whose player-visible state changed.
    pub changed: Vec<Pos>,
}

impl Report {
    fn unchanged(outcome: Outcome) -> Self {
        Self {
            outcome,
            changed: Vec::new(),
        }
    }
}

/// Read-only projection of a whole game, mines included.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub width: usize,
    pub height: usize,
    pub mine_count: usize,
    pub mines_remaining: i64,
    pub cells: Vec<Vec<Cell>>,
    pub detonated_cell: Option<Pos>,
    pub detonated_avatar: Option<AvatarRecord>,
    pub avoided_avatars: Option<Vec<AvatarRecord>>,
}

impl Snapshot {
    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        let row = usize::try_from(pos.row).ok()?;
        let col = usize::try_from(pos.col).ok()?;
        self.cells.get(row)?.get(col)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten()
    }

    /// What the player is allowed to see.
    pub fn view(&self) -> GameView {
        GameView {
            width: self.width,
            height: self.height,
            mines: self.mine_count,
            phase: self.phase,
            mines_remaining: self.mines_remaining,
            field: self
                .cells
                .iter()
                .map(|row| row.iter().map(models::Cell::from).collect())
                .collect(),
            killed_by: self.detonated_avatar.clone(),
            avoided: self.avoided_avatars.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameEngine<R = StdRng> {
    board: Board,
    avatars: Vec<AvatarRecord>,
    phase: Phase,
    flagged: usize,
    revealed_safe: usize,
    detonated: Option<usize>,
    rng: R,
}

impl GameEngine<StdRng> {
    pub fn new(params: GameParams, avatars: Vec<AvatarRecord>) -> Result<Self> {
        Self::with_rng(params, avatars, StdRng::from_os_rng())
    }

    /// Builds a game whose mines sit at `mines`, skipping random placement.
    ///
    /// Avatars are assigned to the mines in the order they are listed.
    pub fn with_mines(
        width: usize,
        height: usize,
        mines: &[Pos],
        avatars: Vec<AvatarRecord>,
    ) -> Result<Self> {
        let params = GameParams {
            width,
            height,
            mines: mines.len(),
        };
        let mut engine = Self::with_rng(params, avatars, StdRng::from_os_rng())?;

        let indices = mines
            .iter()
            .map(|&pos| engine.board.index_of(pos))
            .collect::<Result<Vec<_>>>()?;
        engine.board.place_mines_at(&indices, &engine.avatars)?;

        Ok(engine)
    }
}

impl<R: Rng> GameEngine<R> {
    pub fn with_rng(params: GameParams, avatars: Vec<AvatarRecord>, rng: R) -> Result<Self> {
        let board = Board::new(params.width, params.height, params.mines)?;
        debug!(
            "New {}x{} game with {} mines and {} avatars",
            params.width,
            params.height,
            params.mines,
            avatars.len()
        );

        Ok(Self {
            board,
            avatars,
            phase: Phase::AwaitingFirstMove,
            flagged: 0,
            revealed_safe: 0,
            detonated: None,
            rng,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_finished()
    }

    pub fn width(&self) -> usize {
        self.board.width()
    }

    pub fn height(&self) -> usize {
        self.board.height()
    }

    pub fn mine_count(&self) -> usize {
        self.board.mine_count()
    }

    pub fn avatars(&self) -> &[AvatarRecord] {
        &self.avatars
    }

    /// Display-only counter; goes negative when the player over-flags.
    pub fn mines_remaining(&self) -> i64 {
        self.board.mine_count() as i64 - self.flagged as i64
    }

    pub fn detonated_cell(&self) -> Option<Pos> {
        self.detonated.map(|index| self.board.pos_of(index))
    }

    pub fn detonated_avatar(&self) -> Option<&AvatarRecord> {
        self.detonated
            .and_then(|index| self.board.cell(index).avatar.as_ref())
    }

    /// Avatars on mines in row-major order, once the game is won.
    pub fn avoided_avatars(&self) -> Option<Vec<AvatarRecord>> {
        (self.phase == Phase::Won).then(|| {
            self.board
                .cells()
                .iter()
                .filter_map(|cell| cell.avatar.clone())
                .collect()
        })
    }

    pub fn cell_view(&self, pos: Pos) -> Result<models::Cell> {
        let index = self.board.index_of(pos)?;
        Ok(self.board.cell(index).into())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            width: self.board.width(),
            height: self.board.height(),
            mine_count: self.board.mine_count(),
            mines_remaining: self.mines_remaining(),
            cells: self.board.rows().map(<[Cell]>::to_vec).collect(),
            detonated_cell: self.detonated_cell(),
            detonated_avatar: self.detonated_avatar().cloned(),
            avoided_avatars: self.avoided_avatars(),
        }
    }

    pub fn reveal(&mut self, pos: Pos) -> Result<Report> {
        let index = self.board.index_of(pos)?;

        if self.phase.is_finished() {
            return Ok(Report::unchanged(Outcome::AlreadyOver));
        }

        let cell = self.board.cell(index);
        let blocked = cell.is_revealed || cell.is_flagged;

        // The first reveal starts the game even when it lands on a flag; the
        // flagged cell is still kept clear of mines.
        let starting = self.phase == Phase::AwaitingFirstMove;
        if starting {
            if !self.board.mines_placed() {
                self.board
                    .place_random_mines(index, &self.avatars, &mut self.rng);
            }
            self.phase = Phase::InProgress;
        }

        if blocked {
            let outcome = if starting {
                Outcome::Started
            } else {
                Outcome::NoChange
            };
            return Ok(Report::unchanged(outcome));
        }

        if self.board.cell(index).is_mine {
            return Ok(self.detonate(index));
        }

        let revealed = self.flood_reveal(index);
        self.revealed_safe += revealed.len();
        let changed = revealed
            .into_iter()
            .map(|index| self.board.pos_of(index))
            .collect();

        let outcome = if self.revealed_safe == self.board.safe_cell_count() {
            self.phase = Phase::Won;
            info!("Game won with {} flags placed", self.flagged);
            Outcome::Won
        } else {
            Outcome::Revealed
        };

        Ok(Report { outcome, changed })
    }

    pub fn toggle_flag(&mut self, pos: Pos) -> Result<Report> {
        let index = self.board.index_of(pos)?;

        if self.phase.is_finished() {
            return Ok(Report::unchanged(Outcome::AlreadyOver));
        }

        let cell = self.board.cell_mut(index);
        if cell.is_revealed {
            return Ok(Report::unchanged(Outcome::NoChange));
        }

        cell.is_flagged = !cell.is_flagged;
        let outcome = if cell.is_flagged {
            self.flagged += 1;
            Outcome::Flagged
        } else {
            self.flagged -= 1;
            Outcome::Unflagged
        };

        Ok(Report {
            outcome,
            changed: vec![pos],
        })
    }

    /// Reveals the connected zero region around `start` plus its numbered
    /// border. Flagged cells and mines are never touched.
    fn flood_reveal(&mut self, start: usize) -> Vec<usize> {
        let mut revealed = Vec::new();
        let mut pending = vec![start];

        while let Some(index) = pending.pop() {
            let cell = self.board.cell_mut(index);
            if cell.is_revealed || cell.is_flagged || cell.is_mine {
                continue;
            }

            cell.is_revealed = true;
            let is_zero = cell.adjacent_mines == 0;
            revealed.push(index);

            if is_zero {
                pending.extend(self.board.neighbors(index).filter(|&neighbor| {
                    let cell = self.board.cell(neighbor);
                    !cell.is_revealed && !cell.is_flagged
                }));
            }
        }

        revealed
    }

    fn detonate(&mut self, index: usize) -> Report {
        self.detonated = Some(index);
        self.phase = Phase::Lost;

        let mines: Vec<usize> = self.board.mine_indices().collect();
        for &mine in &mines {
            let cell = self.board.cell_mut(mine);
            cell.is_revealed = true;
            if cell.is_flagged {
                cell.is_flagged = false;
                self.flagged -= 1;
            }
        }

        info!(
            "Mine detonated at {}, revealed {} mines",
            self.board.pos_of(index),
            mines.len()
        );

        Report {
            outcome: Outcome::Detonated,
            changed: mines
                .into_iter()
                .map(|mine| self.board.pos_of(mine))
                .collect(),
        }
    }
}
