//! Quoridor rules engine.
//!
//! Two pawns race across a 9×9 board; instead of moving, a player may place
//! one of its ten walls to lengthen the opponent's route. A wall may never
//! cut a pawn off from its goal row.
//!
//! # Coordinates
//!
//! Squares are `(x, y)` with `x` the column and `y` the row, both in `0..9`.
//! Player One starts at `(4, 0)` and must reach row `8`; player Two starts at
//! `(4, 8)` and must reach row `0`.
//!
//! Walls are two squares long and are anchored on the `8×8` grid of
//! intersections. A horizontal wall at `(x, y)` lies between rows `y` and
//! `y + 1` over columns `x` and `x + 1`; a vertical wall at `(x, y)` lies
//! between columns `x` and `x + 1` over rows `y` and `y + 1`.
//!
//! # Action space
//!
//! ```text
//!   0 ..  81   pawn moves, destination square y * 9 + x
//!  81 .. 145   horizontal walls, 81 + y * 8 + x
//! 145 .. 209   vertical walls,  145 + y * 8 + x
//! ```

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Game;

/// Board width and height
pub const BOARD_SIZE: usize = 9;
/// Width and height of the grid of wall anchors
pub const WALL_GRID: usize = BOARD_SIZE - 1;
/// Walls each player holds at the start of a game
pub const WALLS_PER_PLAYER: u8 = 10;

/// Number of pawn move actions, one per destination square
pub const PAWN_ACTIONS: usize = BOARD_SIZE * BOARD_SIZE; // 81
/// Index of the first horizontal wall action
pub const HORIZONTAL_WALL_OFFSET: usize = PAWN_ACTIONS;
/// Index of the first vertical wall action
pub const VERTICAL_WALL_OFFSET: usize = HORIZONTAL_WALL_OFFSET + WALL_GRID * WALL_GRID; // 145
/// Size of the action space
pub const ACTION_COUNT: usize = VERTICAL_WALL_OFFSET + WALL_GRID * WALL_GRID; // 209

/// Number of feature planes returned by [`Quoridor::features`]
pub const FEATURE_PLANES: usize = 4;
/// Length of the vector returned by [`Quoridor::features`]
pub const FEATURE_SIZE: usize = FEATURE_PLANES * BOARD_SIZE * BOARD_SIZE; // 324

/// A square of the board, `(x, y)`.
pub type Square = (usize, usize);

const DIRECTIONS: [(isize, isize); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// One of the two players. `One` moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    /// The other player.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Row the pawn of this player must reach.
    #[inline]
    pub fn goal_row(self) -> usize {
        match self {
            Player::One => BOARD_SIZE - 1,
            Player::Two => 0,
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }
}

/// Direction of a wall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Blocks vertical steps between two rows.
    Horizontal,
    /// Blocks horizontal steps between two columns.
    Vertical,
}

/// A decoded action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Move the pawn to the square `(x, y)`.
    Move { x: usize, y: usize },
    /// Place a wall anchored at `(x, y)`.
    Wall { x: usize, y: usize, orientation: Orientation },
}

impl Action {
    /// Index of the action in `0..ACTION_COUNT`.
    pub fn index(&self) -> usize {
        match *self {
            Action::Move { x, y } => y * BOARD_SIZE + x,
            Action::Wall { x, y, orientation: Orientation::Horizontal } => {
                HORIZONTAL_WALL_OFFSET + y * WALL_GRID + x
            }
            Action::Wall { x, y, orientation: Orientation::Vertical } => {
                VERTICAL_WALL_OFFSET + y * WALL_GRID + x
            }
        }
    }

    /// Decodes an action index, `None` outside of `0..ACTION_COUNT`.
    pub fn from_index(index: usize) -> Option<Action> {
        match index {
            i if i < PAWN_ACTIONS => Some(Action::Move { x: i % BOARD_SIZE, y: i / BOARD_SIZE }),
            i if i < VERTICAL_WALL_OFFSET => {
                let i = i - HORIZONTAL_WALL_OFFSET;
                let orientation = Orientation::Horizontal;
                Some(Action::Wall { x: i % WALL_GRID, y: i / WALL_GRID, orientation })
            }
            i if i < ACTION_COUNT => {
                let i = i - VERTICAL_WALL_OFFSET;
                let orientation = Orientation::Vertical;
                Some(Action::Wall { x: i % WALL_GRID, y: i / WALL_GRID, orientation })
            }
            _ => None,
        }
    }
}

/// Complete state of a Quoridor game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quoridor {
    /// Pawn squares, indexed by player.
    pawns: [Square; 2],
    walls_left: [u8; 2],
    /// Horizontal walls, indexed `[y][x]` by anchor.
    horizontal: [[bool; WALL_GRID]; WALL_GRID],
    /// Vertical walls, indexed `[y][x]` by anchor.
    vertical: [[bool; WALL_GRID]; WALL_GRID],
    current: Player,
    winner: Option<Player>,
}

impl Default for Quoridor {
    fn default() -> Self {
        Quoridor {
            pawns: [(BOARD_SIZE / 2, 0), (BOARD_SIZE / 2, BOARD_SIZE - 1)],
            walls_left: [WALLS_PER_PLAYER; 2],
            horizontal: [[false; WALL_GRID]; WALL_GRID],
            vertical: [[false; WALL_GRID]; WALL_GRID],
            current: Player::One,
            winner: None,
        }
    }
}

impl Quoridor {
    /// Square of the pawn of `player`.
    #[inline]
    pub fn pawn(&self, player: Player) -> Square {
        self.pawns[player.index()]
    }

    /// Walls `player` can still place.
    #[inline]
    pub fn walls_left(&self, player: Player) -> u8 {
        self.walls_left[player.index()]
    }

    /// The player whose pawn reached its goal row, if any.
    #[inline]
    pub fn winner(&self) -> Option<Player> {
        self.winner
    }

    /// Whether a wall of the given orientation is anchored at `(x, y)`.
    pub fn has_wall(&self, x: usize, y: usize, orientation: Orientation) -> bool {
        if x >= WALL_GRID || y >= WALL_GRID {
            return false;
        }
        match orientation {
            Orientation::Horizontal => self.horizontal[y][x],
            Orientation::Vertical => self.vertical[y][x],
        }
    }

    /// The square one step from `from` in direction `(dx, dy)`, if it is on
    /// the board and no wall is in the way.
    fn step(&self, from: Square, (dx, dy): (isize, isize)) -> Option<Square> {
        let (x, y) = from;
        let nx = x.checked_add_signed(dx).filter(|&nx| nx < BOARD_SIZE)?;
        let ny = y.checked_add_signed(dy).filter(|&ny| ny < BOARD_SIZE)?;

        let blocked = if dx == 0 {
            // crossing the line between rows min(y, ny) and min(y, ny) + 1
            let row = y.min(ny);
            self.has_wall(x, row, Orientation::Horizontal)
                || (x > 0 && self.has_wall(x - 1, row, Orientation::Horizontal))
        } else {
            let column = x.min(nx);
            self.has_wall(column, y, Orientation::Vertical)
                || (y > 0 && self.has_wall(column, y - 1, Orientation::Vertical))
        };

        (!blocked).then_some((nx, ny))
    }

    /// Destinations of the pawn of the player to move.
    ///
    /// A step onto the opponent becomes a jump over it; when the jump is
    /// blocked by a wall or the board edge, the pawn may instead side-step
    /// diagonally around the opponent.
    pub fn pawn_moves(&self) -> Vec<Square> {
        let from = self.pawn(self.current);
        let opponent = self.pawn(self.current.opponent());
        let mut moves = Vec::with_capacity(5);

        for direction in DIRECTIONS {
            let Some(next) = self.step(from, direction) else {
                continue;
            };

            if next != opponent {
                moves.push(next);
                continue;
            }

            if let Some(jump) = self.step(opponent, direction) {
                moves.push(jump);
            } else {
                let (dx, dy) = direction;
                for side in [(dy, dx), (-dy, -dx)] {
                    if let Some(diagonal) = self.step(opponent, side) {
                        if diagonal != from && !moves.contains(&diagonal) {
                            moves.push(diagonal);
                        }
                    }
                }
            }
        }

        moves
    }

    /// Length of the shortest route of `player` to its goal row, ignoring the
    /// other pawn, or `None` when the goal is unreachable.
    pub fn distance_to_goal(&self, player: Player) -> Option<usize> {
        let start = self.pawn(player);
        let goal = player.goal_row();

        let mut distance = [[usize::MAX; BOARD_SIZE]; BOARD_SIZE];
        let mut queue = VecDeque::from([start]);
        distance[start.1][start.0] = 0;

        while let Some(square) = queue.pop_front() {
            let d = distance[square.1][square.0];
            if square.1 == goal {
                return Some(d);
            }

            for direction in DIRECTIONS {
                if let Some((nx, ny)) = self.step(square, direction) {
                    if distance[ny][nx] == usize::MAX {
                        distance[ny][nx] = d + 1;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }

        None
    }

    /// Checks the placement rules of a wall, path condition included.
    fn is_wall_legal(&self, x: usize, y: usize, orientation: Orientation) -> bool {
        if x >= WALL_GRID || y >= WALL_GRID || self.walls_left(self.current) == 0 {
            return false;
        }

        // walls crossing at the same anchor
        if self.horizontal[y][x] || self.vertical[y][x] {
            return false;
        }

        let overlaps = match orientation {
            Orientation::Horizontal => {
                (x > 0 && self.horizontal[y][x - 1])
                    || (x + 1 < WALL_GRID && self.horizontal[y][x + 1])
            }
            Orientation::Vertical => {
                (y > 0 && self.vertical[y - 1][x]) || (y + 1 < WALL_GRID && self.vertical[y + 1][x])
            }
        };
        if overlaps {
            return false;
        }

        let mut test = self.clone();
        test.set_wall(x, y, orientation);
        test.distance_to_goal(Player::One).is_some() && test.distance_to_goal(Player::Two).is_some()
    }

    fn set_wall(&mut self, x: usize, y: usize, orientation: Orientation) {
        match orientation {
            Orientation::Horizontal => self.horizontal[y][x] = true,
            Orientation::Vertical => self.vertical[y][x] = true,
        }
    }

    /// Whether `action` is legal for the player to move.
    pub fn is_legal(&self, action: usize) -> bool {
        if self.winner.is_some() {
            return false;
        }

        match Action::from_index(action) {
            Some(Action::Move { x, y }) => self.pawn_moves().contains(&(x, y)),
            Some(Action::Wall { x, y, orientation }) => self.is_wall_legal(x, y, orientation),
            None => false,
        }
    }

    /// The 4×9×9 input planes: pawn of player One, pawn of player Two,
    /// horizontal wall anchors, vertical wall anchors. Each plane is row-major
    /// (`y * 9 + x`).
    ///
    /// The planes do not encode the side to move: two positions with the same
    /// pawns and walls but a different player to move give the same features.
    pub fn features(&self) -> Vec<f32> {
        let plane = BOARD_SIZE * BOARD_SIZE;
        let mut features = vec![0.0; FEATURE_SIZE];

        for (index, &(x, y)) in self.pawns.iter().enumerate() {
            features[index * plane + y * BOARD_SIZE + x] = 1.0;
        }

        for y in 0..WALL_GRID {
            for x in 0..WALL_GRID {
                if self.horizontal[y][x] {
                    features[2 * plane + y * BOARD_SIZE + x] = 1.0;
                }
                if self.vertical[y][x] {
                    features[3 * plane + y * BOARD_SIZE + x] = 1.0;
                }
            }
        }

        features
    }
}

impl Game<ACTION_COUNT> for Quoridor {
    type State = Vec<f32>;
    type Player = Player;

    fn new() -> Self {
        Quoridor::default()
    }

    fn get_actions(&self) -> [bool; ACTION_COUNT] {
        let mut actions = [false; ACTION_COUNT];
        if self.winner.is_some() {
            return actions;
        }

        for (x, y) in self.pawn_moves() {
            actions[Action::Move { x, y }.index()] = true;
        }

        if self.walls_left(self.current) > 0 {
            for y in 0..WALL_GRID {
                for x in 0..WALL_GRID {
                    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
                        if self.is_wall_legal(x, y, orientation) {
                            actions[Action::Wall { x, y, orientation }.index()] = true;
                        }
                    }
                }
            }
        }

        actions
    }

    fn is_finish(&self) -> bool {
        self.winner.is_some()
    }

    /// Applies `action` for the player to move. The action must be legal;
    /// an index outside of the action space is ignored.
    fn play(&mut self, action: usize) {
        let player = self.current;

        match Action::from_index(action) {
            Some(Action::Move { x, y }) => {
                self.pawns[player.index()] = (x, y);
                if y == player.goal_row() {
                    self.winner = Some(player);
                }
            }
            Some(Action::Wall { x, y, orientation }) => {
                self.set_wall(x, y, orientation);
                self.walls_left[player.index()] -= 1;
            }
            None => return,
        }

        self.current = player.opponent();
    }

    fn get_state(&self) -> Self::State {
        self.features()
    }

    fn current_player(&self) -> Player {
        self.current
    }

    fn get_result(&self, player: Player) -> Option<f64> {
        self.winner.map(|winner| if winner == player { 1.0 } else { -1.0 })
    }
}

/// Text rendering, row 8 on top. `1`/`2` are the pawns, `-` and `|` the walls.
impl fmt::Display for Quoridor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in (0..BOARD_SIZE).rev() {
            for x in 0..BOARD_SIZE {
                let cell = match (x, y) {
                    square if square == self.pawns[0] => '1',
                    square if square == self.pawns[1] => '2',
                    _ => '.',
                };
                write!(f, "{cell}")?;
                if x + 1 < BOARD_SIZE {
                    let wall = self.step((x, y), (1, 0)).is_none();
                    write!(f, "{}", if wall { '|' } else { ' ' })?;
                }
            }
            writeln!(f)?;

            if y > 0 {
                for x in 0..BOARD_SIZE {
                    let wall = self.step((x, y), (0, -1)).is_none();
                    write!(f, "{} ", if wall { '-' } else { ' ' })?;
                }
                writeln!(f)?;
            }
        }

        let [first, second] = self.walls_left;
        write!(f, "walls: {first} / {second}, to move: {:?}", self.current)
    }
}
