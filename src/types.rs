use serde::{Deserialize, Serialize};

/// Pixel coordinates, origin at the top-left corner of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned box given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn square(origin: Point, size: f32) -> Self {
        Rect::new(origin.x, origin.y, size, size)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Strict overlap; boxes that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Inclusive on every edge.
    pub fn contains_closed(&self, p: Point) -> bool {
        self.x <= p.x && p.x <= self.x + self.width && self.y <= p.y && p.y <= self.y + self.height
    }

    /// Includes the top/left edges, excludes the bottom/right ones.
    pub fn contains_half_open(&self, p: Point) -> bool {
        self.x <= p.x && p.x < self.x + self.width && self.y <= p.y && p.y < self.y + self.height
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y),
            Point::new(self.x, self.y + self.height),
            Point::new(self.x + self.width, self.y + self.height),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit step in screen coordinates (y grows downwards).
    pub fn delta(self) -> (f32, f32) {
        match self {
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }

    pub fn one_hot(self) -> [f32; 4] {
        let mut encoded = [0.0; 4];
        let slot = match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        };
        encoded[slot] = 1.0;
        encoded
    }
}

/// Index of a tank (and of the agent driving it). Side one is `TankId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TankId(pub usize);

impl TankId {
    pub const ONE: TankId = TankId(0);
    pub const TWO: TankId = TankId(1);

    pub fn opponent(self) -> TankId {
        TankId(1 - self.0)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// Human-facing side number (1 or 2).
    pub fn side(self) -> usize {
        self.0 + 1
    }
}

/// What a tank does on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Idle,
    Move(Direction),
    Shoot,
}

/// Keys held down for a tank, as committed by its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeldKeys {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
}

impl HeldKeys {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        self.up || self.down || self.left || self.right || self.shoot
    }

    /// First held key wins, in UP, DOWN, LEFT, RIGHT, SHOOT order.
    pub fn command(&self) -> Command {
        if self.up {
            Command::Move(Direction::Up)
        } else if self.down {
            Command::Move(Direction::Down)
        } else if self.left {
            Command::Move(Direction::Left)
        } else if self.right {
            Command::Move(Direction::Right)
        } else if self.shoot {
            Command::Shoot
        } else {
            Command::Idle
        }
    }
}
