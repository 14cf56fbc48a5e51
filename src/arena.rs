use crate::config::*;
use crate::error::ArenaError;
use crate::types::*;
use ::rand::prelude::*;

// Destructible one-tile wall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brick {
    pub position: Point, // Top-left corner in pixels
    pub destroyed: bool,
}

// Indestructible one-tile wall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteelWall {
    pub position: Point,
}

// Home base ("eagle"); losing it ends the round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Base {
    pub position: Point,
    pub width: f32,
    pub height: f32,
    pub marker: char, // 'A' or 'B'
    pub destroyed: bool,
}

impl Base {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.width, self.height)
    }
}

/// A lattice point at which a tank becomes eligible for a fresh decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPoint {
    pub position: Point,
    pub index: usize,
}

impl DecisionPoint {
    /// Strict per-axis proximity test.
    pub fn is_near(&self, p: Point, radius: f32) -> bool {
        (self.position.x - p.x).abs() < radius && (self.position.y - p.y).abs() < radius
    }
}

// Represents the battlefield terrain for one round
#[derive(Debug, Clone)]
pub struct Arena {
    pub width: f32,  // Width in pixels
    pub height: f32, // Height in pixels
    pub bricks: Vec<Brick>,
    pub steel_walls: Vec<SteelWall>,
    pub bases: Vec<Base>,
    pub spawns: [Point; 2], // Top-left tank positions, indexed by TankId
    pub decision_points: Vec<DecisionPoint>,
}

impl Arena {
    /// Parses a stage descriptor. One character per tile, rows separated by newlines.
    ///
    /// Rows must all be exactly `GRID_TILES` wide (trailing whitespace ignored);
    /// a ragged grid is rejected instead of being parsed row by row.
    pub fn load<R: Rng + ?Sized>(descriptor: &str, rng: &mut R) -> Result<Self, ArenaError> {
        let rows: Vec<&str> = descriptor.lines().map(str::trim_end).collect();
        if rows.iter().all(|row| row.is_empty()) {
            return Err(ArenaError::Empty);
        }
        if rows.len() != GRID_TILES {
            return Err(ArenaError::GridSize {
                found: rows.len(),
                expected: GRID_TILES,
            });
        }

        let mut bricks = Vec::new();
        let mut steel_walls = Vec::new();
        let mut bases = Vec::new();
        let mut spawns: [Option<Point>; 2] = [None, None];

        for (row_index, row) in rows.iter().enumerate() {
            let tiles: Vec<char> = row.chars().collect();
            if tiles.len() != GRID_TILES {
                return Err(ArenaError::RaggedRow {
                    row: row_index,
                    found: tiles.len(),
                    expected: GRID_TILES,
                });
            }
            for (col_index, tile) in tiles.into_iter().enumerate() {
                let position = Point::new(col_index as f32 * TILE_SIZE, row_index as f32 * TILE_SIZE);
                match tile {
                    '#' => bricks.push(Brick {
                        position,
                        destroyed: false,
                    }),
                    'S' => steel_walls.push(SteelWall { position }),
                    'A' | 'B' => bases.push(Base {
                        position,
                        width: BASE_SIZE,
                        height: BASE_SIZE,
                        marker: tile,
                        destroyed: false,
                    }),
                    '1' => spawns[TankId::ONE.index()] = Some(pick_spawn(&SIDE_ONE_SPAWNS, rng)),
                    '2' => spawns[TankId::TWO.index()] = Some(pick_spawn(&SIDE_TWO_SPAWNS, rng)),
                    _ => {} // Empty floor
                }
            }
        }

        let spawn_one = spawns[0].ok_or(ArenaError::MissingSpawn(TankId::ONE.side()))?;
        let spawn_two = spawns[1].ok_or(ArenaError::MissingSpawn(TankId::TWO.side()))?;
        if bases.is_empty() {
            return Err(ArenaError::MissingBase);
        }

        log::debug!(
            target: "arena",
            "Loaded stage: {} bricks, {} steel walls, {} bases",
            bricks.len(),
            steel_walls.len(),
            bases.len()
        );

        Ok(Arena {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            bricks,
            steel_walls,
            bases,
            spawns: [spawn_one, spawn_two],
            decision_points: generate_decision_points(),
        })
    }

    /// Index of the base closest to `point` (top-left to top-left distance).
    pub fn nearest_base(&self, point: Point) -> usize {
        self.bases
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                point
                    .distance(&a.position)
                    .total_cmp(&point.distance(&b.position))
            })
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    pub fn in_bounds(&self, rect: &Rect) -> bool {
        rect.x >= 0.0
            && rect.x <= self.width - rect.width
            && rect.y >= 0.0
            && rect.y <= self.height - rect.height
    }

    /// Whether a tank occupying `rect` would run into terrain, a base or `opponent`.
    pub fn tank_blocked(&self, rect: &Rect, opponent: Option<Rect>) -> bool {
        let brick_hit = self
            .bricks
            .iter()
            .filter(|brick| !brick.destroyed)
            .any(|brick| rect.overlaps(&Rect::square(brick.position, TILE_SIZE)));
        if brick_hit {
            return true;
        }

        let steel_hit = self
            .steel_walls
            .iter()
            .any(|wall| rect.overlaps(&Rect::square(wall.position, TILE_SIZE)));
        if steel_hit {
            return true;
        }

        let base_hit = self
            .bases
            .iter()
            .filter(|base| !base.destroyed)
            .any(|base| rect.overlaps(&base.bounds()));
        if base_hit {
            return true;
        }

        opponent.is_some_and(|other| rect.overlaps(&other))
    }

    pub fn nearest_decision_point(&self, center: Point) -> Option<&DecisionPoint> {
        self.decision_points
            .iter()
            .find(|dp| dp.is_near(center, DECISION_POINT_RADIUS))
    }

    pub fn intact_bricks(&self) -> usize {
        self.bricks.iter().filter(|brick| !brick.destroyed).count()
    }
}

fn pick_spawn<R: Rng + ?Sized>(candidates: &[(f32, f32)], rng: &mut R) -> Point {
    let (cx, cy) = candidates[rng.gen_range(0..candidates.len())];
    Point::new(cx - TANK_SIZE / 2.0, cy - TANK_SIZE / 2.0)
}

/// One decision point at every (odd row, odd column) tile corner, indexed row-major.
pub fn generate_decision_points() -> Vec<DecisionPoint> {
    let mut points = Vec::new();
    for row in (1..GRID_TILES).step_by(2) {
        for col in (1..GRID_TILES).step_by(2) {
            points.push(DecisionPoint {
                position: Point::new(col as f32 * TILE_SIZE, row as f32 * TILE_SIZE),
                index: points.len(),
            });
        }
    }
    points
}

/// True when the straight segment from `from` to `to` crosses no intact brick or
/// steel wall. Sampled every quarter tile.
pub fn line_of_sight(from: Point, to: Point, solid_tiles: &[Point]) -> bool {
    let length = from.distance(&to);
    let steps = (length / (TILE_SIZE / 4.0)).ceil().max(1.0) as usize;
    (0..=steps).all(|step| {
        let t = step as f32 / steps as f32;
        let sample = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
        !solid_tiles
            .iter()
            .any(|tile| Rect::square(*tile, TILE_SIZE).contains_half_open(sample))
    })
}
