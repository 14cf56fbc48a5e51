use crate::config::*;
use crate::types::*;

/// A shell in flight. Moves in a straight line at constant velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub position: Point, // Top-left corner of the 10x10 box
    pub velocity: Point, // Pixels per tick
    pub owner: TankId,
}

impl Projectile {
    pub fn new(position: Point, velocity: Point, owner: TankId) -> Self {
        Projectile {
            position,
            velocity,
            owner,
        }
    }

    /// Spawns a shell at the leading edge of a tank box facing `direction`.
    pub fn fired_from(tank_box: Rect, direction: Direction, owner: TankId) -> Self {
        let half = (tank_box.width / 2.0).floor() - PROJECTILE_SIZE / 2.0;
        let position = match direction {
            Direction::Up => Point::new(tank_box.x + half, tank_box.y - PROJECTILE_SIZE),
            Direction::Down => Point::new(tank_box.x + half, tank_box.y + tank_box.height),
            Direction::Left => Point::new(tank_box.x - PROJECTILE_SIZE, tank_box.y + half),
            Direction::Right => Point::new(tank_box.x + tank_box.width, tank_box.y + half),
        };
        let (dx, dy) = direction.delta();
        Projectile::new(
            position,
            Point::new(dx * PROJECTILE_SPEED, dy * PROJECTILE_SPEED),
            owner,
        )
    }

    pub fn bounds(&self) -> Rect {
        Rect::square(self.position, PROJECTILE_SIZE)
    }

    pub fn advance(&mut self) {
        self.position.x += self.velocity.x;
        self.position.y += self.velocity.y;
    }

    pub fn is_out_of_bounds(&self) -> bool {
        self.position.x < 0.0
            || self.position.x > SCREEN_WIDTH
            || self.position.y < 0.0
            || self.position.y > SCREEN_HEIGHT
    }

    pub fn is_vertical(&self) -> bool {
        self.velocity.y != 0.0
    }

    /// Overlap with a one-tile wall (brick or steel) at `tile`.
    pub fn collides_with_tile(&self, tile: Point) -> bool {
        self.bounds().overlaps(&Rect::square(tile, TILE_SIZE))
    }

    pub fn collides_with_base(&self, base: Rect) -> bool {
        self.bounds().overlaps(&base)
    }

    /// True when any corner of the shell lies inside the tank box (edges included).
    ///
    /// This is a corner-containment test, not a box overlap: a tank corner poking
    /// into the shell without any shell corner inside the tank is not a hit.
    pub fn collides_with_tank(&self, tank_box: Rect) -> bool {
        self.bounds()
            .corners()
            .iter()
            .any(|corner| tank_box.contains_closed(*corner))
    }

    pub fn collides_with_projectile(&self, other: &Projectile) -> bool {
        self.bounds().overlaps(&other.bounds())
    }

    /// Area in which bricks are knocked out: wide and short for vertical shots,
    /// tall and narrow for horizontal ones.
    pub fn damage_footprint(&self) -> Rect {
        if self.is_vertical() {
            Rect::new(
                self.position.x - DAMAGE_MARGIN,
                self.position.y,
                DAMAGE_LONG_SIDE,
                DAMAGE_SHORT_SIDE,
            )
        } else {
            Rect::new(
                self.position.x,
                self.position.y - DAMAGE_MARGIN,
                DAMAGE_SHORT_SIDE,
                DAMAGE_LONG_SIDE,
            )
        }
    }

    /// A brick is damaged when one of its corners falls inside the footprint.
    pub fn damages_brick(&self, brick: Point) -> bool {
        let footprint = self.damage_footprint();
        Rect::square(brick, TILE_SIZE)
            .corners()
            .iter()
            .any(|corner| footprint.contains_half_open(*corner))
    }
}
