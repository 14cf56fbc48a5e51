use crate::arena::Arena;
use crate::config::*;
use crate::projectile::Projectile;
use crate::types::*;

/// What stopped a projectile during `Tank::update_projectiles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    OutOfBounds,
    Tank(TankId),
    Base(usize),
    Bricks(usize), // Number of bricks knocked out
    SteelWall,
    Projectile,
}

// Represents one tank in the arena
#[derive(Debug, Clone)]
pub struct Tank {
    pub id: TankId,
    pub position: Point, // Top-left corner in pixels
    pub width: f32,
    pub height: f32,
    pub direction: Direction,
    pub destroyed: bool,
    pub last_shot_ms: Option<u64>,
    pub projectiles: Vec<Projectile>,
    pub base: usize, // Index into `Arena::bases`, fixed for the round
    pub last_decision_point: Option<usize>,
    pub pending_decision_point: Option<usize>,
    pub awaiting_decision: bool,
    pub active_keys: HeldKeys,
    pub shots_fired: u32,
}

impl Tank {
    pub fn new(id: TankId, position: Point, base: usize) -> Self {
        Tank {
            id,
            position,
            width: TANK_SIZE,
            height: TANK_SIZE,
            direction: Direction::Up,
            destroyed: false,
            last_shot_ms: None,
            projectiles: Vec::new(),
            base,
            last_decision_point: None,
            pending_decision_point: None,
            awaiting_decision: true, // First decision happens on spawn
            active_keys: HeldKeys::none(),
            shots_fired: 0,
        }
    }

    /// Places a tank on its spawn point and assigns it the nearest base.
    pub fn spawn(id: TankId, arena: &Arena) -> Self {
        let position = arena.spawns[id.index()];
        Tank::new(id, position, arena.nearest_base(position))
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    /// Box other tanks collide with; destroyed tanks are not obstacles.
    pub fn obstacle(&self) -> Option<Rect> {
        if self.destroyed { None } else { Some(self.bounds()) }
    }

    pub fn destroy(&mut self) {
        if !self.destroyed {
            crate::debug_tank!(self.id.side(), "destroyed at ({:.0}, {:.0})", self.position.x, self.position.y);
        }
        self.destroyed = true;
    }

    /// Applies one tick worth of held keys. Only the highest-priority key acts.
    pub fn perform_action(&mut self, keys: HeldKeys, arena: &Arena, opponent: Option<Rect>, now_ms: u64) {
        if self.destroyed {
            return;
        }
        match keys.command() {
            Command::Move(direction) => self.try_move(direction, arena, opponent),
            Command::Shoot => {
                self.shoot(now_ms);
            }
            Command::Idle => {}
        }
    }

    /// Turns to `direction` and steps forward unless the new box would leave the
    /// arena or overlap terrain, an intact base or the opponent.
    pub fn try_move(&mut self, direction: Direction, arena: &Arena, opponent: Option<Rect>) {
        self.direction = direction;
        let (dx, dy) = direction.delta();
        let candidate = Rect::new(
            self.position.x + dx * TANK_STEP,
            self.position.y + dy * TANK_STEP,
            self.width,
            self.height,
        );
        if arena.in_bounds(&candidate) && !arena.tank_blocked(&candidate, opponent) {
            self.position = Point::new(candidate.x, candidate.y);
        }
    }

    /// Fires if at least `SHOT_COOLDOWN_MS` of simulated time passed since the last shot.
    pub fn shoot(&mut self, now_ms: u64) -> bool {
        if self.destroyed {
            return false;
        }
        if let Some(last) = self.last_shot_ms {
            if now_ms.saturating_sub(last) < SHOT_COOLDOWN_MS {
                return false;
            }
        }
        self.last_shot_ms = Some(now_ms);
        let shell = Projectile::fired_from(self.bounds(), self.direction, self.id);
        crate::debug_tank!(
            self.id.side(),
            "fired {:?} from ({:.0}, {:.0})",
            self.direction,
            shell.position.x,
            shell.position.y
        );
        self.projectiles.push(shell);
        self.shots_fired += 1;
        true
    }

    /// Moves every live shell one tick and removes the ones that hit something.
    ///
    /// Each shell is tested in a fixed order (bounds, enemy tank, bases, bricks,
    /// steel, enemy shells); the first match removes it.
    pub fn update_projectiles(&mut self, arena: &mut Arena, opponent: &mut Tank) -> Vec<Impact> {
        let mut impacts = Vec::new();
        if self.destroyed {
            return impacts;
        }

        let mut survivors = Vec::with_capacity(self.projectiles.len());
        for mut shell in std::mem::take(&mut self.projectiles) {
            shell.advance();
            match resolve_impact(&shell, arena, opponent) {
                Some(impact) => impacts.push(impact),
                None => survivors.push(shell),
            }
        }
        self.projectiles = survivors;
        impacts
    }

    /// Flags the tank for a new decision when its center sits on a decision point
    /// other than the one consumed by the last decision.
    pub fn update_decision_cadence(&mut self, arena: &Arena) {
        if let Some(point) = arena.nearest_decision_point(self.center()) {
            self.pending_decision_point = Some(point.index);
            if self.last_decision_point != Some(point.index) {
                self.awaiting_decision = true;
            }
        }
    }

    /// Stores the keys chosen by the agent and consumes the pending decision point.
    pub fn commit(&mut self, keys: HeldKeys) {
        self.active_keys = keys;
        self.awaiting_decision = false;
        self.last_decision_point = self.pending_decision_point;
    }
}

fn resolve_impact(shell: &Projectile, arena: &mut Arena, opponent: &mut Tank) -> Option<Impact> {
    if shell.is_out_of_bounds() {
        return Some(Impact::OutOfBounds);
    }

    if !opponent.destroyed && shell.collides_with_tank(opponent.bounds()) {
        opponent.destroy();
        return Some(Impact::Tank(opponent.id));
    }

    let mut base_hit = None;
    for (index, base) in arena.bases.iter_mut().enumerate() {
        if !base.destroyed && shell.collides_with_base(base.bounds()) {
            base.destroyed = true;
            base_hit.get_or_insert(index);
        }
    }
    if let Some(index) = base_hit {
        return Some(Impact::Base(index));
    }

    let mut knocked_out = 0;
    for brick in arena.bricks.iter_mut() {
        if !brick.destroyed && shell.damages_brick(brick.position) {
            brick.destroyed = true;
            knocked_out += 1;
        }
    }
    if knocked_out > 0 {
        return Some(Impact::Bricks(knocked_out));
    }

    if arena
        .steel_walls
        .iter()
        .any(|wall| shell.collides_with_tile(wall.position))
    {
        return Some(Impact::SteelWall);
    }

    let before = opponent.projectiles.len();
    opponent
        .projectiles
        .retain(|enemy| !shell.collides_with_projectile(enemy));
    if opponent.projectiles.len() < before {
        return Some(Impact::Projectile);
    }

    None
}

/// Mutable access to a tank and its opponent at the same time.
pub fn tank_and_opponent(tanks: &mut [Tank; 2], id: TankId) -> (&mut Tank, &mut Tank) {
    let (first, second) = tanks.split_at_mut(1);
    if id == TankId::ONE {
        (&mut first[0], &mut second[0])
    } else {
        (&mut second[0], &mut first[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::fixtures::open_arena;
    use crate::arena::{Brick, SteelWall};
    use assert_approx_eq::assert_approx_eq;

    fn tank_at(id: TankId, x: f32, y: f32) -> Tank {
        Tank::new(id, Point::new(x, y), 0)
    }

    fn keys_for(direction: Direction) -> HeldKeys {
        let mut keys = HeldKeys::none();
        match direction {
            Direction::Up => keys.up = true,
            Direction::Down => keys.down = true,
            Direction::Left => keys.left = true,
            Direction::Right => keys.right = true,
        }
        keys
    }

    // Top-left of a tile-sized obstacle sitting 2px away from a tank at (400, 400).
    fn adjacent_tile(direction: Direction) -> Point {
        match direction {
            Direction::Up => Point::new(410.0, 366.0),
            Direction::Down => Point::new(410.0, 454.0),
            Direction::Left => Point::new(366.0, 410.0),
            Direction::Right => Point::new(454.0, 410.0),
        }
    }

    const ALL_DIRECTIONS: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    #[test]
    fn test_free_movement_steps_four_pixels() {
        let arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        tank.perform_action(keys_for(Direction::Left), &arena, None, 0);
        assert_approx_eq!(tank.position.x, 396.0);
        assert_eq!(tank.direction, Direction::Left);
        tank.perform_action(keys_for(Direction::Down), &arena, None, 0);
        assert_approx_eq!(tank.position.y, 404.0);
    }

    #[test]
    fn test_bricks_block_from_every_side() {
        for direction in ALL_DIRECTIONS {
            let mut arena = open_arena();
            arena.bricks.push(Brick {
                position: adjacent_tile(direction),
                destroyed: false,
            });
            let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
            tank.perform_action(keys_for(direction), &arena, None, 0);
            assert_eq!(tank.position, Point::new(400.0, 400.0), "moving {:?}", direction);
            assert_eq!(tank.direction, direction);
        }
    }

    #[test]
    fn test_destroyed_bricks_do_not_block() {
        let mut arena = open_arena();
        arena.bricks.push(Brick {
            position: adjacent_tile(Direction::Right),
            destroyed: true,
        });
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        tank.perform_action(keys_for(Direction::Right), &arena, None, 0);
        assert_approx_eq!(tank.position.x, 404.0);
    }

    #[test]
    fn test_steel_blocks_from_every_side() {
        for direction in ALL_DIRECTIONS {
            let mut arena = open_arena();
            arena.steel_walls.push(SteelWall {
                position: adjacent_tile(direction),
            });
            let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
            tank.perform_action(keys_for(direction), &arena, None, 0);
            assert_eq!(tank.position, Point::new(400.0, 400.0), "moving {:?}", direction);
        }
    }

    #[test]
    fn test_intact_base_blocks() {
        let mut arena = open_arena();
        // Base B occupies x 384..448, y 96..160; stand just below it.
        let mut tank = tank_at(TankId::ONE, 390.0, 162.0);
        tank.perform_action(keys_for(Direction::Up), &arena, None, 0);
        assert_approx_eq!(tank.position.y, 162.0);

        let index = arena.bases.iter().position(|b| b.marker == 'B').unwrap();
        arena.bases[index].destroyed = true;
        tank.perform_action(keys_for(Direction::Up), &arena, None, 0);
        assert_approx_eq!(tank.position.y, 158.0);
    }

    #[test]
    fn test_base_blocks_from_every_side() {
        let arena = open_arena();
        let base = arena.bases.iter().find(|b| b.marker == 'B').unwrap().bounds();
        for direction in ALL_DIRECTIONS {
            // 2px gap between the tank and the base edge it faces
            let start = match direction {
                Direction::Up => Point::new(base.x + 6.0, base.y + base.height + 2.0),
                Direction::Down => Point::new(base.x + 6.0, base.y - TANK_SIZE - 2.0),
                Direction::Left => Point::new(base.x + base.width + 2.0, base.y + 4.0),
                Direction::Right => Point::new(base.x - TANK_SIZE - 2.0, base.y + 4.0),
            };
            let mut tank = tank_at(TankId::ONE, start.x, start.y);
            tank.perform_action(keys_for(direction), &arena, None, 0);
            assert_eq!(tank.position, start, "moving {:?}", direction);
            assert_eq!(tank.direction, direction);
        }
    }

    #[test]
    fn test_opponent_blocks_from_every_side() {
        let arena = open_arena();
        for direction in ALL_DIRECTIONS {
            let (dx, dy) = direction.delta();
            let opponent = tank_at(TankId::TWO, 400.0 + dx * 54.0, 400.0 + dy * 54.0);
            let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
            tank.perform_action(keys_for(direction), &arena, opponent.obstacle(), 0);
            assert_eq!(tank.position, Point::new(400.0, 400.0), "moving {:?}", direction);
        }
    }

    #[test]
    fn test_destroyed_opponent_is_not_an_obstacle() {
        let arena = open_arena();
        let mut opponent = tank_at(TankId::TWO, 454.0, 400.0);
        opponent.destroy();
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        tank.perform_action(keys_for(Direction::Right), &arena, opponent.obstacle(), 0);
        assert_approx_eq!(tank.position.x, 404.0);
    }

    #[test]
    fn test_arena_edges_block() {
        let arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 2.0, 780.0);
        tank.perform_action(keys_for(Direction::Left), &arena, None, 0);
        assert_approx_eq!(tank.position.x, 2.0);
        tank.perform_action(keys_for(Direction::Down), &arena, None, 0);
        assert_approx_eq!(tank.position.y, 780.0);
        let mut corner = tank_at(TankId::ONE, 780.0, 0.0);
        corner.perform_action(keys_for(Direction::Right), &arena, None, 0);
        assert_approx_eq!(corner.position.x, 780.0);
    }

    #[test]
    fn test_destroyed_tank_ignores_commands() {
        let arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        tank.destroy();
        tank.destroy();
        assert!(tank.destroyed);
        tank.perform_action(keys_for(Direction::Left), &arena, None, 0);
        assert_eq!(tank.position, Point::new(400.0, 400.0));
        assert!(!tank.shoot(10_000));
        assert!(tank.projectiles.is_empty());
    }

    #[test]
    fn test_shot_rate_limit() {
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        assert!(tank.shoot(1_000));
        assert!(!tank.shoot(1_100));
        assert_eq!(tank.projectiles.len(), 1);

        let mut other = tank_at(TankId::ONE, 400.0, 400.0);
        assert!(other.shoot(1_000));
        assert!(other.shoot(1_600));
        assert_eq!(other.projectiles.len(), 2);
    }

    #[test]
    fn test_shoot_key_fires_in_facing_direction() {
        let arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        tank.direction = Direction::Left;
        let keys = HeldKeys {
            shoot: true,
            ..HeldKeys::none()
        };
        tank.perform_action(keys, &arena, None, 0);
        assert_eq!(tank.projectiles.len(), 1);
        assert_eq!(tank.projectiles[0].velocity, Point::new(-10.0, 0.0));
        assert_eq!(tank.position, Point::new(400.0, 400.0));
    }

    #[test]
    fn test_projectile_removed_once_when_leaving_screen() {
        let mut arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 600.0, 20.0);
        let mut opponent = tank_at(TankId::TWO, 100.0, 700.0);
        assert!(tank.shoot(0));
        assert_approx_eq!(tank.projectiles[0].position.y, 10.0);

        assert!(tank.update_projectiles(&mut arena, &mut opponent).is_empty()); // y = 0, still inside
        assert_eq!(tank.projectiles.len(), 1);
        let impacts = tank.update_projectiles(&mut arena, &mut opponent); // y = -10
        assert_eq!(impacts, vec![Impact::OutOfBounds]);
        assert!(tank.projectiles.is_empty());
        assert!(tank.update_projectiles(&mut arena, &mut opponent).is_empty());
    }

    #[test]
    fn test_enemy_tank_takes_priority_over_bricks() {
        let mut arena = open_arena();
        arena.bricks.push(Brick {
            position: Point::new(416.0, 330.0),
            destroyed: false,
        });
        let mut tank = tank_at(TankId::ONE, 100.0, 700.0);
        let mut opponent = tank_at(TankId::TWO, 400.0, 300.0);
        tank.projectiles.push(Projectile::new(
            Point::new(420.0, 360.0),
            Point::new(0.0, -10.0),
            TankId::ONE,
        ));
        let impacts = tank.update_projectiles(&mut arena, &mut opponent);
        assert_eq!(impacts, vec![Impact::Tank(TankId::TWO)]);
        assert!(opponent.destroyed);
        assert!(!arena.bricks.last().unwrap().destroyed);
        assert!(tank.projectiles.is_empty());
    }

    #[test]
    fn test_shell_knocks_out_only_bricks_in_footprint() {
        let mut arena = open_arena();
        // Shell after advancing sits at (100, 100); footprint x 88..120, y 100..116.
        arena.bricks.push(Brick {
            position: Point::new(118.0, 78.0),
            destroyed: false,
        });
        arena.bricks.push(Brick {
            position: Point::new(120.0, 78.0),
            destroyed: false,
        });
        let mut tank = tank_at(TankId::ONE, 600.0, 600.0);
        let mut opponent = tank_at(TankId::TWO, 700.0, 700.0);
        tank.projectiles.push(Projectile::new(
            Point::new(100.0, 110.0),
            Point::new(0.0, -10.0),
            TankId::ONE,
        ));
        let impacts = tank.update_projectiles(&mut arena, &mut opponent);
        assert_eq!(impacts, vec![Impact::Bricks(1)]);
        assert!(arena.bricks[0].destroyed);
        assert!(!arena.bricks[1].destroyed);
    }

    #[test]
    fn test_shell_destroys_base() {
        let mut arena = open_arena();
        let index = arena.bases.iter().position(|b| b.marker == 'A').unwrap();
        let target = arena.bases[index].bounds();
        let mut tank = tank_at(TankId::ONE, 100.0, 100.0);
        let mut opponent = tank_at(TankId::TWO, 700.0, 100.0);
        tank.projectiles.push(Projectile::new(
            Point::new(target.x + 20.0, target.y - 15.0),
            Point::new(0.0, 10.0),
            TankId::ONE,
        ));
        let impacts = tank.update_projectiles(&mut arena, &mut opponent);
        assert_eq!(impacts, vec![Impact::Base(index)]);
        assert!(arena.bases[index].destroyed);
    }

    #[test]
    fn test_steel_absorbs_shell() {
        let mut arena = open_arena();
        arena.steel_walls.push(SteelWall {
            position: Point::new(320.0, 320.0),
        });
        let mut tank = tank_at(TankId::ONE, 100.0, 100.0);
        let mut opponent = tank_at(TankId::TWO, 700.0, 100.0);
        tank.projectiles.push(Projectile::new(
            Point::new(300.0, 330.0),
            Point::new(10.0, 0.0),
            TankId::ONE,
        ));
        let impacts = tank.update_projectiles(&mut arena, &mut opponent);
        assert_eq!(impacts, vec![Impact::SteelWall]);
        assert_eq!(arena.steel_walls.len(), 1);
    }

    #[test]
    fn test_shells_destroy_each_other() {
        let mut arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 100.0, 100.0);
        let mut opponent = tank_at(TankId::TWO, 700.0, 100.0);
        tank.projectiles.push(Projectile::new(
            Point::new(200.0, 500.0),
            Point::new(0.0, -10.0),
            TankId::ONE,
        ));
        opponent.projectiles.push(Projectile::new(
            Point::new(200.0, 485.0),
            Point::new(0.0, 10.0),
            TankId::TWO,
        ));
        let impacts = tank.update_projectiles(&mut arena, &mut opponent);
        assert_eq!(impacts, vec![Impact::Projectile]);
        assert!(tank.projectiles.is_empty());
        assert!(opponent.projectiles.is_empty());
    }

    #[test]
    fn test_destroyed_tank_freezes_its_shells() {
        let mut arena = open_arena();
        let mut tank = tank_at(TankId::ONE, 400.0, 400.0);
        let mut opponent = tank_at(TankId::TWO, 100.0, 100.0);
        tank.shoot(0);
        let before = tank.projectiles[0].position;
        tank.destroy();
        tank.update_projectiles(&mut arena, &mut opponent);
        assert_eq!(tank.projectiles[0].position, before);
    }

    #[test]
    fn test_decision_flag_only_on_new_point() {
        let arena = open_arena();
        // Center at (96, 96): decision point index 14.
        let mut tank = tank_at(TankId::ONE, 70.0, 70.0);
        tank.update_decision_cadence(&arena);
        assert!(tank.awaiting_decision);
        assert_eq!(tank.pending_decision_point, Some(14));
        tank.commit(keys_for(Direction::Right));
        assert!(!tank.awaiting_decision);
        assert_eq!(tank.last_decision_point, Some(14));

        tank.update_decision_cadence(&arena);
        assert!(!tank.awaiting_decision, "still on the consumed point");

        // 15 steps of 4px cross the cell without reaching the next point.
        for _ in 0..15 {
            tank.perform_action(tank.active_keys, &arena, None, 0);
            tank.update_decision_cadence(&arena);
            assert!(!tank.awaiting_decision);
        }
        tank.perform_action(tank.active_keys, &arena, None, 0);
        tank.update_decision_cadence(&arena);
        assert_approx_eq!(tank.center().x, 160.0);
        assert!(tank.awaiting_decision);
        assert_eq!(tank.pending_decision_point, Some(15));
    }

    #[test]
    fn test_split_borrow_helper() {
        let mut tanks = [tank_at(TankId::ONE, 0.0, 0.0), tank_at(TankId::TWO, 100.0, 0.0)];
        let (me, them) = tank_and_opponent(&mut tanks, TankId::TWO);
        assert_eq!(me.id, TankId::TWO);
        assert_eq!(them.id, TankId::ONE);
    }
}
