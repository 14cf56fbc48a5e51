use crate::arena::Arena;
use crate::config::*;
use crate::snapshot::{BattleSnapshot, TankSnapshot};
use crate::types::TankId;

/// Flattens a `BattleSnapshot` into the fixed-width input of a policy.
///
/// Layout, in order:
/// - observing tank: 11 values, then 50 projectile slots of `(x, y)`
/// - opponent tank: same as above
/// - bases: `(x, y, destroyed)` per base
/// - bricks: `(x, y, destroyed)` per brick
/// - steel walls: `(x, y)` per wall
/// - elapsed seconds
///
/// Entity capacities are taken from the arena at construction time. Missing
/// entities are zero filled and surplus ones are dropped, so the width never
/// changes within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureEncoder {
    pub max_projectiles: usize,
    pub max_bases: usize,
    pub max_bricks: usize,
    pub max_steel_walls: usize,
}

impl FeatureEncoder {
    pub fn new(arena: &Arena) -> Self {
        FeatureEncoder {
            max_projectiles: MAX_PROJECTILE_SLOTS,
            max_bases: arena.bases.len(),
            max_bricks: arena.bricks.len(),
            max_steel_walls: arena.steel_walls.len(),
        }
    }

    pub fn input_dim(&self) -> usize {
        let per_tank = TANK_FEATURES + self.max_projectiles * 2;
        per_tank * 2 + self.max_bases * 3 + self.max_bricks * 3 + self.max_steel_walls * 2 + 1
    }

    pub fn encode(&self, snapshot: &BattleSnapshot, observer: TankId) -> Vec<f32> {
        let mut features = Vec::with_capacity(self.input_dim());
        let me = snapshot.tank(observer);
        let them = snapshot.tank(observer.opponent());

        self.push_tank(&mut features, me, them);
        self.push_tank(&mut features, them, me);

        push_padded(
            &mut features,
            snapshot
                .bases
                .iter()
                .map(|b| [b.position.x / SCREEN_WIDTH, b.position.y / SCREEN_HEIGHT, flag(b.destroyed)]),
            self.max_bases,
        );
        push_padded(
            &mut features,
            snapshot
                .bricks
                .iter()
                .map(|b| [b.position.x / SCREEN_WIDTH, b.position.y / SCREEN_HEIGHT, flag(b.destroyed)]),
            self.max_bricks,
        );
        push_padded(
            &mut features,
            snapshot
                .steel_walls
                .iter()
                .map(|w| [w.x / SCREEN_WIDTH, w.y / SCREEN_HEIGHT]),
            self.max_steel_walls,
        );
        features.push(snapshot.elapsed_secs);
        features
    }

    fn push_tank(&self, features: &mut Vec<f32>, tank: &TankSnapshot, other: &TankSnapshot) {
        features.push(tank.position.x / SCREEN_WIDTH);
        features.push(tank.position.y / SCREEN_HEIGHT);
        features.extend_from_slice(&tank.direction.one_hot());
        features.push(tank.distance_to_opponent / SCREEN_WIDTH);
        features.push(flag(tank.destroyed));
        features.push((other.center.x - tank.center.x) / SCREEN_WIDTH);
        features.push((other.center.y - tank.center.y) / SCREEN_HEIGHT);
        features.push(flag(tank.line_of_sight));

        push_padded(
            features,
            tank.projectiles
                .iter()
                .map(|p| [p.x / SCREEN_WIDTH, p.y / SCREEN_HEIGHT]),
            self.max_projectiles,
        );
    }
}

fn flag(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

// Writes exactly `slots` groups of N values, truncating or zero filling.
fn push_padded<const N: usize>(
    features: &mut Vec<f32>,
    groups: impl Iterator<Item = [f32; N]>,
    slots: usize,
) {
    let mut written = 0;
    for group in groups.take(slots) {
        features.extend_from_slice(&group);
        written += 1;
    }
    features.extend(std::iter::repeat_n(0.0, (slots - written) * N));
}
