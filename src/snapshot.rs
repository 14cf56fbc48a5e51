use crate::arena::{line_of_sight, Arena};
use crate::tank::Tank;
use crate::types::*;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TankSnapshot {
    pub position: Point,
    pub center: Point,
    pub direction: Direction,
    pub projectiles: Vec<Point>,
    pub distance_to_opponent: f32, // Center to center, pixels
    pub destroyed: bool,
    pub line_of_sight: bool, // Clear shot at the opponent's center
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaseSnapshot {
    pub position: Point,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BrickSnapshot {
    pub position: Point,
    pub destroyed: bool,
}

/// Read-only view of the whole battle at one tick. Both agents observe the same one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleSnapshot {
    pub tanks: [TankSnapshot; 2], // Indexed by `TankId`
    pub bases: Vec<BaseSnapshot>,
    pub bricks: Vec<BrickSnapshot>,
    pub steel_walls: Vec<Point>,
    pub elapsed_secs: f32,
}

impl BattleSnapshot {
    pub fn capture(arena: &Arena, tanks: &[Tank; 2], elapsed_secs: f32) -> Self {
        let solid: Vec<Point> = arena
            .bricks
            .iter()
            .filter(|b| !b.destroyed)
            .map(|b| b.position)
            .chain(arena.steel_walls.iter().map(|w| w.position))
            .collect();
        let (c0, c1) = (tanks[0].center(), tanks[1].center());
        let distance = c0.distance(&c1);
        let visible = line_of_sight(c0, c1, &solid);

        let tank_view = |tank: &Tank| TankSnapshot {
            position: tank.position,
            center: tank.center(),
            direction: tank.direction,
            projectiles: tank.projectiles.iter().map(|p| p.position).collect(),
            distance_to_opponent: distance,
            destroyed: tank.destroyed,
            line_of_sight: visible,
        };

        BattleSnapshot {
            tanks: [tank_view(&tanks[0]), tank_view(&tanks[1])],
            bases: arena
                .bases
                .iter()
                .map(|b| BaseSnapshot {
                    position: b.position,
                    destroyed: b.destroyed,
                })
                .collect(),
            bricks: arena
                .bricks
                .iter()
                .map(|b| BrickSnapshot {
                    position: b.position,
                    destroyed: b.destroyed,
                })
                .collect(),
            steel_walls: arena.steel_walls.iter().map(|w| w.position).collect(),
            elapsed_secs,
        }
    }

    pub fn tank(&self, id: TankId) -> &TankSnapshot {
        &self.tanks[id.index()]
    }

    /// Center distance between the tanks divided by the arena width.
    pub fn normalized_distance(&self) -> f32 {
        crate::utils::normalized_distance(self.tanks[0].center, self.tanks[1].center)
    }
}
