use crate::arena::Arena;
use crate::config::{BASE_SIZE, PROJECTILE_SIZE, SCREEN_HEIGHT, SCREEN_WIDTH, TICKS_PER_SECOND, TILE_SIZE};
use crate::error::GameError;
use crate::game::Game;
use crate::tank::Tank;
use log::info;
use macroquad::prelude::*;

const BRICK_COLOR: Color = Color::new(0.62, 0.29, 0.16, 1.0);
const STEEL_COLOR: Color = Color::new(0.65, 0.67, 0.70, 1.0);
const BASE_COLOR: Color = Color::new(0.95, 0.80, 0.20, 1.0);
const RUBBLE_COLOR: Color = Color::new(0.25, 0.22, 0.20, 1.0);
const SIDE_COLORS: [Color; 2] = [
    Color::new(0.30, 0.80, 0.35, 1.0),
    Color::new(0.35, 0.55, 0.95, 1.0),
];
const BARREL_LENGTH: f32 = 14.0;

// Most frames run one tick; cap the catch-up after a stall
const MAX_TICKS_PER_FRAME: u32 = 8;

pub fn window_conf() -> Conf {
    Conf {
        window_title: "Tank Arena".to_owned(),
        window_width: SCREEN_WIDTH as i32,
        window_height: SCREEN_HEIGHT as i32,
        window_resizable: false,
        ..Default::default()
    }
}

// Draws the battle with plain rectangles
pub struct Renderer {
    show_hud: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer { show_hud: true }
    }

    pub fn draw_frame(&self, game: &Game) {
        clear_background(BLACK);
        self.draw_arena(&game.arena);
        for tank in &game.tanks {
            self.draw_tank(tank);
        }
        if self.show_hud {
            self.draw_hud(game);
        }
    }

    fn draw_arena(&self, arena: &Arena) {
        for brick in arena.bricks.iter().filter(|b| !b.destroyed) {
            draw_rectangle(brick.position.x, brick.position.y, TILE_SIZE, TILE_SIZE, BRICK_COLOR);
            draw_rectangle_lines(brick.position.x, brick.position.y, TILE_SIZE, TILE_SIZE, 1.0, BLACK);
        }
        for wall in &arena.steel_walls {
            draw_rectangle(wall.position.x, wall.position.y, TILE_SIZE, TILE_SIZE, STEEL_COLOR);
        }
        for base in &arena.bases {
            let color = if base.destroyed { RUBBLE_COLOR } else { BASE_COLOR };
            draw_rectangle(base.position.x, base.position.y, BASE_SIZE, BASE_SIZE, color);
            draw_text(
                &base.marker.to_string(),
                base.position.x + BASE_SIZE / 2.0 - 8.0,
                base.position.y + BASE_SIZE / 2.0 + 8.0,
                32.0,
                BLACK,
            );
        }
    }

    fn draw_tank(&self, tank: &Tank) {
        let color = SIDE_COLORS[tank.id.index()];
        for shell in &tank.projectiles {
            draw_rectangle(shell.position.x, shell.position.y, PROJECTILE_SIZE, PROJECTILE_SIZE, WHITE);
        }
        if tank.destroyed {
            draw_rectangle_lines(tank.position.x, tank.position.y, tank.width, tank.height, 2.0, RUBBLE_COLOR);
            return;
        }
        draw_rectangle(tank.position.x, tank.position.y, tank.width, tank.height, color);

        // Barrel shows the facing direction
        let center = tank.center();
        let (dx, dy) = tank.direction.delta();
        let reach = tank.width / 2.0 + BARREL_LENGTH;
        draw_line(center.x, center.y, center.x + dx * reach, center.y + dy * reach, 6.0, color);
    }

    fn draw_hud(&self, game: &Game) {
        let text = format!(
            "Round {}  {:.1}s  [R] reset  [H] hud  [Esc] quit",
            game.round,
            game.elapsed_secs()
        );
        draw_text(&text, 8.0, SCREEN_HEIGHT - 8.0, 20.0, WHITE);
    }

    pub fn toggle_hud(&mut self) {
        self.show_hud = !self.show_hud;
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the game in a window at a fixed tick rate until the window is closed or
/// Escape is pressed.
pub async fn run_interactive(mut game: Game) -> Result<(), GameError> {
    let mut renderer = Renderer::new();
    let tick_duration = 1.0 / TICKS_PER_SECOND as f32;
    let mut time_accumulator = 0.0;
    info!("Starting interactive loop...");

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        if is_key_pressed(KeyCode::R) {
            game.round_over()?;
            game.reset_round()?;
            time_accumulator = 0.0;
        }
        if is_key_pressed(KeyCode::H) {
            renderer.toggle_hud();
        }

        time_accumulator += get_frame_time();
        let mut ticks = 0;
        while time_accumulator >= tick_duration && ticks < MAX_TICKS_PER_FRAME {
            time_accumulator -= tick_duration;
            if let Some(outcome) = game.update()? {
                info!("Round ended: {}", outcome);
            }
            ticks += 1;
        }
        if ticks == MAX_TICKS_PER_FRAME {
            time_accumulator = 0.0;
        }

        renderer.draw_frame(&game);
        next_frame().await;
    }

    info!("Exiting Tank Arena.");
    Ok(())
}
