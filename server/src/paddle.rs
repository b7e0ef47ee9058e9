//! Vertical paddles on either side of the field.
//!
//! A paddle's only mutable state is its `top`, which lives in the shared
//! [`GameState`] (`paddleL` or `paddleR`). Everything else is fixed geometry
//! derived from the match settings.

use crate::arena::Arena;
use crate::geometry::Segment;
use shared::{GameSettings, GameState, Key, Side, FIELD_SIZE};

/// Keys currently held by the player steering a paddle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
    pub precision: bool,
}

impl KeyState {
    fn direction(&self) -> f64 {
        match (self.up, self.down) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

/// What drives a paddle each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Keyboard(KeyState),
    /// Follows the ball's vertical centre.
    Computer,
}

#[derive(Debug, Clone)]
pub struct Paddle {
    side: Side,
    height: f64,
    width: f64,
    gap: f64,
    speed: f64,
    min_top: f64,
    max_top: f64,
    controller: Controller,
}

impl Paddle {
    pub fn new(side: Side, settings: &GameSettings, arena: &Arena) -> Self {
        Self {
            side,
            height: settings.paddle_height,
            width: settings.paddle_width,
            gap: settings.paddle_gap,
            speed: settings.paddle_speed,
            min_top: arena.upper.limit,
            max_top: arena.lower.limit - settings.paddle_height,
            controller: Controller::Keyboard(KeyState::default()),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn min_top(&self) -> f64 {
        self.min_top
    }

    pub fn max_top(&self) -> f64 {
        self.max_top
    }

    pub fn top(&self, state: &GameState) -> f64 {
        match self.side {
            Side::Left => state.paddle_l,
            Side::Right => state.paddle_r,
        }
    }

    /// Writes `top`, clamped into the arena.
    pub fn set_top(&self, state: &mut GameState, top: f64) {
        let top = top.clamp(self.min_top, self.max_top);
        match self.side {
            Side::Left => state.paddle_l = top,
            Side::Right => state.paddle_r = top,
        }
    }

    pub fn bottom(&self, state: &GameState) -> f64 {
        self.top(state) + self.height
    }

    pub fn center(&self, state: &GameState) -> f64 {
        self.top(state) + self.height / 2.0
    }

    pub fn left(&self) -> f64 {
        match self.side {
            Side::Left => self.gap,
            Side::Right => FIELD_SIZE - self.gap - self.width,
        }
    }

    pub fn right(&self) -> f64 {
        self.left() + self.width
    }

    /// x of the edge facing the ball.
    pub fn face(&self) -> f64 {
        match self.side {
            Side::Left => self.right(),
            Side::Right => self.left(),
        }
    }

    /// The ball-facing edge, spanning the paddle's height.
    pub fn line(&self, state: &GameState) -> Segment {
        Segment::vertical(self.face(), self.top(state), self.bottom(state))
    }

    pub fn controller(&self) -> Controller {
        self.controller
    }

    pub fn set_controller(&mut self, controller: Controller) {
        self.controller = controller;
    }

    /// Records a key change. Ignored while the computer is steering.
    pub fn press(&mut self, key: Key, pressed: bool) {
        if let Controller::Keyboard(keys) = &mut self.controller {
            match key {
                Key::Up => keys.up = pressed,
                Key::Down => keys.down = pressed,
                Key::Precision => keys.precision = pressed,
            }
        }
    }

    /// Shifts the paddle by `delta`. Does nothing when already resting on the
    /// bound it is moving towards.
    pub fn move_by(&self, state: &mut GameState, delta: f64) {
        let top = self.top(state);
        if (delta < 0.0 && top <= self.min_top) || (delta > 0.0 && top >= self.max_top) {
            return;
        }
        self.set_top(state, top + delta);
    }

    /// Advances the paddle by `delta` seconds according to its controller.
    pub fn update(&self, state: &mut GameState, delta: f64, ball_center_y: f64) {
        let (direction, precision) = match self.controller {
            Controller::Keyboard(keys) => (keys.direction(), keys.precision),
            Controller::Computer => self.track(state, ball_center_y),
        };
        if direction == 0.0 {
            return;
        }

        let speed = if precision { self.speed / 2.0 } else { self.speed };
        self.move_by(state, direction * speed * delta);
    }

    fn track(&self, state: &GameState, target: f64) -> (f64, bool) {
        let offset = target - self.center(state);
        let dead_zone = self.height / 8.0;
        if offset.abs() <= dead_zone {
            return (0.0, false);
        }
        (offset.signum(), offset.abs() < self.height / 2.0)
    }
}
