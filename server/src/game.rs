//! Authoritative simulation of a single match.
//!
//! A [`Game`] owns the one [`GameState`] of its match together with the arena,
//! the ball, both paddles and the score tracker. Each component reads and
//! writes only its own fields of that state.

use crate::arena::Arena;
use crate::ball::Ball;
use crate::paddle::{Controller, Paddle};
use crate::score::{Score, ScoreEvent};
use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{GameSettings, GameState, Key, Side, Status, FIELD_SIZE};

/// Longest step the engine will simulate in one tick, in seconds.
pub const MAX_DELTA: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct Game {
    settings: GameSettings,
    state: GameState,
    arena: Arena,
    ball: Ball,
    left: Paddle,
    right: Paddle,
    score: Score,
    rng: StdRng,
    last_timestamp: Option<u64>,
}

impl Game {
    pub fn new(settings: GameSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Builds a match with both paddles centred and the ball served.
    /// Out-of-range settings are replaced by the defaults.
    pub fn with_rng(settings: GameSettings, mut rng: StdRng) -> Self {
        let settings = settings.validated();
        let arena = Arena::new(&settings);
        let left = Paddle::new(Side::Left, &settings, &arena);
        let right = Paddle::new(Side::Right, &settings, &arena);
        let mut ball = Ball::new(&settings, &arena);

        let mut state = GameState::default();
        let centre = (FIELD_SIZE - settings.paddle_height) / 2.0;
        left.set_top(&mut state, centre);
        right.set_top(&mut state, centre);
        ball.reset(&mut state, &mut rng);

        Self {
            settings,
            state,
            arena,
            ball,
            left,
            right,
            score: Score::new(),
            rng,
            last_timestamp: None,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.state.status = status;
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn ball_mut(&mut self) -> &mut Ball {
        &mut self.ball
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn set_controller(&mut self, side: Side, controller: Controller) {
        self.paddle_mut(side).set_controller(controller);
    }

    /// Applies a key change to one paddle. It takes effect on the next tick.
    pub fn press(&mut self, side: Side, key: Key, pressed: bool) {
        self.paddle_mut(side).press(key, pressed);
    }

    /// Advances the match to `now_ms`. The first call only records the
    /// timestamp; later calls step by the elapsed time, capped at [`MAX_DELTA`].
    pub fn update(&mut self, now_ms: u64) -> Option<ScoreEvent> {
        let delta = match self.last_timestamp {
            None => 0.0,
            Some(previous) => now_ms.saturating_sub(previous) as f64 / 1000.0,
        };
        self.last_timestamp = Some(now_ms);

        let delta = if delta > MAX_DELTA {
            warn!(
                "Large delta time detected ({:.3}s), capping to {:.3}s",
                delta, MAX_DELTA
            );
            MAX_DELTA
        } else {
            delta
        };
        self.step(delta)
    }

    /// Runs one tick of `delta` seconds: ball, then paddles, then scoring.
    /// Does nothing unless the match is running.
    pub fn step(&mut self, delta: f64) -> Option<ScoreEvent> {
        if self.state.status != Status::Running {
            return None;
        }

        self.ball
            .update(&mut self.state, delta, &self.arena, &self.left, &self.right);

        let ball_center_y = self.ball.center_y(&self.state);
        self.left.update(&mut self.state, delta, ball_center_y);
        self.right.update(&mut self.state, delta, ball_center_y);

        self.score.update(&mut self.state, &mut self.ball, &mut self.rng)
    }
}
