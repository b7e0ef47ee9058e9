//! Point scoring and match termination.

use crate::ball::Ball;
use log::info;
use rand::Rng;
use shared::{GameState, Side, Status, FIELD_SIZE, OVERSCAN, WINNING_SCORE};

/// What a call to [`Score::update`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEvent {
    /// The side scored and the ball was served again.
    Scored(Side),
    /// The side reached the winning score; the match is finished.
    MatchWon(Side),
}

#[derive(Debug, Clone)]
pub struct Score {
    winning_score: u32,
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}

impl Score {
    pub fn new() -> Self {
        Self {
            winning_score: WINNING_SCORE,
        }
    }

    pub fn winning_score(&self) -> u32 {
        self.winning_score
    }

    /// Awards a point once the ball has fully left the field past the overscan
    /// margin. Scores are frozen after the match is over.
    pub fn update<R: Rng + ?Sized>(
        &self,
        state: &mut GameState,
        ball: &mut Ball,
        rng: &mut R,
    ) -> Option<ScoreEvent> {
        if state.status.is_over() {
            return None;
        }

        let scorer = if ball.right(state) < -OVERSCAN {
            Side::Right
        } else if ball.left(state) > FIELD_SIZE + OVERSCAN {
            Side::Left
        } else {
            return None;
        };

        let points = match scorer {
            Side::Left => {
                state.score_l += 1;
                state.score_l
            }
            Side::Right => {
                state.score_r += 1;
                state.score_r
            }
        };

        if points >= self.winning_score {
            state.status = Status::Finished;
            info!(
                "Match won by {:?} side ({} - {})",
                scorer, state.score_l, state.score_r
            );
            Some(ScoreEvent::MatchWon(scorer))
        } else {
            ball.reset(state, rng);
            Some(ScoreEvent::Scored(scorer))
        }
    }
}
