//! Wire protocol and plain game data shared by the Pong server and its clients.
//!
//! All positions and sizes are percentages of a normalized 100x100 playing field.
//! Field names serialize in camelCase so the JSON form of every payload matches
//! what browser clients already expect (`ballPos`, `paddleL`, `scoreR`, ...).

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const PROTOCOL_VERSION: u32 = 1;
pub const TICK_RATE_HZ: u32 = 60;
pub const WINNING_SCORE: u32 = 11;
pub const FIELD_SIZE: f64 = 100.0;
/// Margin beyond the nominal field used for wall lines and scoring thresholds.
pub const OVERSCAN: f64 = 20.0;

pub const BALL_ACCEL_RANGE: RangeInclusive<f64> = 2.0..=2.0;
pub const BALL_SPEED_RANGE: RangeInclusive<f64> = 50.0..=80.0;
pub const BALL_WIDTH_RANGE: RangeInclusive<f64> = 1.5..=12.0;
pub const PADDLE_GAP_RANGE: RangeInclusive<f64> = 1.0..=8.0;
pub const PADDLE_HEIGHT_RANGE: RangeInclusive<f64> = 12.0..=25.0;
pub const PADDLE_SPEED_RANGE: RangeInclusive<f64> = 50.0..=80.0;
pub const PADDLE_WIDTH_RANGE: RangeInclusive<f64> = 1.0..=3.0;
pub const WALL_HEIGHT_RANGE: RangeInclusive<f64> = 2.0..=2.0;

/// External player identifier, owned by the account service.
pub type PlayerId = u32;
/// Opaque session code handed out by the server.
pub type GameId = String;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Lifecycle of a match as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Running,
    Paused,
    Finished,
    Aborted,
}

impl Status {
    /// True once the match can no longer change.
    pub fn is_over(self) -> bool {
        matches!(self, Status::Finished | Status::Aborted)
    }
}

/// Snapshot broadcast to both players every tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub ball_pos: Point,
    pub paddle_l: f64,
    pub paddle_r: f64,
    pub score_l: u32,
    pub score_r: u32,
    pub status: Status,
}

impl GameState {
    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.score_l,
            Side::Right => self.score_r,
        }
    }

    /// The side with the higher score, once the match has finished.
    pub fn winner(&self) -> Option<Side> {
        if self.status != Status::Finished || self.score_l == self.score_r {
            return None;
        }
        if self.score_l > self.score_r {
            Some(Side::Left)
        } else {
            Some(Side::Right)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub x: f64,
    pub y: f64,
}

impl AspectRatio {
    /// Horizontal over vertical extent; converts a vertical length from x-units into y-units.
    pub fn ratio(&self) -> f64 {
        self.x / self.y
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self { x: 4.0, y: 3.0 }
    }
}

/// Per-match configuration, also the shape of the create/join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub aspect_ratio: AspectRatio,
    pub ball_accel: f64,
    pub ball_speed: f64,
    pub ball_width: f64,
    pub computer: bool,
    pub paddle_gap: f64,
    pub paddle_height: f64,
    pub paddle_speed: f64,
    pub paddle_width: f64,
    pub side: Side,
    pub wall_height: f64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            ball_accel: 2.0,
            ball_speed: 60.0,
            ball_width: 2.5,
            computer: false,
            paddle_gap: 2.5,
            paddle_height: 20.0,
            paddle_speed: 60.0,
            paddle_width: 2.0,
            side: Side::Left,
            wall_height: 2.0,
        }
    }
}

impl GameSettings {
    /// Checks every numeric field against its allowed range.
    pub fn is_valid(&self) -> bool {
        self.aspect_ratio == AspectRatio::default()
            && BALL_ACCEL_RANGE.contains(&self.ball_accel)
            && BALL_SPEED_RANGE.contains(&self.ball_speed)
            && BALL_WIDTH_RANGE.contains(&self.ball_width)
            && PADDLE_GAP_RANGE.contains(&self.paddle_gap)
            && PADDLE_HEIGHT_RANGE.contains(&self.paddle_height)
            && PADDLE_SPEED_RANGE.contains(&self.paddle_speed)
            && PADDLE_WIDTH_RANGE.contains(&self.paddle_width)
            && WALL_HEIGHT_RANGE.contains(&self.wall_height)
    }

    /// Returns these settings if valid, otherwise the defaults.
    ///
    /// The `computer` flag selects the match mode rather than the geometry, so it
    /// survives the fallback.
    pub fn validated(self) -> Self {
        if self.is_valid() {
            self
        } else {
            Self {
                computer: self.computer,
                ..Self::default()
            }
        }
    }
}

/// Keys the server reacts to; anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    /// Halves paddle speed while held.
    Precision,
}

impl Key {
    pub fn parse(name: &str) -> Option<Key> {
        match name.to_ascii_lowercase().as_str() {
            "up" | "arrowup" | "w" => Some(Key::Up),
            "down" | "arrowdown" | "s" => Some(Key::Down),
            "shift" | "precision" => Some(Key::Precision),
            _ => None,
        }
    }
}

/// Returned for a mid-game join or reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLookup {
    pub game_settings: GameSettings,
    pub game_state: GameState,
}

/// Summary of a completed match, handed to external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub player_one_id: PlayerId,
    pub player_two_id: PlayerId,
    pub score_player_one: u32,
    pub score_player_two: u32,
    /// Milliseconds since the Unix epoch.
    pub start_time: u64,
    pub end_time: u64,
    pub time_played_seconds: u64,
    pub winner_id: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Available,
    InGame,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        player_id: PlayerId,
    },
    /// Join the oldest pending game, or create one when none is waiting.
    FindGame {
        settings: GameSettings,
    },
    CancelGame,
    Input {
        key: String,
        pressed: bool,
    },
    Lookup {
        game_id: GameId,
    },
    /// Keeps an idle connection (e.g. waiting for an opponent) from timing out.
    Heartbeat,
    Disconnect,

    Connected {
        player_id: PlayerId,
    },
    GameJoined {
        game_id: GameId,
        side: Side,
        settings: GameSettings,
    },
    State {
        game_id: GameId,
        state: GameState,
    },
    GameInfo {
        game_id: GameId,
        info: Option<GameLookup>,
    },
    Disconnected {
        reason: String,
    },
}
