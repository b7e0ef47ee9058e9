//! Ball motion and collision resolution.
//!
//! The ball's position is the top-left corner of its bounding box and lives in
//! the shared [`GameState`]. Direction is a unit vector in physical space; a
//! displacement of `d` along it moves `d * dx` horizontally and
//! `d * dy * aspect_ratio` vertically, because the field is 100x100 percentage
//! units but physically wider than tall.
//!
//! Each update sweeps the ball's leading edges along its path, takes the
//! nearest wall or paddle hit, reflects, and continues with the remaining
//! distance until the path is clear. That lets a fast ball bounce several
//! times within one tick without tunnelling.

use crate::arena::{Arena, Wall};
use crate::geometry::{distance_along, intersect, Segment};
use crate::paddle::Paddle;
use log::debug;
use rand::Rng;
use shared::{GameSettings, GameState, Point, Side, FIELD_SIZE};

/// Serves stay within this many degrees of horizontal.
pub const MAX_SERVE_ANGLE_DEG: f64 = 72.0;
/// Return angle when the ball strikes the very end of a paddle.
pub const MAX_BOUNCE_ANGLE_DEG: f64 = 80.0;
/// Return angle when a paddle end pushes into the ball.
pub const FLUSH_DEFLECT_ANGLE_DEG: f64 = 60.0;
const MAX_CONTACTS_PER_TICK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Obstacle {
    Wall(Bound),
    Paddle(Side),
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    obstacle: Obstacle,
    point: Point,
    distance: f64,
}

/// Remaining motion of the ball within one tick.
#[derive(Debug, Clone, Copy)]
struct Sweep {
    origin: Point,
    remaining: f64,
}

#[derive(Debug, Clone)]
pub struct Ball {
    direction: Point,
    speed: f64,
    default_speed: f64,
    acceleration: f64,
    diameter_x: f64,
    diameter_y: f64,
    aspect_ratio: f64,
    last_serve_x: f64,
    has_hit_paddle: bool,
}

impl Ball {
    pub fn new(settings: &GameSettings, arena: &Arena) -> Self {
        let aspect_ratio = arena.aspect_ratio();
        Self {
            direction: Point::new(1.0, 0.0),
            speed: settings.ball_speed,
            default_speed: settings.ball_speed,
            acceleration: settings.ball_accel,
            diameter_x: settings.ball_width,
            diameter_y: settings.ball_width * aspect_ratio,
            aspect_ratio,
            last_serve_x: 0.0,
            has_hit_paddle: false,
        }
    }

    pub fn direction(&self) -> Point {
        self.direction
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn diameter_x(&self) -> f64 {
        self.diameter_x
    }

    pub fn diameter_y(&self) -> f64 {
        self.diameter_y
    }

    /// Whether the last update returned the ball off a paddle.
    pub fn has_hit_paddle(&self) -> bool {
        self.has_hit_paddle
    }

    pub fn left(&self, state: &GameState) -> f64 {
        state.ball_pos.x
    }

    pub fn right(&self, state: &GameState) -> f64 {
        state.ball_pos.x + self.diameter_x
    }

    pub fn top(&self, state: &GameState) -> f64 {
        state.ball_pos.y
    }

    pub fn bottom(&self, state: &GameState) -> f64 {
        state.ball_pos.y + self.diameter_y
    }

    pub fn center_y(&self, state: &GameState) -> f64 {
        state.ball_pos.y + self.diameter_y / 2.0
    }

    /// Sets direction (normalized) and speed directly.
    pub fn launch(&mut self, direction: Point, speed: f64) {
        let magnitude = (direction.x * direction.x + direction.y * direction.y).sqrt();
        if magnitude > 0.0 {
            self.direction = Point::new(direction.x / magnitude, direction.y / magnitude);
        }
        self.speed = speed;
    }

    /// Centres the ball and serves it at a random angle, towards the opposite
    /// side from the previous serve.
    pub fn reset<R: Rng + ?Sized>(&mut self, state: &mut GameState, rng: &mut R) {
        state.ball_pos = Point::new(
            (FIELD_SIZE - self.diameter_x) / 2.0,
            (FIELD_SIZE - self.diameter_y) / 2.0,
        );
        self.speed = self.default_speed;
        self.has_hit_paddle = false;

        let sign = if self.last_serve_x == 0.0 {
            if rng.gen_bool(0.5) {
                1.0
            } else {
                -1.0
            }
        } else {
            -self.last_serve_x
        };
        let angle = rng
            .gen_range(-MAX_SERVE_ANGLE_DEG..=MAX_SERVE_ANGLE_DEG)
            .to_radians();
        self.direction = Point::new(sign * angle.cos(), angle.sin());
        self.last_serve_x = sign;
    }

    /// Advances the ball by `delta` seconds, resolving every wall and paddle
    /// contact along the way.
    pub fn update(
        &mut self,
        state: &mut GameState,
        delta: f64,
        arena: &Arena,
        left: &Paddle,
        right: &Paddle,
    ) {
        self.has_hit_paddle = false;
        let distance = self.speed * delta;
        if distance <= 0.0 {
            return;
        }

        let mut sweep = Sweep {
            origin: state.ball_pos,
            remaining: distance,
        };
        let target = self.advance(sweep.origin, distance);
        if !self.may_collide(state, sweep.origin, target, arena, left, right) {
            state.ball_pos = target;
            return;
        }

        let contacts = self.resolve(state, &mut sweep, arena, left, right);
        if contacts == 0 {
            if let Some(paddle) = [left, right]
                .into_iter()
                .find(|paddle| self.is_flush(state, sweep.origin, paddle))
            {
                self.deflect_flush(state, &mut sweep, arena, paddle);
                self.resolve(state, &mut sweep, arena, left, right);
            }
        }

        if self.has_hit_paddle {
            self.speed += self.acceleration;
        }
        state.ball_pos = self.advance(sweep.origin, sweep.remaining);
    }

    fn advance(&self, origin: Point, distance: f64) -> Point {
        Point::new(
            origin.x + distance * self.direction.x,
            origin.y + distance * self.direction.y * self.aspect_ratio,
        )
    }

    /// Bounding check over the whole swept box; false means the straight move is safe.
    fn may_collide(
        &self,
        state: &GameState,
        from: Point,
        to: Point,
        arena: &Arena,
        left: &Paddle,
        right: &Paddle,
    ) -> bool {
        let min_x = from.x.min(to.x);
        let max_x = from.x.max(to.x) + self.diameter_x;
        let min_y = from.y.min(to.y);
        let max_y = from.y.max(to.y) + self.diameter_y;

        if min_y < arena.upper.limit || max_y > arena.lower.limit {
            return true;
        }
        [left, right].into_iter().any(|paddle| {
            min_x <= paddle.right()
                && max_x >= paddle.left()
                && min_y <= paddle.bottom(state)
                && max_y >= paddle.top(state)
        })
    }

    fn resolve(
        &mut self,
        state: &GameState,
        sweep: &mut Sweep,
        arena: &Arena,
        left: &Paddle,
        right: &Paddle,
    ) -> usize {
        let mut contacts = 0;
        while sweep.remaining > 0.0 {
            if contacts == MAX_CONTACTS_PER_TICK {
                debug!("Ball contact limit reached, holding position for this tick");
                sweep.remaining = 0.0;
                break;
            }

            let wall = self.wall_contact(sweep, arena);
            let paddle = self.paddle_contact(state, sweep, left, right);
            let contact = match (wall, paddle) {
                (Some(wall), Some(paddle)) => {
                    if paddle.distance <= wall.distance {
                        paddle
                    } else {
                        wall
                    }
                }
                (Some(contact), None) | (None, Some(contact)) => contact,
                (None, None) => break,
            };

            match contact.obstacle {
                Obstacle::Wall(bound) => self.bounce_off_wall(sweep, contact, bound),
                Obstacle::Paddle(Side::Left) => self.bounce_off_paddle(state, sweep, contact, left),
                Obstacle::Paddle(Side::Right) => {
                    self.bounce_off_paddle(state, sweep, contact, right)
                }
            }
            contacts += 1;
        }
        contacts
    }

    /// Sweeps the leading horizontal edge (top when rising, bottom when falling)
    /// against the wall ahead.
    fn wall_contact(&self, sweep: &Sweep, arena: &Arena) -> Option<Contact> {
        let (wall, edge, bound): (Wall, f64, Bound) = if self.direction.y < 0.0 {
            (arena.upper, 0.0, Bound::Upper)
        } else if self.direction.y > 0.0 {
            (arena.lower, self.diameter_y, Bound::Lower)
        } else {
            return None;
        };

        let start = Point::new(sweep.origin.x, sweep.origin.y + edge);
        let path = Segment::new(start, self.advance(start, sweep.remaining));
        intersect(&path, &wall.line).map(|point| Contact {
            obstacle: Obstacle::Wall(bound),
            point,
            distance: distance_along(point, start, self.aspect_ratio),
        })
    }

    /// Sweeps the leading vertical edge against the face of the paddle ahead.
    /// The face is extended upwards by one ball height so that the top-corner
    /// path registers any overlap between the ball and the paddle.
    fn paddle_contact(
        &self,
        state: &GameState,
        sweep: &Sweep,
        left: &Paddle,
        right: &Paddle,
    ) -> Option<Contact> {
        let (paddle, edge) = if self.direction.x < 0.0 {
            (left, 0.0)
        } else if self.direction.x > 0.0 {
            (right, self.diameter_x)
        } else {
            return None;
        };

        let start = Point::new(sweep.origin.x + edge, sweep.origin.y);
        let path = Segment::new(start, self.advance(start, sweep.remaining));
        let face = Segment::vertical(
            paddle.face(),
            paddle.top(state) - self.diameter_y,
            paddle.bottom(state),
        );
        intersect(&path, &face).map(|point| Contact {
            obstacle: Obstacle::Paddle(paddle.side()),
            point,
            distance: distance_along(point, start, self.aspect_ratio),
        })
    }

    fn bounce_off_wall(&mut self, sweep: &mut Sweep, contact: Contact, bound: Bound) {
        self.direction.y = -self.direction.y;
        let y = match bound {
            Bound::Upper => contact.point.y,
            Bound::Lower => contact.point.y - self.diameter_y,
        };
        sweep.origin = Point::new(contact.point.x, y);
        sweep.remaining = (sweep.remaining - contact.distance).max(0.0);
    }

    /// Return angle grows linearly from the paddle's centre towards its ends.
    fn bounce_off_paddle(
        &mut self,
        state: &GameState,
        sweep: &mut Sweep,
        contact: Contact,
        paddle: &Paddle,
    ) {
        let center = contact.point.y + self.diameter_y / 2.0;
        let relative = (2.0 * (center - paddle.top(state)) / paddle.height() - 1.0).clamp(-1.0, 1.0);
        let angle = (relative * MAX_BOUNCE_ANGLE_DEG).to_radians();
        let (away, x) = match paddle.side() {
            Side::Left => (1.0, contact.point.x),
            Side::Right => (-1.0, contact.point.x - self.diameter_x),
        };

        self.direction = Point::new(away * angle.cos(), angle.sin());
        self.has_hit_paddle = true;
        sweep.origin = Point::new(x, contact.point.y);
        sweep.remaining = (sweep.remaining - contact.distance).max(0.0);
    }

    /// The ball already overlaps the paddle's box while still heading into it,
    /// which happens when a paddle end is driven into the ball from above or below.
    fn is_flush(&self, state: &GameState, origin: Point, paddle: &Paddle) -> bool {
        let heading_in = match paddle.side() {
            Side::Left => self.direction.x < 0.0,
            Side::Right => self.direction.x > 0.0,
        };
        heading_in
            && origin.x < paddle.right()
            && origin.x + self.diameter_x > paddle.left()
            && origin.y < paddle.bottom(state)
            && origin.y + self.diameter_y > paddle.top(state)
    }

    /// Sends the ball out over the end of the paddle it overlaps and clears it
    /// of the paddle, without leaving the field.
    fn deflect_flush(&mut self, state: &GameState, sweep: &mut Sweep, arena: &Arena, paddle: &Paddle) {
        let angle = FLUSH_DEFLECT_ANGLE_DEG.to_radians();
        let away = match paddle.side() {
            Side::Left => 1.0,
            Side::Right => -1.0,
        };
        let upper_half = sweep.origin.y + self.diameter_y / 2.0 < paddle.center(state);
        let (vertical, y) = if upper_half {
            (-1.0, paddle.top(state) - self.diameter_y)
        } else {
            (1.0, paddle.bottom(state))
        };
        self.direction = Point::new(away * angle.cos(), vertical * angle.sin());

        let min_y = arena.upper.limit;
        let max_y = arena.lower.limit - self.diameter_y;
        let y = if y < min_y {
            self.direction.y = -self.direction.y;
            min_y
        } else if y > max_y {
            self.direction.y = -self.direction.y;
            max_y
        } else {
            y
        };

        self.has_hit_paddle = true;
        sweep.origin = Point::new(sweep.origin.x, y);
    }
}
