//! Game session lifecycle.
//!
//! Every session moves through `pending -> running -> {finished | aborted}`.
//! The [`SessionManager`] owns all live sessions and the FIFO queue of pending
//! ones, advances every running game once per tick, and hands finished
//! matches to storage through a [`MatchSink`].

use crate::game::Game;
use crate::paddle::Controller;
use crate::store::{MatchSink, StoreCommand};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    GameId, GameLookup, GameSettings, GameState, Key, MatchRecord, PlayerId, PlayerStatus, Side,
    Status,
};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Characters used in session ids. Look-alikes (0/O, 1/I) are left out.
const ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ID_LENGTH: usize = 6;
pub const MAX_ID_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Every generated id collided with a live session.
    IdSpaceExhausted { attempts: u32 },
    /// The player already belongs to a live session.
    PlayerBusy(PlayerId),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::IdSpaceExhausted { attempts } => {
                write!(f, "no free session id after {} attempts", attempts)
            }
            SessionError::PlayerBusy(player_id) => {
                write!(f, "player {} is already in a game", player_id)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Draws random ids until one is not `taken`, giving up after
/// [`MAX_ID_ATTEMPTS`] tries.
pub fn generate_id<R, F>(rng: &mut R, taken: F, length: usize) -> Result<GameId, SessionError>
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    for _ in 0..MAX_ID_ATTEMPTS {
        let id: GameId = (0..length)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        if !taken(&id) {
            return Ok(id);
        }
    }
    Err(SessionError::IdSpaceExhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}

/// State to push to the human players of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub game_id: GameId,
    pub recipients: Vec<PlayerId>,
    pub state: GameState,
}

#[derive(Debug)]
pub struct GameSession {
    pub id: GameId,
    pub player_one: PlayerId,
    pub player_two: Option<PlayerId>,
    /// Paddle steered by player one; player two gets the other one.
    pub player_one_side: Side,
    pub vs_computer: bool,
    pub game: Game,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub started_at: Option<u64>,
}

impl GameSession {
    pub fn side_of(&self, player_id: PlayerId) -> Option<Side> {
        if player_id == self.player_one {
            Some(self.player_one_side)
        } else if self.player_two == Some(player_id) {
            Some(self.player_one_side.opposite())
        } else {
            None
        }
    }

    pub fn player_on(&self, side: Side) -> Option<PlayerId> {
        if side == self.player_one_side {
            Some(self.player_one)
        } else {
            self.player_two
        }
    }

    /// Human players of this session.
    pub fn players(&self) -> Vec<PlayerId> {
        std::iter::once(self.player_one)
            .chain(self.player_two)
            .collect()
    }

    fn broadcast(&self) -> Broadcast {
        Broadcast {
            game_id: self.id.clone(),
            recipients: self.players(),
            state: self.game.state().clone(),
        }
    }

    /// Result of a finished match between two people. Computer games and
    /// unfinished ones produce nothing.
    fn record(&self, now: u64) -> Option<MatchRecord> {
        let player_two = self.player_two?;
        let state = self.game.state();
        let winner = state.winner()?;
        let started_at = self.started_at.unwrap_or(self.created_at);

        Some(MatchRecord {
            player_one_id: self.player_one,
            player_two_id: player_two,
            score_player_one: state.score(self.player_one_side),
            score_player_two: state.score(self.player_one_side.opposite()),
            start_time: started_at,
            end_time: now,
            time_played_seconds: now.saturating_sub(started_at) / 1000,
            winner_id: if winner == self.player_one_side {
                self.player_one
            } else {
                player_two
            },
        })
    }
}

pub struct SessionManager {
    sessions: HashMap<GameId, GameSession>,
    /// Pending session ids, oldest first.
    pending: VecDeque<GameId>,
    /// Which live session each human player belongs to.
    players: HashMap<PlayerId, GameId>,
    sink: Box<dyn MatchSink>,
    rng: StdRng,
    id_length: usize,
}

impl SessionManager {
    pub fn new(sink: impl MatchSink + 'static) -> Self {
        Self::with_rng(sink, StdRng::from_entropy())
    }

    /// Deterministic ids and serves, for tests and replays.
    pub fn with_seed(sink: impl MatchSink + 'static, seed: u64) -> Self {
        Self::with_rng(sink, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sink: impl MatchSink + 'static, rng: StdRng) -> Self {
        Self {
            sessions: HashMap::new(),
            pending: VecDeque::new(),
            players: HashMap::new(),
            sink: Box::new(sink),
            rng,
            id_length: ID_LENGTH,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn session(&self, game_id: &str) -> Option<&GameSession> {
        self.sessions.get(game_id)
    }

    pub fn session_of(&self, player_id: PlayerId) -> Option<&GameSession> {
        self.players
            .get(&player_id)
            .and_then(|game_id| self.sessions.get(game_id))
    }

    /// Creates a session with `player_id` as player one. Invalid settings are
    /// replaced by the defaults. A game against the computer starts running
    /// right away; any other waits in the pending queue.
    pub fn create_game(
        &mut self,
        settings: GameSettings,
        player_id: PlayerId,
        now: u64,
    ) -> Result<GameId, SessionError> {
        if self.players.contains_key(&player_id) {
            return Err(SessionError::PlayerBusy(player_id));
        }

        if !settings.is_valid() {
            warn!(
                "Player {} sent invalid game settings, using defaults",
                player_id
            );
        }
        let settings = settings.validated();
        let sessions = &self.sessions;
        let id = generate_id(&mut self.rng, |id| sessions.contains_key(id), self.id_length)?;

        let vs_computer = settings.computer;
        let player_one_side = settings.side;
        let mut game = Game::with_rng(settings, StdRng::seed_from_u64(self.rng.gen()));
        let mut started_at = None;

        if vs_computer {
            game.set_controller(player_one_side.opposite(), Controller::Computer);
            game.set_status(Status::Running);
            started_at = Some(now);
            self.sink.submit(StoreCommand::SetStatus {
                player_id,
                status: PlayerStatus::InGame,
            });
            info!("Player {} started game {} against the computer", player_id, id);
        } else {
            self.pending.push_back(id.clone());
            info!("Player {} created pending game {}", player_id, id);
        }

        self.players.insert(player_id, id.clone());
        self.sessions.insert(
            id.clone(),
            GameSession {
                id: id.clone(),
                player_one: player_id,
                player_two: None,
                player_one_side,
                vs_computer,
                game,
                created_at: now,
                started_at,
            },
        );
        Ok(id)
    }

    /// Joins the oldest pending session as player two and starts it.
    pub fn join_pending_game(&mut self, player_id: PlayerId, now: u64) -> Option<GameId> {
        if self.players.contains_key(&player_id) {
            return None;
        }

        let index = self.pending.iter().position(|id| {
            self.sessions
                .get(id)
                .map_or(false, |session| session.player_one != player_id)
        })?;
        let id = self.pending.remove(index)?;
        let session = self.sessions.get_mut(&id)?;

        session.player_two = Some(player_id);
        session.started_at = Some(now);
        session.game.set_status(Status::Running);
        self.players.insert(player_id, id.clone());

        for player in [session.player_one, player_id] {
            self.sink.submit(StoreCommand::SetStatus {
                player_id: player,
                status: PlayerStatus::InGame,
            });
        }
        info!(
            "Player {} joined game {} against player {}",
            player_id, id, session.player_one
        );
        Some(id)
    }

    /// Joins a waiting game when possible, otherwise creates one.
    pub fn find_game(
        &mut self,
        settings: GameSettings,
        player_id: PlayerId,
        now: u64,
    ) -> Result<GameId, SessionError> {
        if !settings.computer {
            if let Some(id) = self.join_pending_game(player_id, now) {
                return Ok(id);
            }
        }
        self.create_game(settings, player_id, now)
    }

    /// Withdraws the pending session created by `player_id`.
    pub fn cancel_pending_game(&mut self, player_id: PlayerId) -> bool {
        let Some(id) = self.players.get(&player_id).cloned() else {
            return false;
        };
        let is_pending = self
            .sessions
            .get(&id)
            .map_or(false, |session| session.game.status() == Status::Pending);
        if !is_pending {
            return false;
        }

        self.remove_session(&id);
        info!("Player {} cancelled pending game {}", player_id, id);
        true
    }

    /// Ends the running session of `player_id` without a result. The returned
    /// broadcast carries the `aborted` state for whoever is left.
    pub fn abort_game(&mut self, player_id: PlayerId) -> Option<Broadcast> {
        let id = self.players.get(&player_id)?.clone();
        let session = self.sessions.get_mut(&id)?;
        if session.game.status() != Status::Running {
            return None;
        }

        session.game.set_status(Status::Aborted);
        let broadcast = session.broadcast();
        self.remove_session(&id);
        for player in &broadcast.recipients {
            self.sink.submit(StoreCommand::SetStatus {
                player_id: *player,
                status: PlayerStatus::Available,
            });
        }
        info!("Game {} aborted, player {} left", id, player_id);
        Some(broadcast)
    }

    /// Cancels or aborts whatever session the player is in.
    pub fn handle_disconnect(&mut self, player_id: PlayerId) -> Option<Broadcast> {
        if self.cancel_pending_game(player_id) {
            return None;
        }
        self.abort_game(player_id)
    }

    /// Forwards a key change to the player's paddle. Unknown players, stopped
    /// games and computer-driven paddles ignore it.
    pub fn press(&mut self, player_id: PlayerId, key: Key, pressed: bool) -> bool {
        let Some(id) = self.players.get(&player_id) else {
            return false;
        };
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        let Some(side) = session.side_of(player_id) else {
            return false;
        };
        if session.game.status() != Status::Running {
            return false;
        }

        session.game.press(side, key, pressed);
        true
    }

    pub fn lookup(&self, game_id: &str) -> Option<GameLookup> {
        self.sessions.get(game_id).map(|session| GameLookup {
            game_settings: session.game.settings().clone(),
            game_state: session.game.state().clone(),
        })
    }

    /// Drops pending sessions nobody joined within `max_age_ms`. Their
    /// creators get the session's final `aborted` state.
    pub fn expire_pending(&mut self, now: u64, max_age_ms: u64) -> Vec<Broadcast> {
        let expired: Vec<GameId> = self
            .pending
            .iter()
            .filter(|id| {
                self.sessions
                    .get(*id)
                    .map_or(true, |session| now.saturating_sub(session.created_at) > max_age_ms)
            })
            .cloned()
            .collect();

        let mut broadcasts = Vec::new();
        for id in expired {
            if let Some(mut session) = self.remove_session(&id) {
                session.game.set_status(Status::Aborted);
                info!("Pending game {} expired", id);
                broadcasts.push(session.broadcast());
            }
        }
        broadcasts
    }

    /// Advances every running session to `now`. Finished matches are recorded
    /// and removed; their last state is still part of the returned broadcasts.
    pub fn tick(&mut self, now: u64) -> Vec<Broadcast> {
        let mut broadcasts = Vec::with_capacity(self.sessions.len());
        let mut finished = Vec::new();

        for session in self.sessions.values_mut() {
            if session.game.status() != Status::Running {
                continue;
            }
            if let Some(event) = session.game.update(now) {
                debug!("Game {}: {:?}", session.id, event);
            }
            broadcasts.push(session.broadcast());
            if session.game.status() == Status::Finished {
                finished.push(session.id.clone());
            }
        }

        for id in finished {
            self.finish(&id, now);
        }
        broadcasts
    }

    fn finish(&mut self, id: &str, now: u64) {
        let Some(session) = self.remove_session(id) else {
            return;
        };
        let state = session.game.state();
        info!(
            "Game {} finished {} - {}",
            id, state.score_l, state.score_r
        );

        match session.record(now) {
            Some(record) => self.sink.submit(StoreCommand::SaveMatch(record)),
            None if session.vs_computer => debug!("Game {} was against the computer", id),
            None => warn!("Game {} finished without a result to record", id),
        }
        for player in session.players() {
            self.sink.submit(StoreCommand::SetStatus {
                player_id: player,
                status: PlayerStatus::Available,
            });
        }
    }

    fn remove_session(&mut self, id: &str) -> Option<GameSession> {
        let session = self.sessions.remove(id)?;
        self.pending.retain(|pending| pending != id);
        for player in session.players() {
            if self.players.get(&player).map(String::as_str) == Some(id) {
                self.players.remove(&player);
            }
        }
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Point, WINNING_SCORE};
    use tokio::sync::mpsc;

    fn manager() -> (SessionManager, mpsc::UnboundedReceiver<StoreCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionManager::with_seed(tx, 11), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StoreCommand>) -> Vec<StoreCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn saved(commands: &[StoreCommand]) -> Vec<MatchRecord> {
        commands
            .iter()
            .filter_map(|command| match command {
                StoreCommand::SaveMatch(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_generate_id_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = generate_id(&mut rng, |_| false, ID_LENGTH).unwrap();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_id_gives_up() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = generate_id(&mut rng, |_| true, ID_LENGTH);
        assert_eq!(
            result,
            Err(SessionError::IdSpaceExhausted {
                attempts: MAX_ID_ATTEMPTS
            })
        );
    }

    #[test]
    fn test_create_then_join_runs_game() {
        let (mut manager, mut rx) = manager();
        let id = manager
            .create_game(GameSettings::default(), 1, 1_000)
            .unwrap();
        assert_eq!(manager.session(&id).unwrap().game.status(), Status::Pending);
        assert_eq!(manager.pending_len(), 1);

        let joined = manager.join_pending_game(2, 2_000);
        assert_eq!(joined.as_deref(), Some(id.as_str()));

        let session = manager.session(&id).unwrap();
        assert_eq!(session.game.status(), Status::Running);
        assert_eq!(session.player_one, 1);
        assert_eq!(session.player_two, Some(2));
        assert_eq!(session.side_of(2), Some(Side::Right));
        assert_eq!(session.player_on(Side::Left), Some(1));
        assert_eq!(manager.pending_len(), 0);

        let commands = drain(&mut rx);
        assert!(commands.contains(&StoreCommand::SetStatus {
            player_id: 2,
            status: PlayerStatus::InGame
        }));
    }

    #[test]
    fn test_left_side_wins_and_is_recorded() {
        let (mut manager, mut rx) = manager();
        let id = manager
            .create_game(GameSettings::default(), 1, 1_000)
            .unwrap();
        manager.join_pending_game(2, 1_000);

        let mut now = 1_000;
        for _ in 0..WINNING_SCORE {
            if let Some(session) = manager.sessions.get_mut(&id) {
                session.game.state_mut().ball_pos = Point::new(125.0, 50.0);
            }
            now += 16;
            manager.tick(now);
        }

        assert!(manager.session(&id).is_none());
        assert!(manager.is_empty());
        let records = saved(&drain(&mut rx));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].player_one_id, 1);
        assert_eq!(records[0].player_two_id, 2);
        assert_eq!(records[0].score_player_one, WINNING_SCORE);
        assert_eq!(records[0].score_player_two, 0);
        assert_eq!(records[0].winner_id, 1);
        assert_eq!(records[0].start_time, 1_000);
        assert_eq!(records[0].end_time, now);
    }

    #[test]
    fn test_scores_follow_player_sides() {
        let (mut manager, mut rx) = manager();
        let settings = GameSettings {
            side: Side::Right,
            ..GameSettings::default()
        };
        let id = manager.create_game(settings, 1, 0).unwrap();
        manager.join_pending_game(2, 0);

        for step in 0..WINNING_SCORE as u64 {
            if let Some(session) = manager.sessions.get_mut(&id) {
                session.game.state_mut().ball_pos = Point::new(125.0, 50.0);
            }
            manager.tick(61_000 + step);
        }

        let records = saved(&drain(&mut rx));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score_player_one, 0);
        assert_eq!(records[0].score_player_two, WINNING_SCORE);
        assert_eq!(records[0].winner_id, 2);
        assert_eq!(records[0].time_played_seconds, 61);
    }

    #[test]
    fn test_invalid_settings_fall_back_to_defaults() {
        let (mut manager, _rx) = manager();
        let settings = GameSettings {
            ball_speed: 999.0,
            ..GameSettings::default()
        };
        let id = manager.create_game(settings, 1, 0).unwrap();
        let lookup = manager.lookup(&id).unwrap();
        assert_eq!(lookup.game_settings.ball_speed, 60.0);
        assert_eq!(lookup.game_state.status, Status::Pending);
    }

    #[test]
    fn test_join_is_fifo() {
        let (mut manager, _rx) = manager();
        let first = manager.create_game(GameSettings::default(), 1, 0).unwrap();
        let second = manager.create_game(GameSettings::default(), 2, 5).unwrap();

        assert_eq!(manager.join_pending_game(3, 10), Some(first));
        assert_eq!(manager.join_pending_game(4, 10), Some(second));
        assert_eq!(manager.join_pending_game(5, 10), None);
    }

    #[test]
    fn test_cannot_join_own_game() {
        let (mut manager, _rx) = manager();
        manager.create_game(GameSettings::default(), 1, 0).unwrap();
        assert_eq!(manager.join_pending_game(1, 0), None);
        assert_eq!(
            manager.create_game(GameSettings::default(), 1, 0),
            Err(SessionError::PlayerBusy(1))
        );
    }

    #[test]
    fn test_find_game_pairs_players() {
        let (mut manager, _rx) = manager();
        let a = manager.find_game(GameSettings::default(), 1, 0).unwrap();
        let b = manager.find_game(GameSettings::default(), 2, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.session(&a).unwrap().game.status(), Status::Running);
    }

    #[test]
    fn test_cancel_pending_game() {
        let (mut manager, _rx) = manager();
        let id = manager.create_game(GameSettings::default(), 1, 0).unwrap();

        assert!(!manager.cancel_pending_game(2));
        assert!(manager.cancel_pending_game(1));
        assert!(manager.lookup(&id).is_none());
        assert_eq!(manager.pending_len(), 0);
        assert!(manager.session_of(1).is_none());
    }

    #[test]
    fn test_cancel_does_not_touch_running_game() {
        let (mut manager, _rx) = manager();
        manager.create_game(GameSettings::default(), 1, 0).unwrap();
        manager.join_pending_game(2, 0);
        assert!(!manager.cancel_pending_game(1));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_disconnect_aborts_without_record() {
        let (mut manager, mut rx) = manager();
        let id = manager.create_game(GameSettings::default(), 1, 0).unwrap();
        manager.join_pending_game(2, 0);
        manager.tick(16);
        drain(&mut rx);

        let broadcast = manager.handle_disconnect(2).unwrap();
        assert_eq!(broadcast.game_id, id);
        assert_eq!(broadcast.state.status, Status::Aborted);
        assert_eq!(broadcast.recipients, vec![1, 2]);
        assert!(manager.is_empty());

        let commands = drain(&mut rx);
        assert!(saved(&commands).is_empty());
        assert!(commands.contains(&StoreCommand::SetStatus {
            player_id: 1,
            status: PlayerStatus::Available
        }));

        // Nothing left to abort.
        assert!(manager.abort_game(1).is_none());
    }

    #[test]
    fn test_computer_game_runs_immediately_and_is_not_recorded() {
        let (mut manager, mut rx) = manager();
        let settings = GameSettings {
            computer: true,
            ..GameSettings::default()
        };
        let id = manager.find_game(settings, 1, 0).unwrap();
        let session = manager.session(&id).unwrap();
        assert_eq!(session.game.status(), Status::Running);
        assert!(session.vs_computer);
        assert_eq!(
            session.game.paddle(Side::Right).controller(),
            Controller::Computer
        );
        assert_eq!(manager.pending_len(), 0);

        for _ in 0..WINNING_SCORE {
            if let Some(session) = manager.sessions.get_mut(&id) {
                session.game.state_mut().ball_pos = Point::new(125.0, 50.0);
            }
            manager.tick(0);
        }
        assert!(manager.is_empty());

        let commands = drain(&mut rx);
        assert!(saved(&commands).is_empty());
        assert_eq!(
            commands.last(),
            Some(&StoreCommand::SetStatus {
                player_id: 1,
                status: PlayerStatus::Available
            })
        );
    }

    #[test]
    fn test_press_reaches_the_right_paddle() {
        let (mut manager, _rx) = manager();
        let id = manager.create_game(GameSettings::default(), 1, 0).unwrap();
        assert!(!manager.press(1, Key::Up, true));

        manager.join_pending_game(2, 0);
        assert!(manager.press(2, Key::Down, true));
        assert!(!manager.press(3, Key::Down, true));

        manager.tick(0);
        manager.tick(50);
        let state = manager.lookup(&id).unwrap().game_state;
        assert!(state.paddle_r > state.paddle_l);
    }

    #[test]
    fn test_expire_pending() {
        let (mut manager, _rx) = manager();
        let old = manager.create_game(GameSettings::default(), 1, 0).unwrap();
        let fresh = manager
            .create_game(GameSettings::default(), 2, 90_000)
            .unwrap();

        let expired = manager.expire_pending(100_000, 60_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].game_id, old);
        assert_eq!(expired[0].state.status, Status::Aborted);
        assert_eq!(expired[0].recipients, vec![1]);

        assert!(manager.lookup(&old).is_none());
        assert!(manager.lookup(&fresh).is_some());
        assert_eq!(manager.pending_len(), 1);
    }

    #[test]
    fn test_tick_broadcasts_only_running_games() {
        let (mut manager, _rx) = manager();
        manager.create_game(GameSettings::default(), 1, 0).unwrap();
        let running = manager.create_game(GameSettings::default(), 2, 0).unwrap();
        // Player 3 joins the oldest pending game, leaving the second one waiting.
        manager.join_pending_game(3, 0);

        let broadcasts = manager.tick(16);
        assert_eq!(broadcasts.len(), 1);
        assert_ne!(broadcasts[0].game_id, running);
        assert_eq!(broadcasts[0].recipients, vec![1, 3]);
    }
}
