//! Integration tests for the Pong server components
//!
//! These tests validate cross-component interactions and real network behavior.

use bincode::{deserialize, serialize};
use server::store::StoreCommand;
use shared::{GameSettings, GameState, Packet, Side, Status, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

fn drain(rx: &mut mpsc::UnboundedReceiver<StoreCommand>) -> Vec<StoreCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = rx.try_recv() {
        commands.push(command);
    }
    commands
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use shared::{GameLookup, Point};

    /// Tests packet serialization round-trip for network protocol validation
    #[test]
    fn packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                player_id: 7,
            },
            Packet::FindGame {
                settings: GameSettings::default(),
            },
            Packet::Input {
                key: "ArrowUp".to_string(),
                pressed: true,
            },
            Packet::State {
                game_id: "ABC234".to_string(),
                state: GameState::default(),
            },
            Packet::GameInfo {
                game_id: "ABC234".to_string(),
                info: None,
            },
            Packet::Heartbeat,
            Packet::Disconnected {
                reason: "Test".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();
            assert_eq!(format!("{:?}", packet), format!("{:?}", deserialized));
        }
    }

    /// Garbage and truncated datagrams must be rejected, not misread
    #[test]
    fn malformed_datagrams_are_rejected() {
        assert!(deserialize::<Packet>(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        assert!(deserialize::<Packet>(&[]).is_err());

        let packet = Packet::State {
            game_id: "ABC234".to_string(),
            state: GameState::default(),
        };
        let serialized = serialize(&packet).unwrap();
        assert!(deserialize::<Packet>(&serialized[..serialized.len() / 2]).is_err());
    }

    /// The lookup payload keeps the field names existing clients expect
    #[test]
    fn lookup_json_shape() {
        let lookup = GameLookup {
            game_settings: GameSettings::default(),
            game_state: GameState {
                ball_pos: Point::new(48.75, 48.333),
                status: Status::Running,
                ..GameState::default()
            },
        };

        let value = serde_json::to_value(&lookup).unwrap();
        assert_eq!(value["gameSettings"]["ballSpeed"], 60.0);
        assert_eq!(value["gameSettings"]["side"], "left");
        assert_eq!(value["gameState"]["ballPos"]["x"], 48.75);
        assert_eq!(value["gameState"]["status"], "running");
    }
}

/// GAME LOGIC INTEGRATION TESTS
mod game_logic_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use server::game::Game;
    use server::paddle::Controller;
    use server::score::ScoreEvent;
    use server::session_manager::SessionManager;
    use shared::{Key, WINNING_SCORE};

    /// Two computer paddles play a whole match; every tick must keep the
    /// physical invariants.
    #[test]
    fn computer_match_keeps_invariants() {
        let settings = GameSettings::default();
        let mut game = Game::with_rng(settings.clone(), StdRng::seed_from_u64(2024));
        game.set_controller(Side::Left, Controller::Computer);
        game.set_controller(Side::Right, Controller::Computer);
        game.set_status(Status::Running);

        let delta = 1.0 / 60.0;
        let upper = game.arena().upper.limit;
        let lower = game.arena().lower.limit;
        let mut ticks = 0;

        while game.status() == Status::Running {
            ticks += 1;
            assert!(ticks < 2_000_000, "match never finished");

            let speed_before = game.ball().speed();
            let event = game.step(delta);
            let ball = game.ball();

            let direction = ball.direction();
            let length = (direction.x * direction.x + direction.y * direction.y).sqrt();
            assert!((length - 1.0).abs() < 1e-9);

            for side in [Side::Left, Side::Right] {
                let paddle = game.paddle(side);
                let top = paddle.top(game.state());
                assert!(top >= upper - 1e-9);
                assert!(top <= lower - paddle.height() + 1e-9);
            }

            if event.is_none() {
                if ball.has_hit_paddle() {
                    assert!((ball.speed() - speed_before - settings.ball_accel).abs() < 1e-9);
                } else {
                    assert_eq!(ball.speed(), speed_before);
                }

                let x = ball.left(game.state());
                if (0.0..=100.0 - ball.diameter_x()).contains(&x) {
                    assert!(ball.top(game.state()) >= upper - 1e-6);
                    assert!(ball.bottom(game.state()) <= lower + 1e-6);
                }
            }
        }

        let state = game.state().clone();
        assert_eq!(state.status, Status::Finished);
        assert_eq!(state.score_l.max(state.score_r), WINNING_SCORE);
        assert!(state.winner().is_some());

        // Scores are frozen once the match is over.
        for _ in 0..10 {
            assert_eq!(game.step(delta), None::<ScoreEvent>);
        }
        assert_eq!(game.state(), &state);
    }

    /// Two players matched by the session manager play until someone wins
    #[test]
    fn full_session_is_recorded_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::with_seed(tx, 99);

        let game_id = manager.find_game(GameSettings::default(), 1, 0).unwrap();
        assert_eq!(manager.lookup(&game_id).unwrap().game_state.status, Status::Pending);
        assert_eq!(manager.find_game(GameSettings::default(), 2, 0).unwrap(), game_id);

        // Opposite corners: both paddles leave most of their goal open.
        assert!(manager.press(1, Key::Down, true));
        assert!(manager.press(2, Key::Up, true));

        let mut now = 0;
        let mut last_state = None;
        while manager.lookup(&game_id).is_some() {
            now += 16;
            assert!(now < 16 * 2_000_000, "match never finished");
            for broadcast in manager.tick(now) {
                assert_eq!(broadcast.recipients, vec![1, 2]);
                last_state = Some(broadcast.state);
            }
        }

        let last_state = last_state.unwrap();
        assert_eq!(last_state.status, Status::Finished);

        let records: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|command| match command {
                StoreCommand::SaveMatch(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.score_player_one, last_state.score_l);
        assert_eq!(record.score_player_two, last_state.score_r);
        assert_eq!(
            record.score_player_one.max(record.score_player_two),
            WINNING_SCORE
        );
        let expected_winner = if last_state.winner() == Some(Side::Left) { 1 } else { 2 };
        assert_eq!(record.winner_id, expected_winner);
        assert_eq!(record.end_time, now);
        assert_eq!(record.time_played_seconds, now / 1000);
    }

    /// Out-of-range settings still produce a playable match
    #[test]
    fn invalid_settings_use_defaults() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::with_seed(tx, 1);
        let settings = GameSettings {
            ball_speed: 999.0,
            ..GameSettings::default()
        };

        let game_id = manager.create_game(settings, 1, 0).unwrap();
        let lookup = manager.lookup(&game_id).unwrap();
        assert_eq!(lookup.game_settings, GameSettings::default());
    }
}

/// STORAGE INTEGRATION TESTS
mod store_tests {
    use super::*;
    use server::session_manager::SessionManager;
    use server::store::{spawn_recorder, MemoryStore};
    use shared::PlayerStatus;

    /// Session manager and recorder task together: abort leaves no record
    #[tokio::test]
    async fn aborted_game_is_not_persisted() {
        let (recorder, handle) = spawn_recorder(MemoryStore::new());
        let mut manager = SessionManager::with_seed(recorder, 5);

        manager.find_game(GameSettings::default(), 1, 0).unwrap();
        manager.find_game(GameSettings::default(), 2, 0).unwrap();
        manager.tick(16);

        let broadcast = manager.handle_disconnect(1).unwrap();
        assert_eq!(broadcast.state.status, Status::Aborted);
        drop(manager);

        let store = tokio_test::assert_ok!(handle.await);
        assert!(store.matches.is_empty());
        assert_eq!(store.statuses.get(&1), Some(&PlayerStatus::Available));
        assert_eq!(store.statuses.get(&2), Some(&PlayerStatus::Available));
    }
}

/// SERVER END-TO-END TESTS
mod server_tests {
    use super::*;
    use server::network::{Server, ServerConfig, ServerMessage};
    use tokio::time::timeout;

    async fn send(socket: &UdpSocket, packet: &Packet, addr: std::net::SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), addr).await.unwrap();
    }

    async fn recv_until<T>(socket: &UdpSocket, pick: impl Fn(Packet) -> Option<T>) -> T {
        let mut buffer = [0u8; 2048];
        timeout(Duration::from_secs(5), async {
            loop {
                let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
                if let Some(found) = pick(deserialize(&buffer[..len]).unwrap()) {
                    return found;
                }
            }
        })
        .await
        .expect("timed out waiting for packet")
    }

    async fn connect(addr: std::net::SocketAddr, player_id: u32) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player_id,
        };
        send(&socket, &packet, addr).await;
        let connected = recv_until(&socket, |p| match p {
            Packet::Connected { player_id } => Some(player_id),
            _ => None,
        })
        .await;
        assert_eq!(connected, player_id);
        socket
    }

    /// Two UDP clients are paired, play, and the leaver aborts the match
    #[tokio::test]
    async fn two_players_paired_then_aborted() {
        let (sink, _records) = mpsc::unbounded_channel::<StoreCommand>();
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default(), sink)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move { server.run().await.unwrap() });

        let alice = connect(addr, 1).await;
        let bob = connect(addr, 2).await;

        let find = Packet::FindGame {
            settings: GameSettings::default(),
        };
        send(&alice, &find, addr).await;
        let (game_id, alice_side) = recv_until(&alice, |p| match p {
            Packet::GameJoined { game_id, side, .. } => Some((game_id, side)),
            _ => None,
        })
        .await;

        send(&bob, &find, addr).await;
        let (bob_game, bob_side) = recv_until(&bob, |p| match p {
            Packet::GameJoined { game_id, side, .. } => Some((game_id, side)),
            _ => None,
        })
        .await;
        assert_eq!(bob_game, game_id);
        assert_eq!(alice_side, Side::Left);
        assert_eq!(bob_side, Side::Right);

        let running = recv_until(&bob, |p| match p {
            Packet::State { state, .. } if state.status == Status::Running => Some(state),
            _ => None,
        })
        .await;
        assert_eq!((running.score_l, running.score_r), (0, 0));

        send(&alice, &Packet::Disconnect, addr).await;
        let aborted = recv_until(&bob, |p| match p {
            Packet::State { game_id, state } if state.status == Status::Aborted => Some(game_id),
            _ => None,
        })
        .await;
        assert_eq!(aborted, game_id);

        shutdown.send(ServerMessage::Shutdown).unwrap();
        handle.await.unwrap();
    }
}
