//! Server network layer handling UDP communications and the session tick loop

use crate::client_manager::ClientManager;
use crate::session_manager::{Broadcast, SessionError, SessionManager};
use crate::store::MatchSink;
use crate::utils::get_timestamp;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{GameId, Key, Packet, PlayerId, PROTOCOL_VERSION, TICK_RATE_HZ};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Runtime knobs of the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Silence after which a player counts as disconnected
    pub client_timeout: Duration,
    /// Age after which an unjoined game is dropped
    pub pending_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / TICK_RATE_HZ as f64),
            max_clients: 64,
            client_timeout: Duration::from_secs(5),
            pending_timeout: Duration::from_secs(120),
        }
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { player_id: PlayerId },
    /// Periodic cleanup of stale pending games
    Housekeeping,
    Shutdown,
}

/// Messages sent from the tick loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Delivered to each listed player that is still connected
    SendToPlayers {
        packet: Packet,
        players: Vec<PlayerId>,
    },
}

/// Main server coordinating networking and the live sessions
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    sessions: SessionManager,
    config: ServerConfig,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,

    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: ServerConfig,
        sink: impl MatchSink + 'static,
    ) -> ServerResult<Self> {
        Self::with_sessions(addr, config, SessionManager::new(sink)).await
    }

    pub async fn with_sessions(
        addr: &str,
        config: ServerConfig,
        sessions: SessionManager,
    ) -> ServerResult<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            sessions,
            config,
            tick: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            tasks: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Channel for stopping [`Server::run`] from elsewhere
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        self.tasks.push(tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToPlayers { packet, players } => {
                        let addrs: Vec<(PlayerId, SocketAddr)> = {
                            let clients_guard = clients.read().await;
                            players
                                .iter()
                                .filter_map(|id| clients_guard.addr_of(*id).map(|addr| (*id, addr)))
                                .collect()
                        };

                        for (player_id, addr) in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to player {}: {}", player_id, e);
                            }
                        }
                    }
                }
            }
        }));
    }

    /// Spawns task that monitors client timeouts and schedules housekeeping
    fn spawn_timeout_checker(&mut self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for player_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { player_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
                if server_tx.send(ServerMessage::Housekeeping).is_err() {
                    return;
                }
            }
        }));
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> ServerResult<()> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_players(&self, packet: Packet, players: Vec<PlayerId>) {
        if players.is_empty() {
            return;
        }
        if let Err(e) = self.game_tx.send(GameMessage::SendToPlayers { packet, players }) {
            error!("Failed to queue packet for players: {}", e);
        }
    }

    fn send_broadcast(&self, broadcast: Broadcast) {
        let packet = Packet::State {
            game_id: broadcast.game_id,
            state: broadcast.state,
        };
        self.send_to_players(packet, broadcast.recipients);
    }

    /// Tells every player of a session which side they steer
    fn announce_game(&self, game_id: &GameId) {
        let Some(session) = self.sessions.session(game_id) else {
            return;
        };
        for player_id in session.players() {
            if let Some(side) = session.side_of(player_id) {
                let packet = Packet::GameJoined {
                    game_id: game_id.clone(),
                    side,
                    settings: session.game.settings().clone(),
                };
                self.send_to_players(packet, vec![player_id]);
            }
        }
    }

    fn handle_player_gone(&mut self, player_id: PlayerId) {
        if let Some(broadcast) = self.sessions.handle_disconnect(player_id) {
            self.send_broadcast(broadcast);
        }
    }

    /// Processes incoming packets and updates the sessions
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            player_id,
        } = packet
        {
            self.handle_connect(client_version, player_id, addr).await;
            return;
        }

        let player_id = {
            let mut clients = self.clients.write().await;
            clients.touch(addr)
        };
        let Some(player_id) = player_id else {
            warn!("Packet from unconnected address {}", addr);
            return;
        };

        match packet {
            Packet::FindGame { settings } => {
                match self.sessions.find_game(settings, player_id, get_timestamp()) {
                    Ok(game_id) => self.announce_game(&game_id),
                    Err(SessionError::PlayerBusy(_)) => {
                        debug!("Player {} is already in a game", player_id);
                        if let Some(session) = self.sessions.session_of(player_id) {
                            let game_id = session.id.clone();
                            self.announce_game(&game_id);
                        }
                    }
                    Err(e) => error!("Could not create game for player {}: {}", player_id, e),
                }
            }

            Packet::CancelGame => {
                if !self.sessions.cancel_pending_game(player_id) {
                    debug!("Player {} had no pending game to cancel", player_id);
                }
            }

            Packet::Input { key, pressed } => match Key::parse(&key) {
                Some(key) => {
                    self.sessions.press(player_id, key, pressed);
                }
                None => debug!("Ignoring key {:?} from player {}", key, player_id),
            },

            Packet::Lookup { game_id } => {
                let info = self.sessions.lookup(&game_id);
                self.send_packet(Packet::GameInfo { game_id, info }, addr);
            }

            Packet::Heartbeat => {}

            Packet::Disconnect => {
                {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&player_id);
                }
                self.handle_player_gone(player_id);
            }

            _ => {
                warn!("Unexpected packet type from player {} at {}", player_id, addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, player_id: PlayerId, addr: SocketAddr) {
        info!(
            "Player {} connecting from {} (version: {})",
            player_id, addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            let response = Packet::Disconnected {
                reason: "Protocol version mismatch".to_string(),
            };
            self.send_packet(response, addr);
            return;
        }

        // A different player reusing this address replaces the old one
        let (replaced, added) = {
            let mut clients = self.clients.write().await;
            let replaced = match clients.find_player_by_addr(addr) {
                Some(existing) if existing != player_id => {
                    info!("Removing player {} from {}", existing, addr);
                    clients.remove_client(&existing);
                    Some(existing)
                }
                _ => None,
            };
            (replaced, clients.add_client(addr, player_id))
        };
        if let Some(existing) = replaced {
            self.handle_player_gone(existing);
        }

        match added {
            Some(player_id) => {
                self.send_packet(Packet::Connected { player_id }, addr);
                if let Some(session) = self.sessions.session_of(player_id) {
                    let game_id = session.id.clone();
                    self.announce_game(&game_id);
                }
            }
            None => {
                let response = Packet::Disconnected {
                    reason: "Server full".to_string(),
                };
                self.send_packet(response, addr);
            }
        }
    }

    /// Advances every running session and sends out their states
    fn run_tick(&mut self) {
        for broadcast in self.sessions.tick(get_timestamp()) {
            self.send_broadcast(broadcast);
        }
        self.tick += 1;
    }

    fn housekeeping(&mut self) {
        let max_age = self.config.pending_timeout.as_millis() as u64;
        for broadcast in self.sessions.expire_pending(get_timestamp(), max_age) {
            self.send_broadcast(broadcast);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> ServerResult<()> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { player_id }) => {
                            info!("Player {} timed out", player_id);
                            self.handle_player_gone(player_id);
                        },
                        Some(ServerMessage::Housekeeping) => self.housekeeping(),
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;

                    self.run_tick();

                    // Periodic performance monitoring
                    if self.tick % 60 == 0 && !self.sessions.is_empty() {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };
                        debug!("Tick {}: {} clients, {} sessions ({} pending), {:.1}Hz",
                               self.tick, client_count, self.sessions.len(),
                               self.sessions.pending_len(), 1.0 / dt.max(f64::EPSILON));
                    }
                },
            }
        }

        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
