//! Connection management for players talking to the server
//!
//! This module tracks which player is reachable at which UDP address:
//! - Connection lifecycle (connect, reconnect, disconnect, timeout)
//! - Connection health monitoring through last-seen timestamps
//! - Capacity enforcement and address lookup for outgoing packets
//!
//! Players identify themselves in their `Connect` packet. The client manager
//! only maps identities to addresses; which game a player is in is the
//! session manager's business.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected player
#[derive(Debug)]
pub struct Client {
    /// Identity the player connected with
    pub player_id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this player
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client and marks it as recently active
    pub fn new(player_id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected players
///
/// The ClientManager enforces the server's capacity limit and resolves
/// incoming datagrams to player identities, and player identities back to
/// addresses when state is broadcast.
pub struct ClientManager {
    /// Connected clients indexed by player ID
    clients: HashMap<PlayerId, Client>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a player connecting from `addr`
    ///
    /// A player that is already connected keeps its slot and moves to the new
    /// address. Returns None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, player_id: PlayerId) -> Option<PlayerId> {
        if let Some(client) = self.clients.get_mut(&player_id) {
            info!(
                "Player {} reconnected from {} (was {})",
                player_id, addr, client.addr
            );
            client.addr = addr;
            client.touch();
            return Some(player_id);
        }

        // Enforce server capacity limits
        if self.clients.len() >= self.max_clients {
            return None;
        }

        info!("Player {} connected from {}", player_id, addr);
        self.clients.insert(player_id, Client::new(player_id, addr));
        Some(player_id)
    }

    /// Removes a player from the server
    ///
    /// Returns true if the player was found and removed, false if they were
    /// already gone.
    pub fn remove_client(&mut self, player_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(player_id) {
            info!("Player {} disconnected", client.player_id);
            true
        } else {
            false
        }
    }

    /// Finds a player by their network address
    ///
    /// Used to associate incoming packets with existing connections.
    /// Returns None if nobody is connected from the given address.
    pub fn find_player_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Records activity from `addr`. Returns the player it belongs to.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.touch();
        Some(client.player_id)
    }

    /// Address a player can currently be reached at
    pub fn addr_of(&self, player_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&player_id).map(|client| client.addr)
    }

    /// Checks for and removes timed-out clients
    ///
    /// Disconnects players that haven't sent packets within `timeout` and
    /// returns their IDs so their games can be cancelled or aborted.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for player_id in &timed_out {
            self.remove_client(player_id);
        }

        timed_out
    }

    /// Gets all player IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
