//! Registry of live client connections
//!
//! This module tracks every accepted connection, including:
//! - Connection lifecycle (accept, bind to a player name, close)
//! - The outbound queue each connection's writer task drains
//! - Broadcast target selection with per-name exclusion
//!
//! The registry never performs I/O itself. Broadcasts take a snapshot of the
//! outbound queues while the registry lock is held and push frames after it
//! is released, so session and registry locks are never held across a send.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Work items for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A complete frame, without its terminator
    Frame(String),
    /// Flush what is queued and close the socket
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// A live connection and the player bound to it, if any
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: u64,
    pub addr: SocketAddr,
    /// Name of the player this connection joined as
    pub player_name: Option<String>,
    sender: OutboundSender,
}

impl Client {
    pub fn new(id: u64, addr: SocketAddr, sender: OutboundSender) -> Self {
        Self {
            id,
            addr,
            player_name: None,
            sender,
        }
    }

    /// Queues a frame; returns false once the writer task is gone
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(Outbound::Frame(frame)).is_ok()
    }

    /// Clone of this connection's outbound queue handle
    pub fn sender(&self) -> OutboundSender {
        self.sender.clone()
    }
}

/// Manages all live connections
///
/// Connections are registered on accept, before any frame is read, and bound
/// to a player name once their JOIN succeeds.
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<u64, Client>,
    next_client_id: u64,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Registers a new connection and returns its id
    pub fn add_client(&mut self, addr: SocketAddr, sender: OutboundSender) -> u64 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));
        client_id
    }

    /// Removes a connection, returning it so the caller can clean up its player
    pub fn remove_client(&mut self, client_id: u64) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} from {} disconnected", client.id, client.addr);
        Some(client)
    }

    /// Looks up a live connection by id
    pub fn get(&self, client_id: u64) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Associates a joined player name with a connection
    pub fn bind_player(&mut self, client_id: u64, name: &str) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                debug!("Client {} bound to player {}", client_id, name);
                client.player_name = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    /// Drops the player binding, leaving the connection open
    pub fn unbind_player(&mut self, client_id: u64) -> Option<String> {
        self.clients.get_mut(&client_id)?.player_name.take()
    }

    /// Name the connection joined as, or `None` before a successful JOIN
    pub fn player_name(&self, client_id: u64) -> Option<String> {
        self.clients.get(&client_id)?.player_name.clone()
    }

    /// Snapshot of the outbound queues of joined players not in `exclude`
    pub fn joined_senders(&self, exclude: &[String]) -> Vec<(String, OutboundSender)> {
        self.clients
            .values()
            .filter_map(|client| {
                let name = client.player_name.as_ref()?;
                if exclude.contains(name) {
                    return None;
                }
                Some((name.clone(), client.sender()))
            })
            .collect()
    }

    /// Snapshot of every connection's outbound queue, joined or not
    pub fn all_senders(&self) -> Vec<(u64, OutboundSender)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.sender()))
            .collect()
    }

    /// Number of connections bound to a player
    pub fn joined_count(&self) -> usize {
        self.clients
            .values()
            .filter(|client| client.player_name.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Pushes one frame to every sender in a snapshot, returning how many accepted it
pub fn broadcast<K>(targets: &[(K, OutboundSender)], frame: &str) -> usize {
    targets
        .iter()
        .filter(|(_, sender)| sender.send(Outbound::Frame(frame.to_string())).is_ok())
        .count()
}
