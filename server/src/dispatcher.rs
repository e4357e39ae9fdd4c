//! Command routing, the stop race and answer collection
//!
//! Every parsed command is applied to the shared `GameSession` under its mutex.
//! STOP is the only command whose response is not produced inline: the first
//! STOP of a round spawns a task that notifies the remaining players, waits for
//! their answers and scores the round exactly once, while later STOPs spawn a
//! task that waits for that scoring pass. Both deliver their `10 Stopped`
//! response through the connection's outbound queue.
//!
//! Lock order is always session first, then the client registry.

use crate::client_manager::{broadcast, ClientManager};
use crate::config::ServerConfig;
use crate::game::{GameSession, RoundPhase, RoundStatus, SessionError, StopOutcome};
use log::{debug, error, info, warn};
use shared::{
    AnswerSheet, Command, ProtocolError, Push, RankingEntry, Response, ResponseCode, RoundInit,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{sleep, timeout};

/// What the connection worker should do after a frame was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Respond(Response),
    /// The response will arrive later through the outbound queue
    Deferred,
    /// Send the response, then close the connection
    Close(Response),
}

pub fn response_code(err: &SessionError) -> ResponseCode {
    match err {
        SessionError::LobbyFull => ResponseCode::FullLobby,
        SessionError::DuplicateName => ResponseCode::AlreadyJoined,
        SessionError::NameEmpty => ResponseCode::InvalidName,
        SessionError::GameInProgress => ResponseCode::GameInProgress,
        SessionError::NotFound => ResponseCode::PlayerNotFound,
        SessionError::Unauthorized => ResponseCode::Unauthorized,
        SessionError::AlreadyStarted => ResponseCode::AlreadyStarted,
        SessionError::NotStarted => ResponseCode::NotStarted,
        SessionError::AlreadyStopped | SessionError::AlreadyAnswered => {
            ResponseCode::AlreadyStopped
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    session: Arc<Mutex<GameSession>>,
    clients: Arc<RwLock<ClientManager>>,
    config: Arc<ServerConfig>,
}

impl Dispatcher {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(GameSession::new(&config))),
            clients: Arc::new(RwLock::new(ClientManager::new())),
            config: Arc::new(config),
        }
    }

    /// Shared handle to the session state
    ///
    /// Lock it before the client registry whenever both are needed.
    pub fn session(&self) -> Arc<Mutex<GameSession>> {
        Arc::clone(&self.session)
    }

    /// Shared handle to the connection registry
    pub fn clients(&self) -> Arc<RwLock<ClientManager>> {
        Arc::clone(&self.clients)
    }

    /// Parses and handles one inbound frame
    pub async fn handle_frame(&self, client_id: u64, frame: &str) -> Reply {
        match Command::parse(frame) {
            Ok(command) => self.handle_command(client_id, command).await,
            Err(e) => self.reject(client_id, &e),
        }
    }

    /// Answers a frame that could not be understood; the connection stays open
    pub fn reject(&self, client_id: u64, err: &ProtocolError) -> Reply {
        warn!("Client {} sent a bad frame: {}", client_id, err);
        Reply::Respond(Response::new(ResponseCode::BadRequest))
    }

    /// Applies a parsed command on behalf of a connection
    ///
    /// The connection's bound player, if any, is looked up once up front and
    /// passed to the per-command handler.
    pub async fn handle_command(&self, client_id: u64, command: Command) -> Reply {
        let player = self.clients.read().await.player_name(client_id);
        debug!("Client {} sent {}", client_id, command.keyword());

        match command {
            Command::Join { name } => self.join(client_id, player, &name).await,
            Command::Start => self.start(player).await,
            Command::Stop { answers } => self.stop(client_id, player, answers).await,
            Command::Quit => self.quit(client_id, player).await,
        }
    }

    async fn join(&self, client_id: u64, player: Option<String>, name: &str) -> Reply {
        if player.is_some() {
            return Reply::Respond(Response::new(ResponseCode::AlreadyJoined));
        }

        let mut session = self.session.lock().await;
        match session.add_player(name) {
            Ok(()) => {
                // bound before the session lock drops so a START broadcast
                // cannot miss the new player
                self.clients.write().await.bind_player(client_id, name);
                Reply::Respond(Response::new(ResponseCode::Joined))
            }
            Err(e) => {
                debug!("Client {} could not join as {:?}: {}", client_id, name, e);
                Reply::Respond(Response::new(response_code(&e)))
            }
        }
    }

    async fn start(&self, player: Option<String>) -> Reply {
        let Some(name) = player else {
            return Reply::Respond(Response::new(ResponseCode::Unauthorized));
        };

        let started = self.session.lock().await.start_round(&name);
        match started {
            Ok(init) => {
                self.spawn_round_broadcast(init);
                Reply::Respond(Response::new(ResponseCode::Started))
            }
            Err(e) => Reply::Respond(Response::new(response_code(&e))),
        }
    }

    /// Pushes the round parameters once the `40 Started` response is out
    fn spawn_round_broadcast(&self, init: RoundInit) {
        let clients = Arc::clone(&self.clients);
        let delay = self.config.start_broadcast_delay;

        tokio::spawn(async move {
            sleep(delay).await;
            let round = init.round;
            let frame = match Push::RoundStarted(init).encode() {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode round {}: {}", round, e);
                    return;
                }
            };

            let targets = clients.read().await.joined_senders(&[]);
            let delivered = broadcast(&targets, &frame);
            debug!("Round {} pushed to {} players", round, delivered);
        });
    }

    async fn stop(&self, client_id: u64, player: Option<String>, answers: AnswerSheet) -> Reply {
        let Some(name) = player else {
            return Reply::Respond(Response::new(ResponseCode::BadRequest));
        };

        let (outcome, status) = {
            let mut session = self.session.lock().await;
            (session.stop(&name, answers), session.subscribe())
        };

        match outcome {
            Ok(StopOutcome::Caller { round }) => {
                let dispatcher = self.clone();
                tokio::spawn(async move {
                    dispatcher
                        .collect_and_score(client_id, name, round, status)
                        .await;
                });
                Reply::Deferred
            }
            Ok(StopOutcome::Trailing { round }) => {
                let dispatcher = self.clone();
                tokio::spawn(async move {
                    dispatcher.await_ranking(client_id, round, status).await;
                });
                Reply::Deferred
            }
            Err(e) => Reply::Respond(Response::new(response_code(&e))),
        }
    }

    /// Runs the caller's side of the stop race
    ///
    /// After the grace interval every joined player without answers is told who
    /// stopped the round. Collection ends when nobody is pending or the window
    /// elapses, whichever comes first; then the round is scored once.
    async fn collect_and_score(
        &self,
        client_id: u64,
        caller: String,
        round: u32,
        mut status: watch::Receiver<RoundStatus>,
    ) {
        sleep(self.config.stop_grace).await;

        let answered = self.session.lock().await.answered_players();
        let targets = self.clients.read().await.joined_senders(&answered);
        match Push::StoppedBy(caller).encode() {
            Ok(frame) => {
                let notified = broadcast(&targets, &frame);
                debug!("Round {}: {} players notified of the stop", round, notified);
            }
            Err(e) => error!("Failed to encode stop notification: {}", e),
        }

        let quorum = timeout(
            self.config.collection_window,
            wait_for_status(&mut status, |s| {
                s.round != round || s.phase != RoundPhase::Stopped || s.pending == 0
            }),
        )
        .await;

        let ranking = {
            let mut session = self.session.lock().await;
            let collected = session.answered_players().len();
            let expected = collected + session.pending_players().len();
            match quorum {
                Ok(_) => info!(
                    "Round {}: answers collected from {} of {} players",
                    round, collected, expected
                ),
                Err(_) => info!(
                    "Round {}: collection window elapsed with {} of {} players answered",
                    round, collected, expected
                ),
            }

            if session.round() == round && session.phase() == RoundPhase::Stopped {
                session.end_round()
            } else {
                warn!("Round {} was reset before it could be scored", round);
                session.ranking_for(round).unwrap_or_else(|| session.ranking())
            }
        };

        self.deliver_ranking(client_id, &ranking).await;
    }

    /// Waits for the caller's scoring pass and answers with the same ranking
    async fn await_ranking(
        &self,
        client_id: u64,
        round: u32,
        mut status: watch::Receiver<RoundStatus>,
    ) {
        let scored = timeout(
            self.config.trailing_wait,
            wait_for_status(&mut status, |s| {
                s.round != round || s.phase != RoundPhase::Stopped
            }),
        )
        .await
        .is_ok();

        let ranking = {
            let session = self.session.lock().await;
            if !scored {
                warn!(
                    "Client {} gave up waiting for round {} to be scored",
                    client_id, round
                );
            }
            session.ranking_for(round).unwrap_or_else(|| session.ranking())
        };

        self.deliver_ranking(client_id, &ranking).await;
    }

    async fn deliver_ranking(&self, client_id: u64, ranking: &[RankingEntry]) {
        let body = match serde_json::to_string(ranking) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode ranking: {}", e);
                return;
            }
        };
        let response = Response::with_body(ResponseCode::Stopped, body);

        let clients = self.clients.read().await;
        match clients.get(client_id) {
            Some(client) if client.send(response.encode()) => {}
            _ => debug!("Client {} left before its ranking was ready", client_id),
        }
    }

    async fn quit(&self, client_id: u64, player: Option<String>) -> Reply {
        let Some(name) = player else {
            return Reply::Close(Response::new(ResponseCode::PlayerNotFound));
        };

        let mut session = self.session.lock().await;
        let removed = session.remove_player(&name);
        self.clients.write().await.unbind_player(client_id);

        match removed {
            Ok(()) => Reply::Close(Response::new(ResponseCode::Left)),
            Err(e) => Reply::Close(Response::new(response_code(&e))),
        }
    }

    /// Forgets a closed connection; a bound player leaves as if it sent QUIT
    pub async fn disconnect(&self, client_id: u64) {
        let client = self.clients.write().await.remove_client(client_id);
        let Some(name) = client.and_then(|client| client.player_name) else {
            return;
        };

        if self.session.lock().await.remove_player(&name).is_ok() {
            info!("Player {} dropped with its connection", name);
        }
    }
}

/// Resolves once `done` holds for the latest status; false if the session is gone
async fn wait_for_status<F>(status: &mut watch::Receiver<RoundStatus>, mut done: F) -> bool
where
    F: FnMut(&RoundStatus) -> bool,
{
    loop {
        let current = *status.borrow_and_update();
        if done(&current) {
            return true;
        }
        if status.changed().await.is_err() {
            return false;
        }
    }
}
