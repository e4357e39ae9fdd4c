//! Authoritative state of the single game session
//!
//! `GameSession` owns the roster, the scores, the current round and the answers
//! collected for it. It is not synchronized on its own: the dispatcher keeps it
//! behind one mutex and performs every multi-field update while holding it.
//!
//! Every change to the phase or to the set of pending players is published on a
//! `watch` channel so that tasks waiting on the stop race can sleep until
//! something relevant happens instead of polling.

use crate::config::{CategoryPool, ServerConfig, MIN_PLAYER_LIMIT};
use crate::roster::{Roster, RosterError};
use crate::scoring::{self, AnswerSet};
use log::{debug, info};
use rand::Rng;
use shared::{AnswerSheet, RankingEntry, RoundInit};
use std::collections::HashMap;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Lobby,
    Playing,
    Stopped,
    Scored,
}

impl RoundPhase {
    /// `Lobby` and `Scored` both mean "game not started"
    pub fn is_in_progress(self) -> bool {
        matches!(self, RoundPhase::Playing | RoundPhase::Stopped)
    }
}

/// Snapshot published after every phase or answer change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStatus {
    pub round: u32,
    pub phase: RoundPhase,
    /// Joined players that have not submitted answers this round
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("the lobby is full")]
    LobbyFull,

    #[error("a player with that name already joined")]
    DuplicateName,

    #[error("player names cannot be empty")]
    NameEmpty,

    #[error("a round is already in progress")]
    GameInProgress,

    #[error("no such player")]
    NotFound,

    #[error("only the leader can start a round")]
    Unauthorized,

    #[error("the round has already started")]
    AlreadyStarted,

    #[error("no round is in progress")]
    NotStarted,

    #[error("answers were already submitted for this round")]
    AlreadyStopped,

    #[error("player already has answers recorded this round")]
    AlreadyAnswered,
}

impl From<RosterError> for SessionError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::DuplicateName(_) => SessionError::DuplicateName,
        }
    }
}

/// How a STOP was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// First STOP of the round; this caller drives collection and scoring
    Caller { round: u32 },
    /// STOP that arrived after the round was already stopped
    Trailing { round: u32 },
}

#[derive(Debug)]
pub struct GameSession {
    pools: Vec<CategoryPool>,
    player_limit: usize,
    roster: Roster,
    scores: HashMap<String, u32>,
    round: u32,
    letter: char,
    categories: Vec<String>,
    phase: RoundPhase,
    answers: Vec<AnswerSet>,
    last_ranking: Option<(u32, Vec<RankingEntry>)>,
    scoring_passes: u32,
    status_tx: watch::Sender<RoundStatus>,
}

impl GameSession {
    /// Creates an empty session in the lobby phase
    ///
    /// A letter and category set are drawn up front so `round_init` always has
    /// something to report, even before the first round.
    pub fn new(config: &ServerConfig) -> Self {
        let mut rng = rand::thread_rng();
        let (status_tx, _) = watch::channel(RoundStatus {
            round: 0,
            phase: RoundPhase::Lobby,
            pending: 0,
        });

        Self {
            pools: config.pools.clone(),
            player_limit: config.player_limit.max(MIN_PLAYER_LIMIT),
            roster: Roster::new(),
            scores: HashMap::new(),
            round: 0,
            letter: scoring::draw_letter(&mut rng),
            categories: scoring::draw_categories(&config.pools, &mut rng),
            phase: RoundPhase::Lobby,
            answers: Vec::new(),
            last_ranking: None,
            scoring_passes: 0,
            status_tx,
        }
    }

    /// Adds a player with a score of zero
    ///
    /// Checks run in a fixed order: capacity, then duplicate name, then empty
    /// name, then whether a round is in progress.
    pub fn add_player(&mut self, name: &str) -> Result<(), SessionError> {
        if self.roster.len() >= self.player_limit {
            return Err(SessionError::LobbyFull);
        }
        if self.roster.contains(name) {
            return Err(SessionError::DuplicateName);
        }
        if name.trim().is_empty() {
            return Err(SessionError::NameEmpty);
        }
        if self.phase.is_in_progress() {
            return Err(SessionError::GameInProgress);
        }

        self.roster.add(name)?;
        self.scores.insert(name.to_string(), 0);
        info!("Player {} joined ({} in lobby)", name, self.roster.len());
        self.publish();
        Ok(())
    }

    /// Removes a player; an emptied roster drops any round in progress
    pub fn remove_player(&mut self, name: &str) -> Result<(), SessionError> {
        if self.roster.remove(name).is_none() {
            return Err(SessionError::NotFound);
        }
        self.scores.remove(name);
        info!("Player {} left ({} in lobby)", name, self.roster.len());

        if self.roster.is_empty() && self.phase.is_in_progress() {
            info!("Lobby emptied during round {}, resetting", self.round);
            self.phase = RoundPhase::Lobby;
        }
        self.publish();
        Ok(())
    }

    /// Removes whoever currently leads the lobby
    ///
    /// The next oldest player becomes leader. Returns the removed name, or
    /// `None` when the roster is empty.
    pub fn remove_leader(&mut self) -> Option<String> {
        let leader = self.roster.peek_leader()?.to_string();
        self.remove_player(&leader).ok()?;
        Some(leader)
    }

    /// Starts the next round with the thread-local RNG
    pub fn start_round(&mut self, requester: &str) -> Result<RoundInit, SessionError> {
        self.start_round_with_rng(requester, &mut rand::thread_rng())
    }

    /// Starts the next round on behalf of the leader
    pub fn start_round_with_rng<R: Rng>(
        &mut self,
        requester: &str,
        rng: &mut R,
    ) -> Result<RoundInit, SessionError> {
        if self.roster.peek_leader() != Some(requester) {
            return Err(SessionError::Unauthorized);
        }
        if self.phase.is_in_progress() {
            return Err(SessionError::AlreadyStarted);
        }

        self.round += 1;
        self.letter = scoring::draw_letter(rng);
        self.categories = scoring::draw_categories(&self.pools, rng);
        self.answers.clear();
        self.phase = RoundPhase::Playing;

        info!(
            "Round {} started by {} with letter {}",
            self.round, requester, self.letter
        );
        self.publish();
        Ok(self.round_init())
    }

    /// Handles a STOP: the first one of a round flips Playing to Stopped
    ///
    /// This is the single test-and-set that decides the stop race. Whoever gets
    /// `StopOutcome::Caller` is responsible for calling `end_round` once.
    pub fn stop(&mut self, name: &str, answers: AnswerSheet) -> Result<StopOutcome, SessionError> {
        if !self.roster.contains(name) {
            return Err(SessionError::NotFound);
        }

        match self.phase {
            RoundPhase::Playing => {
                self.phase = RoundPhase::Stopped;
                info!("Round {} stopped by {}", self.round, name);
                self.record_answer(name, answers)?;
                Ok(StopOutcome::Caller { round: self.round })
            }
            RoundPhase::Stopped => {
                if self.has_answered(name) {
                    return Err(SessionError::AlreadyStopped);
                }
                self.record_answer(name, answers)?;
                Ok(StopOutcome::Trailing { round: self.round })
            }
            RoundPhase::Lobby | RoundPhase::Scored => Err(SessionError::NotStarted),
        }
    }

    /// Records a player's answers; a player can submit only once per round
    pub fn record_answer(&mut self, name: &str, answers: AnswerSheet) -> Result<(), SessionError> {
        if self.has_answered(name) {
            return Err(SessionError::AlreadyAnswered);
        }
        self.answers.push(AnswerSet::new(name, answers));
        debug!(
            "Recorded answers from {} ({} pending)",
            name,
            self.pending_players().len()
        );
        self.publish();
        Ok(())
    }

    /// Scores the collected answers and closes the round
    ///
    /// Must run exactly once per round; the stop race guarantees that.
    pub fn end_round(&mut self) -> Vec<RankingEntry> {
        let gains = scoring::score_round(self.letter, &self.categories, &self.answers);
        for (player, points) in &gains {
            if let Some(score) = self.scores.get_mut(player) {
                *score += points;
            }
        }

        self.phase = RoundPhase::Scored;
        self.scoring_passes += 1;

        let ranking = self.ranking();
        info!(
            "Round {} scored with {} answer sets",
            self.round,
            self.answers.len()
        );
        self.last_ranking = Some((self.round, ranking.clone()));
        self.publish();
        ranking
    }

    /// Players by score, highest first; equal scores are ordered by name
    pub fn ranking(&self) -> Vec<RankingEntry> {
        let mut ranking: Vec<RankingEntry> = self
            .scores
            .iter()
            .map(|(name, score)| RankingEntry {
                name: name.clone(),
                score: *score,
            })
            .collect();
        ranking.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        ranking
    }

    /// The ranking computed when `round` was scored, if it was
    pub fn ranking_for(&self, round: u32) -> Option<Vec<RankingEntry>> {
        match &self.last_ranking {
            Some((scored, ranking)) if *scored == round => Some(ranking.clone()),
            _ => None,
        }
    }

    /// Parameters of the current round as pushed to players
    pub fn round_init(&self) -> RoundInit {
        RoundInit {
            round: self.round,
            categories: self.categories.clone(),
            letter: self.letter,
        }
    }

    /// Whether `name` has answers recorded for the current round
    pub fn has_answered(&self, name: &str) -> bool {
        self.answers.iter().any(|set| set.player == name)
    }

    /// Names with answers recorded this round, in submission order
    ///
    /// May include players who have since left; their answers stay in the
    /// uniqueness tally.
    pub fn answered_players(&self) -> Vec<String> {
        self.answers.iter().map(|set| set.player.clone()).collect()
    }

    /// Joined players still expected to answer, in join order
    pub fn pending_players(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter(|name| !self.has_answered(name))
            .map(str::to_string)
            .collect()
    }

    /// Current round, phase and pending count
    ///
    /// This is the value published to subscribers after every change.
    pub fn status(&self) -> RoundStatus {
        RoundStatus {
            round: self.round,
            phase: self.phase,
            pending: self.pending_players().len(),
        }
    }

    /// Returns a receiver that observes every published `RoundStatus`
    ///
    /// The receiver starts out with the latest status already visible, so
    /// waiters check it before awaiting a change.
    pub fn subscribe(&self) -> watch::Receiver<RoundStatus> {
        self.status_tx.subscribe()
    }

    /// Joined player names in join order
    pub fn players(&self) -> Vec<String> {
        self.roster.iter().map(str::to_string).collect()
    }

    /// The oldest joined player, the only one allowed to START
    pub fn leader(&self) -> Option<&str> {
        self.roster.peek_leader()
    }

    /// Accumulated score of a joined player
    pub fn points(&self, name: &str) -> Option<u32> {
        self.scores.get(name).copied()
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Number of the latest round started; zero before the first
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// Lobby capacity, never below two
    pub fn player_limit(&self) -> usize {
        self.player_limit
    }

    /// How many times `end_round` has run over the session's lifetime
    pub fn scoring_passes(&self) -> u32 {
        self.scoring_passes
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}
