//! Join-ordered roster of player names
//!
//! The roster is both the membership set and the turn order: the oldest entry
//! is the leader, and removing it promotes the next oldest.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("the name \"{0}\" is already on the roster")]
    DuplicateName(String),
}

#[derive(Debug, Default, Clone)]
pub struct Roster {
    entries: VecDeque<String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a name at the back of the join order
    pub fn add(&mut self, name: &str) -> Result<(), RosterError> {
        if self.contains(name) {
            return Err(RosterError::DuplicateName(name.to_string()));
        }
        self.entries.push_back(name.to_string());
        Ok(())
    }

    /// Removes the first matching entry, keeping the order of the rest
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|entry| entry == name)?;
        self.entries.remove(index)
    }

    /// Removes and returns the current leader
    pub fn pop_leader(&mut self) -> Option<String> {
        self.entries.pop_front()
    }

    /// The oldest entry, without removing it
    pub fn peek_leader(&self) -> Option<&str> {
        self.entries.front().map(String::as_str)
    }

    /// Exact, case-sensitive membership test
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names from leader to most recent joiner
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
