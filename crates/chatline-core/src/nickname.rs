//! Nickname validation and allocation.
//!
//! A nickname is unique among active sessions at any instant. Whether
//! `Alice` and `alice` collide is decided once, by [`CasePolicy`].

use crate::event::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How nicknames are compared for uniqueness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePolicy {
    #[default]
    Sensitive,
    Insensitive,
}

impl CasePolicy {
    fn key(self, nickname: &str) -> String {
        match self {
            CasePolicy::Sensitive => nickname.to_string(),
            CasePolicy::Insensitive => nickname.to_lowercase(),
        }
    }
}

/// Why a nickname request was refused. The session may retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NicknameError {
    #[error("Nickname cannot be empty")]
    Empty,
    #[error("Nickname '{0}' is already taken")]
    Taken(String),
}

/// A successful reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The nickname as it will be displayed (trimmed).
    pub nickname: String,
    /// Nicknames held by other sessions at the moment of assignment,
    /// in session order.
    pub existing: Vec<String>,
}

#[derive(Debug)]
struct Holder {
    session: SessionId,
    display: String,
}

/// Reserves nicknames for sessions.
#[derive(Debug, Default)]
pub struct NicknameAllocator {
    policy: CasePolicy,
    held: HashMap<String, Holder>,
    by_session: HashMap<SessionId, String>,
}

impl NicknameAllocator {
    pub fn new(policy: CasePolicy) -> Self {
        Self {
            policy,
            held: HashMap::new(),
            by_session: HashMap::new(),
        }
    }

    /// Reserve `requested` for `session`.
    ///
    /// A session holds at most one nickname; requesting again while holding one
    /// is answered with the current holding if it matches, or `Taken` otherwise.
    pub fn assign(
        &mut self,
        requested: &str,
        session: SessionId,
    ) -> Result<Assignment, NicknameError> {
        let nickname = requested.trim();
        if nickname.is_empty() {
            return Err(NicknameError::Empty);
        }

        let key = self.policy.key(nickname);
        if let Some(holder) = self.held.get(&key) {
            if holder.session != session {
                return Err(NicknameError::Taken(nickname.to_string()));
            }
        } else if self.by_session.contains_key(&session) {
            return Err(NicknameError::Taken(nickname.to_string()));
        }

        let existing = self.roster_excluding(session);
        self.held.insert(
            key.clone(),
            Holder {
                session,
                display: nickname.to_string(),
            },
        );
        self.by_session.insert(session, key);

        Ok(Assignment {
            nickname: nickname.to_string(),
            existing,
        })
    }

    /// Give the session's nickname back to the pool.
    pub fn release(&mut self, session: SessionId) -> Option<String> {
        let key = self.by_session.remove(&session)?;
        self.held.remove(&key).map(|h| h.display)
    }

    pub fn nickname_of(&self, session: SessionId) -> Option<&str> {
        let key = self.by_session.get(&session)?;
        self.held.get(key).map(|h| h.display.as_str())
    }

    /// Every held nickname, in session order.
    #[cfg(test)]
    fn roster(&self) -> Vec<String> {
        self.sorted_holders(None)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    fn roster_excluding(&self, session: SessionId) -> Vec<String> {
        self.sorted_holders(Some(session))
    }

    fn sorted_holders(&self, skip: Option<SessionId>) -> Vec<String> {
        let mut holders: Vec<&Holder> = self
            .held
            .values()
            .filter(|h| Some(h.session) != skip)
            .collect();
        holders.sort_by_key(|h| h.session);
        holders.into_iter().map(|h| h.display.clone()).collect()
    }
}
