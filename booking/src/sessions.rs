//! Bearer-token session directory.
//!
//! Token issuance lives outside this service. The directory only maps a
//! bearer token to an account id; the role is read from the account on
//! every request, so deleting an account revokes its tokens.

use crate::types::{Account, Role, UserId};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// Maps bearer tokens to accounts.
pub trait SessionDirectory: Send + Sync {
    /// Account behind `token`, if the token is known.
    fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Tokens held in memory.
#[derive(Debug, Default)]
pub struct InMemorySessions {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl InMemorySessions {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory with one extra token (builder style)
    #[must_use]
    pub fn with_token(self, token: impl Into<String>, user_id: UserId) -> Self {
        self.insert(token, user_id);
        self
    }

    /// Register `token` for `user_id`, replacing any previous mapping.
    pub fn insert(&self, token: impl Into<String>, user_id: UserId) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.into(), user_id);
        }
    }

    /// Number of known tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().map_or(0, |tokens| tokens.len())
    }

    /// Whether no token is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionDirectory for InMemorySessions {
    fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.read().ok()?.get(token).copied()
    }
}

/// One entry of the sessions seed file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSeed {
    /// Bearer token
    pub token: String,
    /// Account id
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Account role
    pub role: Role,
}

impl SessionSeed {
    /// The account this seed describes
    #[must_use]
    pub fn account(&self) -> Account {
        Account {
            id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Parse a sessions seed document (a JSON array of [`SessionSeed`]).
///
/// # Errors
///
/// Fails on malformed JSON or a token listed twice.
pub fn parse_seeds(json: &str) -> anyhow::Result<Vec<SessionSeed>> {
    let seeds: Vec<SessionSeed> =
        serde_json::from_str(json).context("Sessions file is not a JSON array of sessions")?;

    let mut seen = std::collections::HashSet::new();
    for seed in &seeds {
        anyhow::ensure!(
            seen.insert(seed.token.as_str()),
            "Token for {} is listed twice",
            seed.email
        );
    }
    Ok(seeds)
}

/// Read and parse the sessions seed file at `path`.
///
/// # Errors
///
/// Fails if the file cannot be read or [`parse_seeds`] rejects it.
pub fn load_seed_file(path: &Path) -> anyhow::Result<Vec<SessionSeed>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sessions file {}", path.display()))?;
    parse_seeds(&json)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_tokens_only() {
        let asha = UserId::new();
        let sessions = InMemorySessions::new().with_token("tok-asha", asha);

        assert_eq!(sessions.resolve("tok-asha"), Some(asha));
        assert_eq!(sessions.resolve("tok-ravi"), None);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn parses_seed_file_into_accounts() {
        let id = UserId::new();
        let json = format!(
            r#"[{{"token":"t1","user_id":"{id}","name":"Meera","email":"meera@example.com","role":"DONOR"}}]"#
        );

        let seeds = parse_seeds(&json).unwrap();

        assert_eq!(seeds.len(), 1);
        let account = seeds[0].account();
        assert_eq!(account.id, id);
        assert_eq!(account.role, Role::Donor);
    }

    #[test]
    fn duplicate_tokens_are_rejected() {
        let json = format!(
            r#"[{{"token":"t","user_id":"{}","name":"A","email":"a@x","role":"USER"}},
                {{"token":"t","user_id":"{}","name":"B","email":"b@x","role":"USER"}}]"#,
            UserId::new(),
            UserId::new()
        );
        assert!(parse_seeds(&json).is_err());
        assert!(parse_seeds("{}").is_err());
    }
}
