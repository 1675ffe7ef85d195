//! Access control: owner identity, granted identities and one-time tokens.

use std::collections::HashSet;
use std::sync::RwLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use crate::error::ShellBotError;
use crate::session::ContextStore;
use crate::transport::Identity;
use crate::Result;

/// Length of generated access tokens.
const TOKEN_LEN: usize = 24;

/// Thread-safe access state.
///
/// The owner is fixed at construction. Tokens are single use: redeeming
/// or revoking one removes it for good.
#[derive(Debug)]
pub struct AccessController {
    owner: Identity,
    granted: RwLock<HashSet<Identity>>,
    tokens: RwLock<HashSet<String>>,
}

impl AccessController {
    /// Create an access controller for the given owner.
    pub fn new(owner: Identity) -> Self {
        Self {
            owner,
            granted: RwLock::new(HashSet::new()),
            tokens: RwLock::new(HashSet::new()),
        }
    }

    /// The owner identity.
    pub fn owner(&self) -> Identity {
        self.owner
    }

    /// Check whether `identity` is the owner.
    pub fn is_owner(&self, identity: Identity) -> bool {
        identity == self.owner
    }

    /// Check whether `identity` may use the bot.
    pub fn is_allowed(&self, identity: Identity) -> bool {
        self.is_owner(identity)
            || self
                .granted
                .read()
                .map(|granted| granted.contains(&identity))
                .unwrap_or(false)
    }

    /// Generate a new pending token and return it.
    pub fn issue_token(&self) -> Result<String> {
        let token = generate_token();
        self.tokens
            .write()
            .map_err(|_| ShellBotError::LockPoisoned)?
            .insert(token.clone());
        info!("issued access token");
        Ok(token)
    }

    /// Check whether `token` is still pending.
    pub fn has_token(&self, token: &str) -> bool {
        self.tokens
            .read()
            .map(|tokens| tokens.contains(token))
            .unwrap_or(false)
    }

    /// Revoke a pending token without granting anything.
    pub fn revoke_token(&self, token: &str) -> bool {
        self.tokens
            .write()
            .map(|mut tokens| tokens.remove(token))
            .unwrap_or(false)
    }

    /// Consume `token` and grant access to `identity`.
    pub fn redeem(&self, token: &str, identity: Identity) -> Result<()> {
        let removed = self
            .tokens
            .write()
            .map_err(|_| ShellBotError::LockPoisoned)?
            .remove(token);
        if !removed {
            return Err(ShellBotError::InvalidToken);
        }
        self.grant(identity)?;
        info!(%identity, "token redeemed");
        Ok(())
    }

    /// Allow `identity` to use the bot.
    pub fn grant(&self, identity: Identity) -> Result<()> {
        self.granted
            .write()
            .map_err(|_| ShellBotError::LockPoisoned)?
            .insert(identity);
        info!(%identity, "access granted");
        Ok(())
    }

    /// Withdraw access from `identity` and discard its context.
    ///
    /// Fails with [`ShellBotError::SessionActive`] while the identity's
    /// context holds a session; nothing is changed in that case.
    pub fn revoke(&self, identity: Identity, contexts: &mut ContextStore) -> Result<()> {
        if contexts
            .get(identity)
            .is_some_and(|context| context.session.is_some())
        {
            return Err(ShellBotError::SessionActive);
        }

        self.granted
            .write()
            .map_err(|_| ShellBotError::LockPoisoned)?
            .remove(&identity);
        contexts.remove(identity);
        info!(%identity, "access revoked");
        Ok(())
    }

    /// Granted identities, sorted.
    pub fn granted(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self
            .granted
            .read()
            .map(|granted| granted.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Generate a random token suitable for deep links.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
