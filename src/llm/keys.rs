//! Completion-provider credential pool.

use rand::Rng;
use rand::seq::SliceRandom;
use secrecy::SecretString;

use crate::config::COMPLETION_KEY_VARS;
use crate::error::ConfigError;

/// Holds every configured completion credential and hands one out per request.
///
/// Selection is uniform and keeps no state between calls.
#[derive(Debug, Clone)]
pub struct KeyPool {
    keys: Vec<SecretString>,
}

impl KeyPool {
    pub fn new(keys: Vec<SecretString>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Pick a credential using the thread-local RNG.
    pub fn select(&self) -> Result<SecretString, ConfigError> {
        self.select_with(&mut rand::thread_rng())
    }

    /// Pick a credential with a caller-supplied RNG (seeded in tests).
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SecretString, ConfigError> {
        self.keys
            .choose(rng)
            .cloned()
            .ok_or_else(|| ConfigError::MissingCredential {
                key: COMPLETION_KEY_VARS.join(" / "),
                hint: "Set at least one completion API key.".to_string(),
            })
    }
}
