//! Durable record of known fingerprints and the sequence counter.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::Fingerprint;
use crate::constants::LEDGER_DOCUMENT;
use crate::store::StateStore;

/// Persisted ledger document: `{"hashes": [...], "last_stt": n}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(rename = "hashes")]
    pub fingerprints: BTreeSet<Fingerprint>,
    /// Last sequence handed out; 0 for a ledger that never accepted anything.
    #[serde(rename = "last_stt")]
    pub last_sequence: u64,
}

/// Fingerprint membership and sequence allocation for one data directory.
///
/// The document is read on first use and written through on every mutation.
/// All access goes through one async mutex, so concurrent downloads see a
/// consistent set and counter.
pub struct Ledger {
    store: Arc<dyn StateStore>,
    state: Mutex<Option<LedgerState>>,
}

impl Ledger {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            state: Mutex::new(None),
        }
    }

    pub async fn contains(&self, fp: &Fingerprint) -> bool {
        let mut guard = self.lock().await;
        loaded(&mut guard).fingerprints.contains(fp)
    }

    /// Register a fingerprint unless it is already known.
    ///
    /// Returns the newly allocated sequence, or `None` for a duplicate. The
    /// check and the registration happen under the same lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated ledger cannot be persisted; the
    /// in-memory state is left as it was.
    pub async fn try_register(&self, fp: &Fingerprint) -> Result<Option<u64>> {
        let mut guard = self.lock().await;
        let state = loaded(&mut guard);
        if state.fingerprints.contains(fp) {
            return Ok(None);
        }

        let previous = state.last_sequence;
        let sequence = previous + 1;
        state.fingerprints.insert(fp.clone());
        state.last_sequence = sequence;

        if let Err(e) = self.persist(state).await {
            state.fingerprints.remove(fp);
            state.last_sequence = previous;
            return Err(e);
        }

        debug!(fingerprint = %fp, sequence, "Registered fingerprint");
        Ok(Some(sequence))
    }

    /// Register a fingerprint the caller knows to be new.
    ///
    /// # Errors
    ///
    /// Returns an error if the fingerprint is already registered or the ledger
    /// cannot be persisted.
    pub async fn register(&self, fp: &Fingerprint) -> Result<u64> {
        self.try_register(fp)
            .await?
            .with_context(|| format!("Fingerprint {fp} is already registered"))
    }

    /// Forget a fingerprint. Sequence numbers are never recycled.
    ///
    /// Returns whether the fingerprint was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated ledger cannot be persisted.
    pub async fn remove(&self, fp: &Fingerprint) -> Result<bool> {
        let mut guard = self.lock().await;
        let state = loaded(&mut guard);
        if !state.fingerprints.remove(fp) {
            return Ok(false);
        }

        if let Err(e) = self.persist(state).await {
            state.fingerprints.insert(fp.clone());
            return Err(e);
        }

        debug!(fingerprint = %fp, "Removed fingerprint");
        Ok(true)
    }

    /// Forget every fingerprint while keeping the sequence counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated ledger cannot be persisted.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.lock().await;
        let state = loaded(&mut guard);
        let cleared = LedgerState {
            fingerprints: BTreeSet::new(),
            last_sequence: state.last_sequence,
        };
        self.persist(&cleared).await?;
        *state = cleared;
        Ok(())
    }

    pub async fn last_sequence(&self) -> u64 {
        let mut guard = self.lock().await;
        loaded(&mut guard).last_sequence
    }

    pub async fn len(&self) -> usize {
        let mut guard = self.lock().await;
        loaded(&mut guard).fingerprints.len()
    }

    pub async fn is_empty(&self) -> bool {
        let mut guard = self.lock().await;
        loaded(&mut guard).fingerprints.is_empty()
    }

    /// Copy of the current in-memory state.
    pub async fn snapshot(&self) -> LedgerState {
        let mut guard = self.lock().await;
        loaded(&mut guard).clone()
    }

    /// Lock the state, reading it from the store on first use.
    async fn lock(&self) -> MutexGuard<'_, Option<LedgerState>> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        guard
    }

    /// Read the persisted document, treating anything unusable as empty.
    async fn load(&self) -> LedgerState {
        let bytes = match self.store.load(LEDGER_DOCUMENT).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return LedgerState::default(),
            Err(e) => {
                warn!("Ledger unreadable, starting empty: {e:#}");
                return LedgerState::default();
            }
        };

        match serde_json::from_slice::<LedgerState>(&bytes) {
            Ok(state) => {
                debug!(
                    fingerprints = state.fingerprints.len(),
                    last_sequence = state.last_sequence,
                    "Ledger loaded"
                );
                state
            }
            Err(e) => {
                warn!(error = %e, "Ledger document is malformed, starting empty");
                LedgerState::default()
            }
        }
    }

    async fn persist(&self, state: &LedgerState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state).context("Failed to serialize ledger")?;
        self.store
            .save(LEDGER_DOCUMENT, &bytes)
            .await
            .context("Failed to persist ledger")
    }
}

fn loaded(slot: &mut Option<LedgerState>) -> &mut LedgerState {
    slot.get_or_insert_with(LedgerState::default)
}
