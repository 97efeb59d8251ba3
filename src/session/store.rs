//! Session store keyed by session id

use crate::chain::ChainManager;
use crate::error::{ComposerError, ComposerResult};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::submission::{SubmissionController, SubmissionView};
use crate::tx::RawFields;
use crate::wallet::{Passphrase, WalletRpc};

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// One open transaction form
pub struct Session {
    id: Uuid,
    network: String,
    controller: Arc<Mutex<SubmissionController>>,
    views: watch::Receiver<SubmissionView>,
    progress: Arc<ProgressTracker>,
    created_at: DateTime<Utc>,
    /// Unix millis of the last sign/broadcast request
    last_active: AtomicI64,
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub network: String,
    pub busy: bool,
    pub submission: SubmissionView,
    pub progress: ProgressSnapshot,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a sign or broadcast is currently running
    pub fn is_busy(&self) -> bool {
        self.controller.try_lock().is_err()
    }

    /// Snapshot without waiting for in-flight work
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            network: self.network.clone(),
            busy: self.is_busy(),
            submission: self.views.borrow().clone(),
            progress: self.progress.snapshot(),
            created_at: self.created_at,
            last_active: self.last_active(),
        }
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_active.load(Ordering::Relaxed))
            .single()
            .unwrap_or(self.created_at)
    }

    fn touch(&self) {
        self.last_active
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn lock_idle(&self) -> ComposerResult<OwnedMutexGuard<SubmissionController>> {
        self.touch();
        self.controller
            .clone()
            .try_lock_owned()
            .map_err(|_| ComposerError::SessionBusy(self.id.to_string()))
    }

    /// Run `work` on its own task. A caller that stops waiting does not cancel it.
    async fn detach<F>(&self, work: F) -> ComposerResult<()>
    where
        F: Future<Output = ComposerResult<()>> + Send + 'static,
    {
        tokio::spawn(work).await.map_err(|e| {
            ComposerError::Internal(format!("session {} task failed: {}", self.id, e))
        })?
    }

    /// Sign the form's transaction. Rejected while another request is running.
    pub async fn sign(
        &self,
        raw: &RawFields,
        passphrase: &Passphrase,
    ) -> ComposerResult<SessionView> {
        let mut controller = self.lock_idle()?;
        let (raw, passphrase) = (raw.clone(), passphrase.clone());
        self.detach(async move {
            controller.submit_sign(&raw, &passphrase).await.map(drop)
        })
        .await?;
        Ok(self.view())
    }

    /// Clear the form's result so the session can be reused
    pub fn reset(&self) -> ComposerResult<SessionView> {
        let mut controller = self.lock_idle()?;
        controller.reset();
        drop(controller);
        Ok(self.view())
    }

    /// Broadcast the signed transaction. Rejected while another request is running.
    pub async fn broadcast(&self) -> ComposerResult<SessionView> {
        let mut controller = self.lock_idle()?;
        self.detach(async move { controller.submit_broadcast().await.map(drop) })
            .await?;
        Ok(self.view())
    }
}

/// All open sessions
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Session>>,
    chains: Arc<ChainManager>,
    wallet: Arc<dyn WalletRpc>,
    idle_timeout: chrono::Duration,
}

impl SessionStore {
    pub fn new(
        chains: Arc<ChainManager>,
        wallet: Arc<dyn WalletRpc>,
        idle_timeout: chrono::Duration,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            chains,
            wallet,
            idle_timeout,
        }
    }

    /// Open a session on `network`, or the default network
    pub fn create(&self, network: Option<&str>) -> ComposerResult<Arc<Session>> {
        let network = self.chains.get(network)?;
        let id = Uuid::new_v4();
        let progress = Arc::new(ProgressTracker::new(format!("{}:{}", network.name, id)));
        let network_name = network.name.clone();

        let controller = SubmissionController::new(network, self.wallet.clone(), progress.clone());
        let now = Utc::now();
        let session = Arc::new(Session {
            id,
            network: network_name,
            views: controller.subscribe(),
            controller: Arc::new(Mutex::new(controller)),
            progress,
            created_at: now,
            last_active: AtomicI64::new(now.timestamp_millis()),
        });

        self.sessions.insert(id, session.clone());
        crate::metrics::set_active_sessions(self.sessions.len());
        info!("Opened session {} on {}", id, session.network);

        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> ComposerResult<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ComposerError::SessionNotFound(id.to_string()))
    }

    pub fn remove(&self, id: Uuid) -> ComposerResult<()> {
        self.sessions
            .remove(&id)
            .ok_or_else(|| ComposerError::SessionNotFound(id.to_string()))?;
        crate::metrics::set_active_sessions(self.sessions.len());
        debug!("Closed session {}", id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle longer than the timeout. Busy sessions are kept.
    pub fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.idle_timeout;
        let before = self.sessions.len();

        self.sessions
            .retain(|_, session| session.is_busy() || session.last_active() > cutoff);

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!("Evicted {} idle session(s)", removed);
            crate::metrics::set_active_sessions(self.sessions.len());
        }
        removed
    }
}
