//! Submission state machine
//!
//! ```text
//! Idle -> Signing -> Signed -> Broadcasting -> Broadcast
//!            \                      /
//!             +------> Error <-----+
//! ```
//!
//! `submit_sign` is accepted from every state and always starts over;
//! `submit_broadcast` is only accepted from `Signed`.

use crate::chain::Network;
use crate::error::{ComposerError, ComposerResult};
use crate::progress::{ProgressGuard, ProgressSink};
use crate::tx::{PayloadBuilder, RawFields};
use crate::wallet::{Passphrase, SignatureArtifact, WalletRpc};

use ethers::types::H256;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Progress shown as soon as a broadcast starts
pub const BROADCAST_PROGRESS_BASELINE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Signing,
    Signed,
    Broadcasting,
    Broadcast,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Signing => "signing",
            Phase::Signed => "signed",
            Phase::Broadcasting => "broadcasting",
            Phase::Broadcast => "broadcast",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Signing,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Signing,
    Signed {
        artifact: SignatureArtifact,
    },
    Broadcasting,
    Broadcast {
        transaction_hash: H256,
        explorer_url: String,
    },
    Error(Failure),
}

impl SubmissionState {
    pub fn phase(&self) -> Phase {
        match self {
            SubmissionState::Idle => Phase::Idle,
            SubmissionState::Signing => Phase::Signing,
            SubmissionState::Signed { .. } => Phase::Signed,
            SubmissionState::Broadcasting => Phase::Broadcasting,
            SubmissionState::Broadcast { .. } => Phase::Broadcast,
            SubmissionState::Error(_) => Phase::Error,
        }
    }
}

/// What the form displays. Only one result is ever shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionResult {
    Unset,
    Signed {
        signature: String,
    },
    Broadcast {
        transaction_hash: H256,
        explorer_url: String,
    },
}

/// Presentation snapshot published on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionView {
    pub phase: Phase,
    pub result: SubmissionResult,
    pub error: Option<Failure>,
    pub can_broadcast: bool,
}

impl SubmissionView {
    fn of(state: &SubmissionState) -> Self {
        let result = match state {
            SubmissionState::Signed { artifact } => SubmissionResult::Signed {
                signature: artifact.to_hex(),
            },
            SubmissionState::Broadcast {
                transaction_hash,
                explorer_url,
            } => SubmissionResult::Broadcast {
                transaction_hash: *transaction_hash,
                explorer_url: explorer_url.clone(),
            },
            _ => SubmissionResult::Unset,
        };
        let error = match state {
            SubmissionState::Error(failure) => Some(failure.clone()),
            _ => None,
        };

        Self {
            phase: state.phase(),
            result,
            error,
            can_broadcast: matches!(state, SubmissionState::Signed { .. }),
        }
    }
}

/// Drives sign and broadcast for a single form instance.
///
/// Operations take `&mut self`, so one controller never has two submissions
/// in flight.
pub struct SubmissionController {
    network: Network,
    builder: PayloadBuilder,
    wallet: Arc<dyn WalletRpc>,
    progress: Arc<dyn ProgressSink>,
    state: SubmissionState,
    view_tx: watch::Sender<SubmissionView>,
}

impl SubmissionController {
    pub fn new(
        network: Network,
        wallet: Arc<dyn WalletRpc>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let state = SubmissionState::Idle;
        let (view_tx, _) = watch::channel(SubmissionView::of(&state));

        Self {
            builder: PayloadBuilder::new(network.client.clone()),
            network,
            wallet,
            progress,
            state,
            view_tx,
        }
    }

    /// Observe views as they change, including while an RPC call is pending
    pub fn subscribe(&self) -> watch::Receiver<SubmissionView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> SubmissionView {
        SubmissionView::of(&self.state)
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!(
            "[{}] submission {} -> {}",
            self.network.name,
            self.state.phase(),
            next.phase()
        );
        self.state = next;
        self.view_tx.send_replace(SubmissionView::of(&self.state));
    }

    fn fail(&mut self, err: &ComposerError) {
        let kind = match (self.state.phase(), err) {
            (_, ComposerError::Validation { .. }) => FailureKind::Validation,
            (Phase::Broadcasting, _) => FailureKind::Broadcast,
            _ => FailureKind::Signing,
        };

        if let Some(field) = err.field() {
            crate::metrics::record_validation_failure(field);
        }
        self.progress.notify_error(&err.to_string());
        self.transition(SubmissionState::Error(Failure {
            kind,
            message: err.user_message(),
            field: err.field(),
        }));
    }

    /// Build, then sign the form's transaction. Any previous result is
    /// cleared before the wallet is contacted.
    pub async fn submit_sign(
        &mut self,
        raw: &RawFields,
        passphrase: &Passphrase,
    ) -> ComposerResult<SignatureArtifact> {
        let in_flight = InFlight::start(self, SubmissionState::Signing);
        let outcome = in_flight.controller.sign(raw, passphrase).await;
        in_flight.complete();

        match outcome {
            Ok(artifact) => {
                info!(
                    "[{}] transaction signed ({} bytes)",
                    self.network.name,
                    artifact.as_bytes().len()
                );
                crate::metrics::record_sign(&self.network.name, "signed");
                self.transition(SubmissionState::Signed {
                    artifact: artifact.clone(),
                });
                Ok(artifact)
            }
            Err(err) => {
                crate::metrics::record_sign(&self.network.name, "failed");
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn sign(
        &self,
        raw: &RawFields,
        passphrase: &Passphrase,
    ) -> ComposerResult<SignatureArtifact> {
        let payload = self.builder.build(raw).await?;
        let params = payload.request.to_rpc_params();

        self.wallet
            .sign_transaction(&params, passphrase, &payload.chain_id_hex())
            .await
    }

    /// Broadcast the stored signature. Only valid right after a successful sign.
    pub async fn submit_broadcast(&mut self) -> ComposerResult<H256> {
        let artifact = match &self.state {
            SubmissionState::Signed { artifact } => artifact.clone(),
            other => {
                return Err(ComposerError::InvalidStateTransition {
                    from: other.phase().to_string(),
                    to: Phase::Broadcasting.to_string(),
                })
            }
        };

        let in_flight = InFlight::start(self, SubmissionState::Broadcasting);
        let outcome = {
            let controller = &*in_flight.controller;
            let _progress =
                ProgressGuard::start(controller.progress.clone(), BROADCAST_PROGRESS_BASELINE);
            controller.network.client.send_signed_transaction(&artifact).await
        };
        in_flight.complete();

        match outcome {
            Ok(transaction_hash) => {
                let explorer_url = self.network.explorer_url(transaction_hash);
                info!(
                    "[{}] broadcast {:?}, explorer: {}",
                    self.network.name, transaction_hash, explorer_url
                );
                crate::metrics::record_broadcast(&self.network.name, "broadcast");
                self.transition(SubmissionState::Broadcast {
                    transaction_hash,
                    explorer_url,
                });
                Ok(transaction_hash)
            }
            Err(err) => {
                let err = match err {
                    ComposerError::Broadcast(_) => err,
                    other => ComposerError::Broadcast(other.user_message()),
                };
                crate::metrics::record_broadcast(&self.network.name, "failed");
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Forget any result and return to `Idle`
    pub fn reset(&mut self) {
        self.transition(SubmissionState::Idle);
    }
}

/// An operation between its start transition and its outcome.
///
/// If the future driving it is dropped first, the controller moves to
/// `Error` instead of staying in `Signing` or `Broadcasting` forever.
struct InFlight<'a> {
    controller: &'a mut SubmissionController,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn start(controller: &'a mut SubmissionController, next: SubmissionState) -> Self {
        controller.transition(next);
        Self {
            controller,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let phase = self.controller.state.phase();
        let network = self.controller.network.name.clone();
        warn!("[{}] {} abandoned mid-flight", network, phase);
        match phase {
            Phase::Broadcasting => crate::metrics::record_broadcast(&network, "cancelled"),
            _ => crate::metrics::record_sign(&network, "cancelled"),
        }
        self.controller
            .fail(&ComposerError::Cancelled(phase.to_string()));
    }
}
