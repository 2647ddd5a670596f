//! Background task that keeps a claimant's lease alive.
//!
//! The driver owns a [`HolderMachine`], renews the held lease on a fixed
//! heartbeat, and publishes every state change over a `watch` channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use stake_core::api::LeaseGrant;
use stake_core::types::{Assignment, ClaimantForm};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};

use crate::error::{ClientError, Result};
use crate::machine::{HolderMachine, HolderState};
use crate::transport::LeaseApi;

const COMMAND_BUFFER: usize = 16;

/// Any single api call is abandoned after this share of the heartbeat.
const CALL_TIMEOUT_DIVISOR: u32 = 2;

enum Command {
    Select {
        resource_key: String,
        holder_token: Option<String>,
        reply: oneshot::Sender<Result<LeaseGrant>>,
    },
    Commit {
        form: Box<ClaimantForm>,
        reply: oneshot::Sender<Result<Assignment>>,
    },
    Release {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running heartbeat task.
///
/// Dropping every handle stops the task after a best-effort release.
pub struct HeartbeatDriver {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<HolderState>,
    task: JoinHandle<()>,
}

impl HeartbeatDriver {
    /// Spawn the driver on the current tokio runtime.
    pub fn spawn(api: Arc<dyn LeaseApi>, heartbeat: Duration) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state) = watch::channel(HolderState::Unheld);

        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let worker = Worker {
            api,
            machine: HolderMachine::new(),
            state: state_tx,
            ticker,
            call_timeout: heartbeat / CALL_TIMEOUT_DIVISOR,
        };
        let task = tokio::spawn(worker.run(rx));

        Self {
            commands,
            state,
            task,
        }
    }

    /// Select a resource, optionally resuming a previously held token.
    ///
    /// Selecting a different resource while holding one releases the old lease first.
    pub async fn select(
        &self,
        resource_key: &str,
        holder_token: Option<String>,
    ) -> Result<LeaseGrant> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Select {
            resource_key: resource_key.to_string(),
            holder_token,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Commit the held lease with `form`.
    pub async fn commit(&self, form: ClaimantForm) -> Result<Assignment> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Commit {
            form: Box::new(form),
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Best-effort release of the held lease.
    pub async fn release(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Release { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> HolderState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HolderState> {
        self.state.clone()
    }

    /// Release, stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        self.release().await;
        drop(self.commands);
        let _ = self.task.await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> ClientError {
    ClientError::InvalidTransition("heartbeat driver has stopped".to_string())
}

async fn within<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    timeout(limit, call)
        .await
        .unwrap_or(Err(ClientError::Timeout(limit)))
}

struct Worker {
    api: Arc<dyn LeaseApi>,
    machine: HolderMachine,
    state: watch::Sender<HolderState>,
    ticker: Interval,
    call_timeout: Duration,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let held = self.machine.state().is_held();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        self.release().await;
                        break;
                    }
                },
                _ = self.ticker.tick(), if held => self.renew().await,
            }
        }
        tracing::debug!("Heartbeat driver stopped");
    }

    fn publish(&self) {
        self.state.send_replace(self.machine.state().clone());
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Select {
                resource_key,
                holder_token,
                reply,
            } => {
                let _ = reply.send(self.select(&resource_key, holder_token).await);
            }
            Command::Commit { form, reply } => {
                let _ = reply.send(self.commit(&form).await);
            }
            Command::Release { reply } => {
                self.release().await;
                let _ = reply.send(());
            }
        }
    }

    async fn select(&mut self, resource_key: &str, holder_token: Option<String>) -> Result<LeaseGrant> {
        if let Some(grant) = self.machine.state().grant() {
            if grant.resource_key == resource_key {
                return self.renew_now().await;
            }
            self.release().await;
        }

        self.machine.begin_acquire(resource_key, holder_token.clone())?;
        self.publish();

        match within(self.call_timeout, self.api.acquire(resource_key, holder_token.as_deref())).await {
            Ok(grant) => {
                tracing::info!(
                    resource_key = %grant.resource_key,
                    expires_at = grant.expires_at,
                    "🔒 Lease acquired"
                );
                self.machine.acquired(grant.clone())?;
                self.ticker.reset();
                self.publish();
                Ok(grant)
            }
            Err(e) => {
                tracing::info!(resource_key = %resource_key, error = %e, "Lease acquire failed");
                self.machine.acquire_failed()?;
                self.publish();
                Err(e)
            }
        }
    }

    /// Renew immediately and report the outcome to the caller.
    async fn renew_now(&mut self) -> Result<LeaseGrant> {
        self.renew().await;
        match self.machine.state() {
            HolderState::Held { grant } => Ok(grant.clone()),
            HolderState::Lost { reason, .. } => Err(ClientError::InvalidTransition(format!(
                "lease lost: {}",
                reason
            ))),
            other => Err(ClientError::InvalidTransition(format!(
                "unexpected state after renewal: {:?}",
                other
            ))),
        }
    }

    async fn renew(&mut self) {
        let Ok((resource_key, holder_token)) = self.machine.begin_renew() else {
            return;
        };
        self.publish();

        let renewal = within(self.call_timeout, self.api.acquire(&resource_key, Some(&holder_token)));
        let outcome = match renewal.await {
            Ok(grant) => {
                tracing::debug!(
                    resource_key = %resource_key,
                    expires_at = grant.expires_at,
                    "💓 Lease renewed"
                );
                self.machine.renewed(grant)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(resource_key = %resource_key, error = %e, "Renewal not confirmed, retrying next beat");
                self.machine.renew_deferred()
            }
            Err(e) => {
                tracing::warn!(resource_key = %resource_key, error = %e, "⚠️  Lease lost");
                self.machine.lost(e.to_string())
            }
        };
        if let Err(e) = outcome {
            tracing::error!(error = %e, "Renewal left the holder in an unexpected state");
        }
        self.publish();
    }

    async fn commit(&mut self, form: &ClaimantForm) -> Result<Assignment> {
        let (resource_key, holder_token) = self.machine.begin_commit()?;
        self.publish();

        let result = within(self.call_timeout, self.api.commit(&resource_key, &holder_token, form)).await;
        match &result {
            Ok(assignment) => {
                tracing::info!(
                    resource_key = %resource_key,
                    assignment_id = %assignment.id,
                    "✅ Assignment committed"
                );
                self.machine.committed(assignment.id.clone())?;
            }
            Err(e) if e.loses_lease() => {
                tracing::warn!(resource_key = %resource_key, error = %e, "⚠️  Lease lost at commit");
                self.machine.lost(e.to_string())?;
            }
            Err(e) => {
                tracing::info!(resource_key = %resource_key, error = %e, "Commit rejected, lease kept");
                self.machine.commit_failed()?;
            }
        }
        self.publish();
        result
    }

    async fn release(&mut self) {
        let pair = match self.machine.release() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!(error = %e, "Nothing to release");
                return;
            }
        };
        self.publish();

        if let Some((resource_key, holder_token)) = pair {
            match within(self.call_timeout, self.api.release(&resource_key, &holder_token)).await {
                Ok(released) => {
                    tracing::info!(resource_key = %resource_key, released, "🔓 Lease released")
                }
                Err(e) => {
                    tracing::warn!(resource_key = %resource_key, error = %e, "Release not delivered")
                }
            }
        }
    }
}
