// ==========================================
// Precast tracking backend - activity log queue
// ==========================================
// record() never blocks and never fails the caller:
//   caller ──try_send──▶ bounded mpsc ──▶ drain task ──▶ activity_logs
// A full queue or a failed insert is logged and the entry dropped.
// shutdown() closes the queue and drains what is already buffered.
// ==========================================

use crate::domain::{ActivityAction, ActivityLog, CallerContext};
use crate::repository::ActivityLogRepository;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ActivityLogger {
    tx: mpsc::Sender<ActivityLog>,
}

/// Handle on the drain task.
pub struct ActivityLogWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<usize>,
}

impl ActivityLogger {
    /// Spawn the drain task. Must be called inside a tokio runtime.
    pub fn start(repo: Arc<ActivityLogRepository>, capacity: usize) -> (Self, ActivityLogWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(drain(repo, rx, shutdown_rx));

        (
            Self { tx },
            ActivityLogWorker {
                shutdown: shutdown_tx,
                handle,
            },
        )
    }

    /// Queue one entry.
    pub fn record(&self, log: ActivityLog) {
        if let Err(e) = self.tx.try_send(log) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "queue closed",
            };
            tracing::warn!(reason, "activity log entry dropped");
        }
    }

    pub fn record_action(
        &self,
        caller: &CallerContext,
        project_id: Option<i64>,
        action: ActivityAction,
        detail: Option<JsonValue>,
    ) {
        self.record(ActivityLog {
            project_id,
            actor: caller.user_id,
            host: caller.host.clone(),
            ip: caller.ip.clone(),
            action,
            detail_json: detail,
            created_at: Utc::now(),
        });
    }
}

impl ActivityLogWorker {
    /// Stop accepting entries, write the buffered ones, return the total written.
    pub async fn shutdown(self) -> usize {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(written) => written,
            Err(e) => {
                tracing::error!(error = %e, "activity log worker failed");
                0
            }
        }
    }
}

async fn drain(
    repo: Arc<ActivityLogRepository>,
    mut rx: mpsc::Receiver<ActivityLog>,
    mut shutdown: oneshot::Receiver<()>,
) -> usize {
    let mut written = 0;
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(log) => written += write(&repo, &log),
                None => break,
            },
            _ = &mut shutdown => {
                rx.close();
                while let Some(log) = rx.recv().await {
                    written += write(&repo, &log);
                }
                break;
            }
        }
    }
    tracing::debug!(written, "activity log worker stopped");
    written
}

fn write(repo: &ActivityLogRepository, log: &ActivityLog) -> usize {
    match repo.insert(log) {
        Ok(_) => 1,
        Err(e) => {
            tracing::warn!(action = log.action.as_str(), error = %e, "activity log write failed");
            0
        }
    }
}
