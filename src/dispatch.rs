use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink};
use crate::channel::{Attachment, Channel, ChannelKind};
use crate::roster::Recipient;
use crate::template::MessageTemplate;

/// Placeholder for audit cells whose value the recipient row does not have.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
}

/// Live counters of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunProgress {
    pub run_id: Option<Uuid>,
    pub method: Option<ChannelKind>,
    pub state: RunState,
    pub processed: usize,
    pub succeeded: usize,
    pub total: usize,
}

impl RunProgress {
    pub fn readout(&self) -> String {
        format!("Sending {}/{}", self.succeeded, self.total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub method: ChannelKind,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub summary: String,
    pub attempts: Vec<AuditRecord>,
    pub log_warnings: Vec<String>,
}

/// Attempt delivery to every recipient once, in order, logging each attempt.
///
/// Delivery failures and audit failures are both contained here: the loop
/// always reaches the last recipient.
pub async fn run(
    channel: &mut dyn Channel,
    audit: &dyn AuditSink,
    recipients: &[&Recipient],
    template: &MessageTemplate,
    attachment: Option<&Attachment>,
    progress: &watch::Sender<RunProgress>,
) -> RunReport {
    let run_id = Uuid::now_v7();
    let method = channel.kind();
    let total = recipients.len();

    progress.send_replace(RunProgress {
        run_id: Some(run_id),
        method: Some(method),
        state: RunState::Running,
        processed: 0,
        succeeded: 0,
        total,
    });

    tracing::info!("Run {run_id} started: {total} recipients via {method}");

    let mut succeeded = 0;
    let mut attempts = Vec::with_capacity(total);
    let mut log_warnings = Vec::new();

    for (index, recipient) in recipients.iter().enumerate() {
        let message = template.render(&recipient.name);

        let started = Instant::now();
        let delivery = channel.deliver(recipient, &message, attachment).await;
        let duration_secs = started.elapsed().as_secs_f64();

        let receiver = delivery
            .receiver
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        if delivery.outcome.is_success() {
            succeeded += 1;
        } else {
            tracing::warn!(
                "Delivery to {receiver} failed: {}",
                delivery.outcome.status_text()
            );
        }

        let record = AuditRecord {
            timestamp: Local::now().naive_local(),
            method,
            sender: delivery.sender,
            receiver,
            department: recipient
                .dept
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            duration_secs,
            message,
            status: delivery.outcome.status_text(),
        };

        if let Err(e) = audit.append(&record).await {
            tracing::warn!("Failed to log message to {}: {e}", record.receiver);
            log_warnings.push(format!("Failed to log message to {}: {e}", record.receiver));
        }

        attempts.push(record);

        progress.send_modify(|p| {
            p.processed = index + 1;
            p.succeeded = succeeded;
        });
        tracing::debug!("Run {run_id}: {}/{total} processed, {succeeded} sent", index + 1);
    }

    progress.send_modify(|p| p.state = RunState::Done);

    let summary = format!("{succeeded}/{total}");
    tracing::info!("Run {run_id} finished: {summary} messages processed");

    RunReport {
        run_id,
        method,
        total,
        processed: attempts.len(),
        succeeded,
        summary,
        attempts,
        log_warnings,
    }
}
