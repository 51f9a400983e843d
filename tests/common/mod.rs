#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use bulkcast::audit::{AuditRecord, AuditSink, LogWriteError};
use bulkcast::channel::{Attachment, Channel, ChannelError, ChannelKind, Delivery};
use bulkcast::config::{Config, GatewayConfig, SheetsConfig, SmtpConfig};
use bulkcast::roster::{Recipient, Roster, SenderCredential};
use bulkcast::state::{AppState, SharedState};

/// Audit sink that keeps records in memory and can be told to fail.
#[derive(Default)]
pub struct RecordingAudit {
    pub records: Mutex<Vec<AuditRecord>>,
    pub append_calls: Mutex<usize>,
    /// 0-based append calls that should fail.
    pub fail_appends: HashSet<usize>,
    pub check_error: Option<String>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(indices: &[usize]) -> Self {
        Self {
            fail_appends: indices.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn unusable(message: &str) -> Self {
        Self {
            check_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.append_calls.lock().unwrap()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn check(&self) -> Result<(), LogWriteError> {
        match &self.check_error {
            Some(msg) => Err(LogWriteError::Misconfigured(msg.clone())),
            None => Ok(()),
        }
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), LogWriteError> {
        let call = {
            let mut calls = self.append_calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        if self.fail_appends.contains(&call) {
            return Err(LogWriteError::Unreachable("simulated outage".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Channel that succeeds unless told to fail for a given 0-based attempt.
pub struct ScriptedChannel {
    pub kind: ChannelKind,
    pub fail_attempts: HashSet<usize>,
    pub delivered: Vec<(String, String)>,
    pub attachments: Vec<Option<String>>,
}

impl ScriptedChannel {
    pub fn succeeding(kind: ChannelKind) -> Self {
        Self {
            kind,
            fail_attempts: HashSet::new(),
            delivered: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn failing_on(kind: ChannelKind, attempts: &[usize]) -> Self {
        Self {
            fail_attempts: attempts.iter().copied().collect(),
            ..Self::succeeding(kind)
        }
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(
        &mut self,
        recipient: &Recipient,
        message: &str,
        attachment: Option<&Attachment>,
    ) -> Delivery {
        let attempt = self.delivered.len();
        self.delivered
            .push((recipient.name.clone(), message.to_string()));
        self.attachments
            .push(attachment.map(|a| a.file_name.clone()));

        let result = if self.fail_attempts.contains(&attempt) {
            Err(ChannelError::from("simulated network error"))
        } else {
            Ok(())
        };

        Delivery {
            sender: "scripted@sender.test".to_string(),
            receiver: recipient.email.clone().or_else(|| recipient.number.clone()),
            outcome: result.into(),
        }
    }
}

pub fn roster() -> Roster {
    Roster {
        recipients: vec![
            Recipient::new("Ana")
                .with_dept("X")
                .with_email("ana@x.com")
                .with_number("966500000001"),
            Recipient::new("Bo")
                .with_dept("Y")
                .with_email("bo@y.com")
                .with_number("966500000002"),
            Recipient::new("Cy")
                .with_dept("X")
                .with_email("cy@x.com")
                .with_number("966500000003"),
        ],
        senders: vec![SenderCredential::new("sender@test.com", "app-pass")],
    }
}

pub fn test_config(gateway: Option<GatewayConfig>) -> Config {
    Config {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        log_level: "warn".to_string(),
        receivers_path: PathBuf::from("unused-receivers.csv"),
        senders_path: PathBuf::from("unused-senders.csv"),
        max_upload_size: 1_048_576,
        smtp: SmtpConfig::default(),
        gateway,
        sheets: SheetsConfig::default(),
    }
}

pub fn gateway(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: base_url.to_string(),
        instance_name: "inst-1".to_string(),
        api_key: "key-1".to_string(),
    }
}

/// Service-account key JSON whose token endpoint points at `token_uri`.
pub fn service_account_json(token_uri: &str) -> String {
    let raw = std::fs::read_to_string(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/service_account.json"),
    )
    .expect("fixture key missing");
    let mut key: Value = serde_json::from_str(&raw).unwrap();
    key["token_uri"] = json!(token_uri);
    key.to_string()
}

/// A running dispatcher bound to a random local port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: SharedState,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get_json(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn start_run(&self, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/runs"))
            .json(body)
            .send()
            .await
            .expect("run request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Start a run with a hand-built multipart body.
    pub async fn start_run_multipart(
        &self,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (Value, StatusCode) {
        let boundary = "bulkcast-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"attachment\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let resp = self
            .client
            .post(self.url("/api/v1/runs"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .expect("multipart run request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

pub async fn spawn_app(config: Config, roster: Roster, audit: Arc<dyn AuditSink>) -> TestApp {
    let state = AppState::new(config, roster, audit);
    let app = bulkcast::build_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        client: Client::new(),
        state,
    }
}
