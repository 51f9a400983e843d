mod common;

use bulkcast::channel::email::EmailChannel;
use bulkcast::channel::{Attachment, ChannelKind};
use bulkcast::config::SmtpConfig;
use bulkcast::dispatch::{self, RunProgress, RunState};
use bulkcast::roster::{Recipient, SenderCredential};
use bulkcast::rotator::SenderRotator;
use bulkcast::template::MessageTemplate;
use tokio::sync::watch;

use common::{RecordingAudit, ScriptedChannel};

fn refs(recipients: &[Recipient]) -> Vec<&Recipient> {
    recipients.iter().collect()
}

#[tokio::test]
async fn every_recipient_gets_one_attempt_and_one_append() {
    let recipients: Vec<Recipient> = (0..5)
        .map(|i| Recipient::new(format!("R{i}")).with_email(format!("r{i}@test.com")))
        .collect();
    let mut channel = ScriptedChannel::failing_on(ChannelKind::Email, &[1, 3]);
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, _rx) = watch::channel(RunProgress::default());

    let report = dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        None,
        &progress,
    )
    .await;

    assert_eq!(channel.delivered.len(), 5);
    assert_eq!(audit.calls(), 5);
    assert_eq!(report.attempts.len(), 5);
    assert_eq!(report.processed, 5);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.summary, "3/5");
}

#[tokio::test]
async fn failure_in_the_middle_does_not_stop_the_run() {
    let recipients = vec![
        Recipient::new("One").with_email("one@test.com"),
        Recipient::new("Two").with_email("two@test.com"),
        Recipient::new("Three").with_email("three@test.com"),
    ];
    let mut channel = ScriptedChannel::failing_on(ChannelKind::Email, &[1]);
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, _rx) = watch::channel(RunProgress::default());

    let report = dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        None,
        &progress,
    )
    .await;

    let names: Vec<&str> = channel.delivered.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["One", "Two", "Three"]);

    let records = audit.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].status, "Success");
    assert_eq!(records[1].status, "Failed: simulated network error");
    assert_eq!(records[2].status, "Success");
    assert_eq!(records[1].receiver, "two@test.com");
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.summary, "2/3");
}

#[tokio::test]
async fn audit_failure_is_a_warning_not_an_abort() {
    let recipients = vec![
        Recipient::new("One").with_email("one@test.com"),
        Recipient::new("Two").with_email("two@test.com"),
        Recipient::new("Three").with_email("three@test.com"),
    ];
    let mut channel = ScriptedChannel::succeeding(ChannelKind::Email);
    let audit = RecordingAudit::failing_on(&[0]);
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, _rx) = watch::channel(RunProgress::default());

    let report = dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        None,
        &progress,
    )
    .await;

    assert_eq!(channel.delivered.len(), 3);
    assert_eq!(audit.calls(), 3);
    assert_eq!(audit.records().len(), 2);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.log_warnings.len(), 1);
    assert!(report.log_warnings[0].contains("one@test.com"));
    assert!(report.log_warnings[0].contains("simulated outage"));
}

#[tokio::test]
async fn two_recipients_email_end_to_end() {
    let recipients = vec![
        Recipient::new("Ana").with_dept("X").with_email("ana@x.com"),
        Recipient::new("Bo").with_dept("Y").with_email("bo@y.com"),
    ];
    let mut channel = ScriptedChannel::succeeding(ChannelKind::Email);
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hello {name}").unwrap();
    let (progress, rx) = watch::channel(RunProgress::default());

    let report = dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        None,
        &progress,
    )
    .await;

    let messages: Vec<&str> = channel.delivered.iter().map(|(_, m)| m.as_str()).collect();
    assert_eq!(messages, vec!["Hello Ana", "Hello Bo"]);

    let records = audit.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == "Success"));
    assert!(records.iter().all(|r| r.method == ChannelKind::Email));
    assert_eq!(records[0].department, "X");
    assert_eq!(records[1].department, "Y");
    assert_eq!(records[0].message, "Hello Ana");
    assert!(records.iter().all(|r| r.duration_secs >= 0.0));
    assert_eq!(report.summary, "2/2");

    let last = rx.borrow().clone();
    assert_eq!(last.state, RunState::Done);
    assert_eq!(last.processed, 2);
    assert_eq!(last.succeeded, 2);
    assert_eq!(last.total, 2);
    assert_eq!(last.readout(), "Sending 2/2");
    assert_eq!(last.run_id, Some(report.run_id));
}

#[tokio::test]
async fn missing_values_are_logged_as_not_available() {
    let recipients = vec![Recipient::new("Nobody")];
    let mut channel = ScriptedChannel::succeeding(ChannelKind::WhatsApp);
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, _rx) = watch::channel(RunProgress::default());

    dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        None,
        &progress,
    )
    .await;

    let records = audit.records();
    assert_eq!(records[0].department, "N/A");
    assert_eq!(records[0].receiver, "N/A");
    assert_eq!(records[0].method, ChannelKind::WhatsApp);
}

#[tokio::test]
async fn attachment_goes_to_every_recipient() {
    let recipients = vec![Recipient::new("Ana"), Recipient::new("Bo")];
    let mut channel = ScriptedChannel::succeeding(ChannelKind::WhatsApp);
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, _rx) = watch::channel(RunProgress::default());
    let attachment = Attachment {
        file_name: "flyer.png".to_string(),
        bytes: bytes::Bytes::from_static(b"\x89PNG"),
    };

    dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        Some(&attachment),
        &progress,
    )
    .await;

    assert_eq!(
        channel.attachments,
        vec![Some("flyer.png".to_string()), Some("flyer.png".to_string())]
    );
}

#[tokio::test]
async fn empty_recipient_set_finishes_immediately() {
    let mut channel = ScriptedChannel::succeeding(ChannelKind::Email);
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, rx) = watch::channel(RunProgress::default());

    let report = dispatch::run(&mut channel, &audit, &[], &template, None, &progress).await;

    assert_eq!(report.summary, "0/0");
    assert_eq!(audit.calls(), 0);
    assert_eq!(rx.borrow().state, RunState::Done);
}

#[tokio::test]
async fn email_rotation_advances_once_per_attempt_even_on_failure() {
    // Invalid addresses fail before any connection is attempted.
    let recipients = vec![
        Recipient::new("A").with_email("not-an-address"),
        Recipient::new("B"),
        Recipient::new("C").with_email("also not valid"),
    ];
    let senders = vec![
        SenderCredential::new("first@test.com", "pw1"),
        SenderCredential::new("second@test.com", "pw2"),
    ];
    let mut channel = EmailChannel::new(
        SmtpConfig::default(),
        "Subject".to_string(),
        SenderRotator::new(senders).unwrap(),
    );
    let audit = RecordingAudit::new();
    let template = MessageTemplate::parse("Hi {name}").unwrap();
    let (progress, _rx) = watch::channel(RunProgress::default());

    let report = dispatch::run(
        &mut channel,
        &audit,
        &refs(&recipients),
        &template,
        None,
        &progress,
    )
    .await;

    let records = audit.records();
    let senders: Vec<&str> = records.iter().map(|r| r.sender.as_str()).collect();
    assert_eq!(senders, vec!["first@test.com", "second@test.com", "first@test.com"]);

    assert!(records.iter().all(|r| r.status.starts_with("Failed: ")));
    assert!(records.iter().all(|r| r.status.len() > "Failed: ".len()));
    assert!(records[0].status.contains("Invalid to address"));
    assert!(records[1].status.contains("no email address"));
    assert_eq!(records[1].receiver, "N/A");
    assert_eq!(report.summary, "0/3");
}
