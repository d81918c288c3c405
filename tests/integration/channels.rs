//! Integration tests for the HTTP notification channels, against a mock server
//!
//! These tests verify that:
//! - Each channel posts the payload its endpoint expects
//! - Non-success responses surface as per-channel errors
//! - One failing channel does not keep the others from delivering

use chrono::Utc;
use serde_json::json;
use site_monitoring::{
    alerts::{
        AlertDispatcher, AlertEvent, ChannelError, ChannelOutcome, NotificationChannel, Severity,
        channels::{self, DiscordChannel, EmailChannel, SlackChannel, WebhookChannel},
    },
    config::{ChannelConfig, Discord, Email, Slack, Webhook},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn disk_alert() -> AlertEvent {
    AlertEvent::new("disk_usage", Severity::Warning, "Disk usage is 92.0% (threshold: 90.0%)", Utc::now())
        .with_measurement(92.0, 90.0, "%")
        .with_context("path", "/srv/site")
}

#[tokio::test]
async fn test_discord_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .and(body_partial_json(json!({
            "content": "⚠️ `disk_usage` <@42>",
            "embeds": [{ "title": "⚠️ Disk Usage", "color": 15105570 }],
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let channel = DiscordChannel::new(
        channels::http_client().unwrap(),
        Discord {
            url: format!("{}/discord", server.uri()),
            user_id: Some("42".to_string()),
        },
    );
    channel.send(&disk_alert()).await.unwrap();
}

#[tokio::test]
async fn test_slack_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .and(body_partial_json(json!({
            "text": "*Disk Usage*",
            "channel": "#ops",
            "attachments": [{ "color": "warning" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let channel = SlackChannel::new(
        channels::http_client().unwrap(),
        Slack {
            url: format!("{}/slack", server.uri()),
            channel: Some("#ops".to_string()),
            username: None,
        },
    );
    channel.send(&disk_alert()).await.unwrap();
}

#[tokio::test]
async fn test_webhook_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "alert_type": "disk_usage",
            "severity": "warning",
            "context": { "value": 92.0, "threshold": 90.0, "unit": "%", "path": "/srv/site" },
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(
        channels::http_client().unwrap(),
        Webhook {
            url: format!("{}/hook", server.uri()),
        },
    );
    channel.send(&disk_alert()).await.unwrap();
}

#[tokio::test]
async fn test_email_delivery_through_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer relay-key"))
        .and(body_partial_json(json!({
            "from": "ops@site.test",
            "to": ["me@site.test"],
            "subject": "[WARNING] Disk Usage",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channel = EmailChannel::new(
        channels::http_client().unwrap(),
        Email {
            relay_url: format!("{}/send", server.uri()),
            from: "ops@site.test".to_string(),
            to: vec!["me@site.test".to_string()],
            api_key: Some("relay-key".to_string()),
        },
    );
    channel.send(&disk_alert()).await.unwrap();
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(
        channels::http_client().unwrap(),
        Webhook {
            url: format!("{}/hook", server.uri()),
        },
    );
    let err = channel.send(&disk_alert()).await.unwrap_err();

    match err {
        ChannelError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let channel = WebhookChannel::new(
        channels::http_client().unwrap(),
        Webhook {
            // nothing listens on the discard port
            url: "http://127.0.0.1:9/hook".to_string(),
        },
    );
    let err = channel.send(&disk_alert()).await.unwrap_err();
    assert!(matches!(err, ChannelError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_failing_channel_does_not_block_others() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pager"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let configs: Vec<ChannelConfig> = serde_json::from_value(json!([
        { "type": "discord", "url": format!("{}/broken", server.uri()) },
        { "type": "webhook", "url": format!("{}/hook", server.uri()) },
        { "type": "slack", "url": format!("{}/pager", server.uri()), "min_severity": "critical" },
        { "type": "email", "relay_url": format!("{}/send", server.uri()), "from": "a@b", "to": [], "enabled": false },
    ]))
    .unwrap();
    let dispatcher =
        AlertDispatcher::new(channels::from_config(&channels::http_client().unwrap(), &configs));
    assert_eq!(dispatcher.channel_names(), vec!["discord", "webhook", "slack"]);

    let report = dispatcher.dispatch(&disk_alert()).await;

    assert_eq!(report.results.len(), 2);
    assert!(matches!(report.outcome("discord"), Some(ChannelOutcome::Error(_))));
    assert_eq!(report.outcome("webhook"), Some(&ChannelOutcome::Ok));
    assert_eq!(report.outcome("slack"), None);
    assert!(!report.all_failed());
}

#[tokio::test]
async fn test_dispatch_to_ignores_min_severity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pager"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let configs: Vec<ChannelConfig> = serde_json::from_value(json!([
        { "type": "slack", "url": format!("{}/pager", server.uri()), "min_severity": "critical" },
    ]))
    .unwrap();
    let dispatcher =
        AlertDispatcher::new(channels::from_config(&channels::http_client().unwrap(), &configs));

    let event = AlertEvent::new("test_alert", Severity::Info, "test", Utc::now());
    assert!(dispatcher.dispatch(&event).await.is_empty());

    let report = dispatcher.dispatch_to(&event, "slack").await;
    assert_eq!(report.outcome("slack"), Some(&ChannelOutcome::Ok));
}
