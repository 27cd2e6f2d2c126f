//! 端到端测试：真实 transport + mock 服务端

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crash_signal_monitor::error::TransportError;
use crash_signal_monitor::infra::{
    Credentials, PayloadArchive, PollConfig, PollTransport, PushTransport, StaticCredentials, Transport,
};
use crash_signal_monitor::notification::{
    AlertDispatcher, AlertFormatter, Destination, JsonlLogSink, Notifier, RenderedAlert, SendResult, TelegramConfig,
    TelegramNotifier,
};
use crash_signal_monitor::signal::Tier;
use crash_signal_monitor::watcher::{BackoffPolicy, FeedMonitor, Monitor, Sampling};
use futures::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOARD_HTML: &str = r#"<div class="payouts"><div>1,24x</div><div>105,00x</div></div>"#;

fn poll_config(server: &MockServer) -> PollConfig {
    PollConfig::new(format!("{}/game", server.uri()), Duration::from_millis(20))
}

#[tokio::test]
async fn test_poll_sends_user_agent_and_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/game"))
        .and(header("cookie", "lang=pt; sid=abc"))
        .and(header("user-agent", "csm-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOARD_HTML))
        .expect(1)
        .mount(&server)
        .await;

    let mut cookies = BTreeMap::new();
    cookies.insert("sid".to_string(), "abc".to_string());
    cookies.insert("lang".to_string(), "pt".to_string());

    let mut config = poll_config(&server);
    config.user_agent = "csm-test".to_string();
    let archive_dir = tempfile::tempdir().unwrap();
    let mut transport = PollTransport::new(config)
        .unwrap()
        .with_credentials(Arc::new(StaticCredentials(Some(Credentials::from_cookies(&cookies)))))
        .with_archive(PayloadArchive::new(archive_dir.path()));

    let payload = transport.next_payload().await.unwrap();

    assert_eq!(payload.body, BOARD_HTML);
    let archived: Vec<_> = std::fs::read_dir(archive_dir.path()).unwrap().collect();
    assert_eq!(archived.len(), 1);
}

#[tokio::test]
async fn test_poll_error_statuses_and_expired_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/game"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form>Please LOGIN again</form>"))
        .mount(&server)
        .await;

    let mut config = poll_config(&server);
    config.expired_marker = Some("login".to_string());
    let mut transport = PollTransport::new(config).unwrap();

    assert!(matches!(transport.next_payload().await, Err(TransportError::Status(503))));
    assert!(matches!(
        transport.next_payload().await,
        Err(TransportError::CredentialsExpired)
    ));
}

#[tokio::test]
async fn test_push_transport_reads_messages_until_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"crash_point": "2.50"}"#.to_string())).await.unwrap();
        ws.send(Message::Ping(vec![1])).await.unwrap();
        ws.send(Message::Binary(br#"{"crash_point": "1.07"}"#.to_vec())).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let mut transport = PushTransport::new(format!("ws://{}/ws", addr));

    let first = transport.next_payload().await.unwrap();
    assert_eq!(first.body, r#"{"crash_point": "2.50"}"#);
    assert!(transport.is_connected());

    let second = transport.next_payload().await.unwrap();
    assert_eq!(second.body, r#"{"crash_point": "1.07"}"#);

    let closed = transport.next_payload().await;
    assert!(matches!(
        closed,
        Err(TransportError::Closed(_)) | Err(TransportError::Io(_))
    ));
    assert!(!transport.is_connected());

    server.await.unwrap();
}

#[tokio::test]
async fn test_telegram_reports_each_destination() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(serde_json::json!({ "chat_id": "good" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(serde_json::json!({ "chat_id": "bad" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = TelegramConfig::new("123:abc");
    config.api_base = server.uri();
    let notifier = TelegramNotifier::new(config).unwrap();

    let reports = notifier
        .notify(
            &[Destination::new("good"), Destination::new("bad")],
            &RenderedAlert::new("<b>2.50x</b>"),
        )
        .await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].result, SendResult::Sent);
    match &reports[1].result {
        SendResult::Failed(reason) => assert!(reason.contains("chat not found")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_poll_feed_end_to_end() {
    // Given: a board page that keeps showing the same rounds
    let game = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/game"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOARD_HTML))
        .mount(&game)
        .await;

    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bottoken/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&telegram)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlLogSink::new(dir.path().join("signals.jsonl")));
    let mut telegram_config = TelegramConfig::new("token");
    telegram_config.api_base = telegram.uri();
    let notifier = Arc::new(TelegramNotifier::new(telegram_config).unwrap());

    let dispatcher = AlertDispatcher::new(
        sink.clone(),
        notifier,
        vec![Destination::new("-100")],
        AlertFormatter::new("Aviator"),
    );
    let transport = PollTransport::new(poll_config(&game)).unwrap();
    let feed = FeedMonitor::new("poll", Box::new(transport), dispatcher)
        .with_sampling(Sampling::Newest)
        .with_backoff(BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50)));

    let monitor = Monitor::new(dir.path().join("monitor.lock")).with_feed(feed);
    let handle = monitor.handle();
    let task = tokio::spawn(monitor.run());

    // When: several polls happen
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.snapshot()[0].alerts_dispatched == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.request_shutdown();
    let finals = task.await.unwrap().unwrap();

    // Then: only the newest value was accepted, once, and it was persisted before shutdown
    assert_eq!(finals[0].window, vec![105.0]);
    assert_eq!(finals[0].alerts_dispatched, 1);

    let records = sink.read_recent(10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, 105.0);
    assert_eq!(records[0].tier, Tier::Rare);
    assert!(records[0].annotation.is_some());
    assert!(!dir.path().join("monitor.lock").exists());
}
