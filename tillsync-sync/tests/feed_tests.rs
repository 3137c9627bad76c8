use std::time::Duration;
use tillsync_sync::feed::mock::MockChangeFeed;
use tillsync_sync::feed::SseParser;
use tillsync_sync::{ChangeFeed, SseChangeFeed, SseFeedConfig, SyncError};
use tillsync_types::{ChangeEvent, ChangeKind, DataTable, SettingsTable, Table, TenantId};
use tokio::time::timeout;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tenant(name: &str) -> TenantId {
    TenantId::parse(name).unwrap()
}

fn products_changed() -> ChangeEvent {
    ChangeEvent::new(DataTable::Products, ChangeKind::Update)
}

// ── SseParser ────────────────────────────────────────────────────

#[test]
fn parser_decodes_data_lines() {
    let mut parser = SseParser::new();
    let events = parser.push(
        b"event: change\ndata: {\"table\":\"products\",\"kind\":\"insert\"}\n\n\
          data:{\"table\":\"tax_rates\",\"kind\":\"delete\"}\r\n\r\n",
    );

    assert_eq!(
        events,
        vec![
            ChangeEvent::new(DataTable::Products, ChangeKind::Insert),
            ChangeEvent::new(SettingsTable::TaxRates, ChangeKind::Delete),
        ]
    );
}

#[test]
fn parser_buffers_split_chunks() {
    let mut parser = SseParser::new();
    let line = "data: {\"table\":\"orders\",\"kind\":\"update\"}\n";
    let (head, tail) = line.as_bytes().split_at(17);

    assert!(parser.push(head).is_empty());
    assert_eq!(
        parser.push(tail),
        vec![ChangeEvent::new(DataTable::Orders, ChangeKind::Update)]
    );
}

#[test]
fn parser_buffers_split_utf8() {
    let mut parser = SseParser::new();
    let line = "data: {\"table\":\"caf\u{e9}\",\"kind\":\"insert\"}\n".as_bytes();
    let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;

    assert!(parser.push(&line[..split]).is_empty());
    let events = parser.push(&line[split..]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].table, "caf\u{e9}");
}

#[test]
fn parser_skips_comments_and_garbage() {
    let mut parser = SseParser::new();
    let events = parser.push(b": keep-alive\nid: 7\ndata: not json\ndata: {\"table\":\"x\"}\n\n");
    assert!(events.is_empty());
}

// ── SseChangeFeed ────────────────────────────────────────────────

#[test]
fn sse_config_default() {
    let cfg = SseFeedConfig::default();
    assert_eq!(cfg.path, "/realtime/v1/changes");
    assert_eq!(cfg.buffer, 64);
}

#[test]
fn sse_feed_rejects_empty_base_url() {
    let result = SseChangeFeed::new(SseFeedConfig {
        base_url: String::new(),
        ..Default::default()
    });
    assert!(matches!(result, Err(SyncError::Config(_))));
}

#[tokio::test]
async fn sse_feed_forwards_subscribed_tables() {
    let server = MockServer::start().await;
    let body = concat!(
        ": connected\n\n",
        "data: {\"table\":\"products\",\"kind\":\"insert\"}\n\n",
        "data: {\"table\":\"suppliers\",\"kind\":\"insert\"}\n\n",
        "data: {\"table\":\"orders\",\"kind\":\"delete\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/realtime/v1/changes"))
        .and(query_param("tenant", "acme"))
        .and(query_param("tables", "products,orders"))
        .and(header("accept", "text/event-stream"))
        .and(header("apikey", "anon-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let feed = SseChangeFeed::new(SseFeedConfig {
        base_url: server.uri(),
        api_key: "anon-key".to_string(),
        ..Default::default()
    })
    .unwrap();
    let tables = [Table::Data(DataTable::Products), Table::Data(DataTable::Orders)];
    let mut stream = feed.subscribe(&tenant("acme"), &tables).await.unwrap();

    let mut received = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), stream.recv()).await.unwrap() {
        received.push(event);
    }

    assert_eq!(
        received,
        vec![
            ChangeEvent::new(DataTable::Products, ChangeKind::Insert),
            ChangeEvent::new(DataTable::Orders, ChangeKind::Delete),
        ]
    );
}

#[tokio::test]
async fn sse_feed_rejected_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let feed = SseChangeFeed::new(SseFeedConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();
    let result = feed
        .subscribe(&tenant("acme"), &Table::data_group())
        .await;

    assert!(matches!(result, Err(SyncError::Backend { status: 401, .. })));
}

// ── MockChangeFeed ───────────────────────────────────────────────

#[tokio::test]
async fn mock_feed_filters_by_tenant_and_table() {
    let feed = MockChangeFeed::default();
    let mut data = feed
        .subscribe(&tenant("acme"), &Table::data_group())
        .await
        .unwrap();

    feed.publish(&tenant("other"), products_changed());
    feed.publish(
        &tenant("acme"),
        ChangeEvent::new(SettingsTable::Categories, ChangeKind::Insert),
    );
    feed.publish(&tenant("acme"), products_changed());

    let event = timeout(Duration::from_secs(1), data.recv()).await.unwrap();
    assert_eq!(event, Some(products_changed()));
    assert!(data.try_recv().is_err());

    assert_eq!(
        feed.subscriptions(),
        vec![(tenant("acme"), Table::data_group())]
    );
}

#[tokio::test]
async fn mock_feed_fans_out_to_each_subscription() {
    let feed = MockChangeFeed::default();
    let mut first = feed.subscribe(&tenant("acme"), &Table::data_group()).await.unwrap();
    let mut second = feed.subscribe(&tenant("acme"), &Table::data_group()).await.unwrap();

    assert_eq!(feed.publish(&tenant("acme"), products_changed()), 2);

    assert_eq!(first.recv().await, Some(products_changed()));
    assert_eq!(second.recv().await, Some(products_changed()));
}

#[tokio::test]
async fn mock_feed_unsubscribes_on_drop() {
    let feed = MockChangeFeed::default();
    let stream = feed.subscribe(&tenant("acme"), &Table::data_group()).await.unwrap();
    assert_eq!(feed.live_subscriptions(), 1);

    drop(stream);
    timeout(Duration::from_secs(1), async {
        while feed.live_subscriptions() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(feed.publish(&tenant("acme"), products_changed()), 0);
}
