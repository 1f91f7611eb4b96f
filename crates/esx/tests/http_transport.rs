//! 🧪 The HTTP transport against a mock cluster.
//!
//! wiremock stands in for the search service so the wire format (paths, query strings,
//! content types, auth) is checked byte for byte, and the bulk writer and scroll reader are
//! driven end to end over real sockets.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{basic_auth, body_string_contains, header, method, path, query_param},
};

use esx::bulk::RecordWriter;
use esx::extract::ExtractorRegistry;
use esx::record::JsonRecord;
use esx::scroll::{ScrollReader, ScrollState};
use esx::settings::{Settings, keys};
use esx::transport::{HttpTransport, Transport};

fn settings_for(nodes: &str, extra: &[(&str, &str)]) -> Settings {
    let mut pairs = vec![
        (keys::NODES, nodes),
        (keys::HTTP_RETRIES, "1"),
        (keys::HTTP_TIMEOUT, "5s"),
        (keys::PROXY_HTTP_USE_SYSTEM_PROPS, "no"),
        (keys::PROXY_SOCKS_USE_SYSTEM_PROPS, "no"),
    ];
    pairs.extend_from_slice(extra);
    Settings::from_pairs(pairs)
}

#[tokio::test]
async fn the_one_where_bulk_goes_out_as_ndjson_with_credentials() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(basic_auth("elastic", "changeme"))
        .and(body_string_contains(r#"{"index":{"_index":"people","_id":"7"}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [{"index": {"_id": "7", "status": 201}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(
        &server.uri(),
        &[
            (keys::HTTP_AUTH_USER, "elastic"),
            (keys::HTTP_AUTH_PASS, "changeme"),
            (keys::RESOURCE_WRITE, "people"),
            (keys::MAPPING_ID, "id"),
            (keys::BATCH_WRITE_REFRESH, "false"),
        ],
    );
    let transport = Arc::new(HttpTransport::from_settings(&settings)?);
    let mut writer = RecordWriter::from_settings(
        &settings,
        &ExtractorRegistry::new(),
        transport,
        CancellationToken::new(),
    )?;
    writer.write(&JsonRecord::new(json!({"id": 7, "name": "seven"}))).await?;
    let stats = writer.close().await?;
    assert_eq!(stats.committed, 1);
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_dead_node_hands_over_to_a_live_one() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people/_refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_shards": {"failed": 0}})))
        .expect(1)
        .mount(&server)
        .await;

    // -- port 1 refuses connections, so the first attempt fails fast
    let nodes = format!("http://127.0.0.1:1,{}", server.uri());
    let transport = HttpTransport::from_settings(&settings_for(&nodes, &[]))?;
    let reply = transport.refresh("people").await?;
    assert_eq!(reply.status, 200);
    Ok(())
}

#[tokio::test]
async fn the_one_where_every_node_is_dead() -> anyhow::Result<()> {
    let transport = HttpTransport::from_settings(&settings_for("http://127.0.0.1:1", &[]))?;
    let err = transport
        .refresh("people")
        .await
        .expect_err("💀 nobody is listening");
    assert!(err.is_retryable());
    assert!(err.to_string().contains("every node"));
    Ok(())
}

#[tokio::test]
async fn the_one_where_index_existence_is_a_head_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/present"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/absent"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let transport = HttpTransport::from_settings(&settings_for(&server.uri(), &[]))?;
    assert!(transport.index_exists("present").await?);
    assert!(!transport.index_exists("absent").await?);
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_scroll_opens_continues_and_clears() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/books/_search"))
        .and(query_param("scroll", "60000ms"))
        .and(body_string_contains(r#""size":2"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_scroll_id": "cursor-1",
            "hits": {"hits": [
                {"_index": "books", "_id": "1", "_source": {"n": 1}},
                {"_index": "books", "_id": "2", "_source": {"n": 2}}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_string_contains("cursor-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_scroll_id": "cursor-1",
            "hits": {"hits": []}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .and(body_string_contains("cursor-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(
        &server.uri(),
        &[
            (keys::RESOURCE_READ, "books"),
            (keys::SCROLL_SIZE, "2"),
            (keys::SCROLL_KEEPALIVE, "1m"),
        ],
    );
    let transport = Arc::new(HttpTransport::from_settings(&settings)?);
    let mut reader = ScrollReader::from_settings(&settings, transport)?;

    let first = reader.next().await?;
    let numbers: Vec<Value> = first.iter().map(|doc| doc["n"].clone()).collect();
    assert_eq!(numbers, vec![json!(1), json!(2)]);
    assert!(reader.next().await?.is_empty());
    assert_eq!(reader.state(), ScrollState::Exhausted);
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_uri_query_rides_in_the_query_string() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/books/_search"))
        .and(query_param("q", "author:tolkien"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {"hits": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(
        &server.uri(),
        &[(keys::RESOURCE_READ, "books"), (keys::QUERY, "?q=author:tolkien")],
    );
    let transport = Arc::new(HttpTransport::from_settings(&settings)?);
    let mut reader = ScrollReader::from_settings(&settings, transport)?;
    assert!(reader.next().await?.is_empty());
    Ok(())
}
