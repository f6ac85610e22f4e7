//! Integration tests for the jSQL client against an in-process gateway.
//!
//! The fake gateway listens on an ephemeral localhost port, reads one
//! request per line and answers with whatever the test scripts: whole
//! responses, responses split into chunks, fragments that never finish,
//! or nothing at all.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=jsql_client=trace cargo test --test gateway_integration -- --nocapture
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jsql_client::rpc::{read_frame, write_frame, ContentLengthCodec, ReadPolicy};
use jsql_client::{ClientConfig, Driver, ErrorKind, FramingMode, JsqlClient, JsqlError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Idle timeout used by most tests.
const TIMEOUT: Duration = Duration::from_millis(250);

/// Slack allowed on top of a timeout before a test calls it late.
const SLACK: Duration = Duration::from_millis(400);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the fake gateway does with one request.
enum Reply {
    /// Write the chunks in order, pausing between them.
    Chunks(Vec<Vec<u8>>, Duration),
    /// Wait, then write the body.
    Late(Duration, Vec<u8>),
    /// Write nothing and keep the connection open.
    Silence,
    /// Close the connection without answering.
    Hangup,
}

impl Reply {
    fn whole(body: impl Into<Vec<u8>>) -> Self {
        Reply::Chunks(vec![body.into()], Duration::ZERO)
    }
}

/// Start a gateway answering each request with `handler(request)`.
///
/// Every request seen is recorded in the returned log.
async fn spawn_gateway<F>(handler: F) -> (u16, Arc<Mutex<Vec<Value>>>)
where
    F: Fn(&Value) -> Reply + Send + 'static,
{
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).expect("request is one JSON line");
            log.lock().unwrap().push(request.clone());

            match handler(&request) {
                Reply::Chunks(chunks, gap) => {
                    for chunk in chunks {
                        if write_half.write_all(&chunk).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(gap).await;
                    }
                }
                Reply::Late(delay, body) => {
                    tokio::time::sleep(delay).await;
                    if write_half.write_all(&body).await.is_err() {
                        return;
                    }
                }
                Reply::Silence => {}
                Reply::Hangup => return,
            }
        }
    });

    (port, seen)
}

fn respond_with_rows(request: &Value, rows: Value) -> Reply {
    Reply::whole(format!(
        "{}\n",
        json!({"id": request["id"], "result": rows, "error": null})
    ))
}

async fn client(port: u16) -> JsqlClient {
    let config = ClientConfig::new("127.0.0.1", port, Driver::Sqlite3, "./test.db")
        .timeout(TIMEOUT);
    JsqlClient::connect(config).await.expect("Should connect to gateway")
}

#[tokio::test]
async fn test_round_trip() {
    let (port, _) = spawn_gateway(|request| respond_with_rows(request, json!([{"Answer": 1}]))).await;
    let client = client(port).await;

    let rows = client.select("select 1 as 'Answer'").await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Answer"], json!(1));
}

#[tokio::test]
async fn test_round_trip_at_id_seven() {
    let (port, _) = spawn_gateway(|request| {
        if request["id"] == 7 {
            Reply::whole("{\"id\":7,\"result\":[{\"Answer\":1}],\"error\":null}\n")
        } else {
            respond_with_rows(request, json!([]))
        }
    })
    .await;
    let client = client(port).await;

    for _ in 1..7 {
        assert!(client.select("select 1").await.unwrap().is_empty());
    }
    let rows = client.select("select 1 as 'Answer'").await.unwrap();
    assert_eq!(Value::Array(rows.into_iter().map(Value::Object).collect()), json!([{"Answer": 1}]));
}

#[tokio::test]
async fn test_request_wire_format() {
    let (port, seen) = spawn_gateway(|request| respond_with_rows(request, json!([]))).await;
    let config = ClientConfig::new("127.0.0.1", port, Driver::Pg, "dbname=metrics")
        .password("squirrels")
        .timeout(TIMEOUT);
    let client = JsqlClient::connect(config).await.unwrap();

    client
        .run_select("select foot from foo where bar = ?", &[json!("hello"), json!(2)])
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0],
        json!({
            "id": 1,
            "method": "JSQL.Select",
            "params": [{
                "auth": "squirrels",
                "driver": "pg",
                "datasource_name": "dbname=metrics",
                "statement": "select foot from foo where bar = ?",
                "params": ["hello", 2]
            }]
        })
    );
}

#[tokio::test]
async fn test_ids_are_sequential() {
    let (port, seen) = spawn_gateway(|request| respond_with_rows(request, json!([]))).await;
    let client = client(port).await;

    for _ in 0..10 {
        client.select("select 1").await.unwrap();
    }

    let ids: Vec<u64> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_byte_by_byte_delivery() {
    let (port, _) = spawn_gateway(|request| {
        let body = format!(
            "{}\n",
            json!({"id": request["id"], "result": [{"bar": "hello", "foot": 1.2}], "error": null})
        );
        Reply::Chunks(
            body.into_bytes().into_iter().map(|b| vec![b]).collect(),
            Duration::from_millis(1),
        )
    })
    .await;
    let client = client(port).await;

    let rows = client.select("select * from foo").await.unwrap();
    assert_eq!(rows[0]["bar"], json!("hello"));
    assert_eq!(rows[0]["foot"], json!(1.2));
}

#[tokio::test]
async fn test_slow_chunks_within_idle_timeout() {
    // Total delivery time exceeds 2x timeout; each gap stays under it.
    let (port, _) = spawn_gateway(|request| {
        let body = format!(
            "{}\n",
            json!({"id": request["id"], "result": [{"n": 1}, {"n": 2}], "error": null})
        );
        let bytes = body.into_bytes();
        let chunks = bytes.chunks(bytes.len() / 5 + 1).map(<[u8]>::to_vec).collect();
        Reply::Chunks(chunks, TIMEOUT * 3 / 5)
    })
    .await;
    let client = client(port).await;

    let rows = client.select("select n").await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_id_mismatch() {
    let (port, _) = spawn_gateway(|_| {
        Reply::whole("{\"id\":99,\"result\":[{\"Answer\":1}],\"error\":null}\n")
    })
    .await;
    let client = client(port).await;

    let err = client.select("select 1").await.unwrap_err();
    assert!(
        matches!(err, JsqlError::IdMismatch { expected: 1, actual: 99 }),
        "Expected IdMismatch, got {:?}",
        err
    );
}

#[tokio::test]
async fn test_server_error_verbatim() {
    let (port, _) = spawn_gateway(|request| {
        Reply::whole(format!(
            "{}\n",
            json!({"id": request["id"], "result": null, "error": "syntax error"})
        ))
    })
    .await;
    let client = client(port).await;

    let err = client.select("selec 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.server_message(), Some("syntax error"));
}

#[tokio::test]
async fn test_empty_result_is_null() {
    let (port, _) = spawn_gateway(|request| {
        Reply::whole(format!(
            "{}\n",
            json!({"id": request["id"], "result": null, "error": null})
        ))
    })
    .await;
    let client = client(port).await;

    let rows = client.select("select * from foo where bar = 'a'").await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_idle_timeout_fragment_is_decode_error() {
    let (port, _) = spawn_gateway(|_| Reply::whole("{\"id\":1,\"resul")).await;
    let client = client(port).await;

    let started = Instant::now();
    let err = client.select("select 1").await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Decode, "got {:?}", err);
    assert!(elapsed >= TIMEOUT, "returned early: {:?}", elapsed);
    assert!(elapsed < TIMEOUT + SLACK, "returned late: {:?}", elapsed);
}

#[tokio::test]
async fn test_silent_gateway_hits_absolute_timeout() {
    let (port, _) = spawn_gateway(|_| Reply::Silence).await;
    let client = client(port).await;

    let started = Instant::now();
    let err = client.select("select 1").await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Decode, "got {:?}", err);
    assert!(elapsed >= TIMEOUT * 2, "returned early: {:?}", elapsed);
    assert!(elapsed < TIMEOUT * 2 + SLACK, "returned late: {:?}", elapsed);
}

#[tokio::test]
async fn test_late_reply_retires_connection() {
    let (port, seen) = spawn_gateway(|request| {
        let body = format!(
            "{}\n",
            json!({"id": request["id"], "result": [{"Answer": 1}], "error": null})
        );
        Reply::Late(TIMEOUT * 3, body.into_bytes())
    })
    .await;
    let client = client(port).await;

    let err = client.select("select 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode, "got {:?}", err);
    assert!(client.is_closed().await);

    // Give the stale reply time to land; it must never be read as an answer.
    tokio::time::sleep(TIMEOUT * 2).await;
    let err = client.select("select 2").await.unwrap_err();
    match err {
        JsqlError::Transport(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotConnected),
        other => panic!("Expected Transport, got {:?}", other),
    }
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_hangup_is_transport_error() {
    let (port, _) = spawn_gateway(|_| Reply::Hangup).await;
    let client = client(port).await;

    let err = client.select("select 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport, "got {:?}", err);
}

#[tokio::test]
async fn test_connect_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        JsqlClient::open("127.0.0.1", port, Driver::Sqlite3, "./test.db"),
    )
    .await
    .expect("Connection should fail fast, not hang");

    match result {
        Ok(_) => panic!("Should not connect to a closed port"),
        Err(e) => assert_eq!(e.kind(), ErrorKind::Connect),
    }
}

#[tokio::test]
async fn test_concurrent_callers_are_serialized() {
    let (port, seen) = spawn_gateway(|request| {
        let body = format!(
            "{}\n",
            json!({"id": request["id"], "result": [{"id": request["id"]}], "error": null})
        );
        let bytes = body.into_bytes();
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        Reply::Chunks(vec![head.to_vec(), tail.to_vec()], Duration::from_millis(5))
    })
    .await;
    let client = Arc::new(client(port).await);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.select("select id").await })
        })
        .collect();

    let mut answered = Vec::new();
    for task in tasks {
        let rows = task.await.unwrap().expect("every caller gets its own response");
        answered.push(rows[0]["id"].as_u64().unwrap());
    }
    answered.sort_unstable();

    assert_eq!(answered, (1..=8).collect::<Vec<u64>>());
    assert_eq!(seen.lock().unwrap().len(), 8);
}

#[tokio::test]
async fn test_content_length_framing() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let codec = ContentLengthCodec::default();
        let frame = read_frame(&mut socket, &codec, &ReadPolicy::default())
            .await
            .unwrap();
        let request: Value = serde_json::from_slice(frame.payload(&codec)).unwrap();
        let body = format!(
            "{}\n",
            json!({"id": request["id"], "result": [{"text": "a}\nb"}], "error": null})
        );
        write_frame(&mut socket, &codec, body.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = ClientConfig::new("127.0.0.1", port, Driver::Mysql, "user@/db")
        .framing(FramingMode::ContentLength)
        .timeout(TIMEOUT);
    let client = JsqlClient::connect(config).await.unwrap();

    let rows = client.select("select text").await.unwrap();
    assert_eq!(rows[0]["text"], json!("a}\nb"));
}

#[tokio::test]
async fn test_close_then_query_fails() {
    let (port, _) = spawn_gateway(|request| respond_with_rows(request, json!([]))).await;
    let client = client(port).await;

    client.select("select 1").await.unwrap();
    client.close().await;
    client.close().await;

    let err = client.select("select 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}
