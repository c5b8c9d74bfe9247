//! End-to-end tests against an in-process server on an ephemeral port.

use rbaskets::config::{ServerConfig, ServiceMode};
use rbaskets::{BasketServer, ServiceContext};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const MASTER: &str = "integration-master-token";

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let mut config = ServerConfig::default();
        config.listen.port = 0;
        config.service.master_token = MASTER.to_string();
        config.forward.timeout_secs = 2;
        configure(&mut config);

        let ctx = ServiceContext::from_config(config).unwrap();
        let server = BasketServer::bind(ctx).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            rx.await.ok();
        }));

        Self {
            addr,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn create(&self, name: &str, config: Value) -> String {
        let resp = self
            .client
            .post(self.url(&format!("/api/baskets/{name}")))
            .json(&config)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let auth: Value = resp.json().await.unwrap();
        auth["token"].as_str().unwrap().to_string()
    }

    async fn requests(&self, name: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/baskets/{name}/requests")))
            .header("Authorization", MASTER)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Polls until the basket holds `count` requests.
    async fn wait_for_requests(&self, name: &str, count: u64) -> Value {
        for _ in 0..50 {
            let page = self.requests(name).await;
            if page["count"] == count {
                return page;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("basket '{name}' never reached {count} requests");
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop");
        tokio_test::assert_ok!(result.unwrap());
    }
}

#[tokio::test]
async fn test_capture_and_inspect() {
    let server = TestServer::start().await;
    let token = server.create("inbox", json!({"capacity": 3})).await;

    for i in 0..5 {
        let resp = server
            .client
            .post(server.url(&format!("/inbox/hook?n={i}")))
            .header("X-Source", "test")
            .body(format!("payload {i}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let page: Value = server
        .client
        .get(server.url("/api/baskets/inbox/requests?max=2"))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["count"], 3);
    assert_eq!(page["total_count"], 5);
    assert_eq!(page["has_more"], true);
    assert_eq!(page["requests"][0]["body"], "payload 4");
    assert_eq!(page["requests"][0]["query"], "n=4");
    assert_eq!(page["requests"][0]["headers"]["X-Source"], json!(["test"]));
    assert!(page["requests"][0]["remote_addr"].is_string());

    let search: Value = server
        .client
        .get(server.url("/api/baskets/inbox/requests?q=payload+3&in=body"))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["requests"].as_array().unwrap().len(), 1);
    assert_eq!(search["has_more"], false);

    let names: Value = server
        .client
        .get(server.url("/api/baskets"))
        .header("Authorization", MASTER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(names["names"], json!(["inbox"]));

    server.stop().await;
}

#[tokio::test]
async fn test_restricted_mode_requires_master_token() {
    let server = TestServer::start_with(|c| c.service.mode = ServiceMode::Restricted).await;

    let resp = server
        .client
        .post(server.url("/api/baskets/locked"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let error: Value = resp.json().await.unwrap();
    assert!(error["error"].is_string());

    let resp = server
        .client
        .post(server.url("/api/baskets/locked"))
        .header("Authorization", MASTER)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    server.stop().await;
}

#[tokio::test]
async fn test_forwarding_between_baskets_does_not_loop() {
    let server = TestServer::start().await;
    let ping_url = server.url("/ping");
    let pong_url = server.url("/pong");
    server
        .create("ping", json!({"forward_url": pong_url, "expand_path": true}))
        .await;
    server.create("pong", json!({"forward_url": ping_url})).await;

    let resp = server
        .client
        .put(server.url("/ping/deep/path?x=1"))
        .body("ball")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let page = server.wait_for_requests("pong", 1).await;
    let forwarded = &page["requests"][0];
    assert_eq!(forwarded["method"], "PUT");
    assert_eq!(forwarded["path"], "/pong/deep/path");
    assert_eq!(forwarded["query"], "x=1");
    assert_eq!(forwarded["body"], "ball");
    assert_eq!(forwarded["headers"]["X-Do-Not-Forward"], json!(["1"]));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.requests("ping").await["count"], 1);
    assert_eq!(server.requests("pong").await["count"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_proxy_response() {
    let server = TestServer::start().await;
    let upstream_token = server.create("upstream", json!({})).await;
    let resp = server
        .client
        .put(server.url("/api/baskets/upstream/responses/POST"))
        .header("Authorization", &upstream_token)
        .json(&json!({
            "status": 202,
            "headers": {"X-Reply": ["upstream"]},
            "body": "accepted {{ id[0] }}",
            "is_template": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    server
        .create(
            "front",
            json!({"forward_url": server.url("/upstream"), "proxy_response": true}),
        )
        .await;

    let resp = server
        .client
        .post(server.url("/front?id=42"))
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.headers()["x-reply"], "upstream");
    assert_eq!(resp.text().await.unwrap(), "accepted 42");

    assert_eq!(server.requests("front").await["count"], 1);
    assert_eq!(server.requests("upstream").await["count"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_proxy_failure_is_500() {
    let server = TestServer::start().await;
    // Reserve a port and release it so nothing listens there.
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://{}/", closed.local_addr().unwrap());
    drop(closed);

    server
        .create("broken", json!({"forward_url": dead, "proxy_response": true}))
        .await;
    let resp = server
        .client
        .get(server.url("/broken"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: Value = resp.json().await.unwrap();
    assert!(error["error"].as_str().unwrap().contains("forwarding failed"));
    assert_eq!(server.requests("broken").await["count"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_proxy_deadline_is_500() {
    let server = TestServer::start_with(|c| c.forward.timeout_secs = 1).await;
    // Accepts connections and never answers.
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_url = format!("http://{}/", silent.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = silent.accept().await {
            held.push(socket);
        }
    });

    server
        .create("stuck", json!({"forward_url": silent_url, "proxy_response": true}))
        .await;
    let started = std::time::Instant::now();
    let resp = server
        .client
        .get(server.url("/stuck"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(started.elapsed() < Duration::from_secs(5));
    let error: Value = resp.json().await.unwrap();
    assert!(error["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(server.requests("stuck").await["count"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_stats_and_version() {
    let server = TestServer::start().await;
    server.create("a", json!({})).await;
    server.create("b", json!({})).await;
    for _ in 0..3 {
        server.client.get(server.url("/b")).send().await.unwrap();
    }

    let stats: Value = server
        .client
        .get(server.url("/api/stats?max=1"))
        .header("Authorization", MASTER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["baskets_count"], 2);
    assert_eq!(stats["empty_baskets_count"], 1);
    assert_eq!(stats["requests_total_count"], 3);
    assert_eq!(stats["top_baskets_size"][0]["name"], "b");
    assert_eq!(stats["top_baskets_size"].as_array().unwrap().len(), 1);

    let version: Value = server
        .client
        .get(server.url("/api/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["name"], "rbaskets");
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
    assert!(version["source_code"]
        .as_str()
        .is_some_and(|url| url.starts_with("https://")));

    server.stop().await;
}

#[tokio::test]
async fn test_sql_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baskets.db").to_string_lossy().into_owned();

    let configure = |c: &mut ServerConfig| {
        c.database.db_type = rbaskets::config::DbType::Sql;
        c.database.file = path.clone();
    };

    let server = TestServer::start_with(configure).await;
    server.create("durable", json!({})).await;
    server
        .client
        .post(server.url("/durable"))
        .body("kept")
        .send()
        .await
        .unwrap();
    server.stop().await;

    let server = TestServer::start_with(configure).await;
    let page = server.requests("durable").await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["requests"][0]["body"], "kept");
    server.stop().await;
}
