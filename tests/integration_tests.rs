//! Integration tests for roomlb.
//!
//! These tests exercise the public API and the HTTP front end end to end.

use roomlb::backend::algorithms::{LeastConnections, RoundRobin};
use roomlb::backend::{Selection, SessionRouter, Strategy};
use roomlb::config::{Algorithm, load_config, parse_config};
use roomlb::frontend::FrontendListener;
use roomlb::metrics::MetricsCollector;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn loads(strategy: &dyn Strategy) -> HashMap<SocketAddr, usize> {
    strategy
        .snapshot()
        .into_iter()
        .map(|load| (load.address, load.sessions))
        .collect()
}

#[test]
fn test_config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
global:
  log_level: debug
  metrics:
    enabled: false
frontend:
  listen: "127.0.0.1:18000"
  session_header: Room-Id
  header_read_timeout: 5s
balancer:
  algorithm: round_robin
  servers:
    - "127.0.0.1:8001"
    - "127.0.0.1:8002"
"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.global.log_level, "debug");
    assert!(!config.global.metrics.enabled);
    assert_eq!(config.frontend.header_read_timeout, Duration::from_secs(5));
    assert_eq!(config.balancer.algorithm, Algorithm::RoundRobin);
    assert_eq!(config.balancer.servers.len(), 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let yaml = r#"
balancer:
  servers:
    - "127.0.0.1:8001"
    - "127.0.0.1:8001"
"#;
    assert!(parse_config(yaml).is_err());
}

#[test]
fn test_least_connections_spreads_before_doubling() {
    let strategy = LeastConnections::new();
    for port in 8001..=8004 {
        strategy.add_server(addr(&format!("127.0.0.1:{}", port)));
    }

    for room in 0..4 {
        assert!(matches!(
            strategy.select_server(&format!("room-{}", room)),
            Selection::Assigned(_)
        ));
    }
    assert!(loads(&strategy).values().all(|&load| load == 1));

    for room in 4..12 {
        strategy.select_server(&format!("room-{}", room));
    }
    assert!(loads(&strategy).values().all(|&load| load == 3));
}

#[test]
fn test_affinity_is_idempotent() {
    let strategy = LeastConnections::new();
    strategy.add_server(addr("127.0.0.1:8001"));
    strategy.add_server(addr("127.0.0.1:8002"));

    let first = strategy.select_server("room-a").address().unwrap();
    for _ in 0..10 {
        assert_eq!(strategy.select_server("room-a"), Selection::Existing(first));
    }
    assert_eq!(loads(&strategy)[&first], 1);
}

#[test]
fn test_empty_pool_is_unavailable() {
    let strategy = LeastConnections::new();
    assert_eq!(strategy.select_server("room-a"), Selection::Unavailable);

    strategy.add_server(addr("127.0.0.1:8001"));
    strategy.remove_server(addr("127.0.0.1:8001"));
    assert_eq!(strategy.select_server("room-a"), Selection::Unavailable);
    assert!(strategy.snapshot().is_empty());
}

#[test]
fn test_remove_server_releases_its_sessions() {
    let s1 = addr("127.0.0.1:8001");
    let s2 = addr("127.0.0.1:8002");
    let strategy = LeastConnections::new();
    strategy.add_server(s1);
    strategy.add_server(s2);

    assert_eq!(strategy.select_server("r1"), Selection::Assigned(s1));
    assert_eq!(strategy.select_server("r2"), Selection::Assigned(s2));
    assert!(strategy.remove_server(s1));

    // r1 lost its backend and is placed afresh
    assert_eq!(strategy.select_server("r1"), Selection::Assigned(s2));
    assert_eq!(strategy.select_server("r2"), Selection::Existing(s2));
    assert_eq!(loads(&strategy)[&s2], 2);
    assert!(!strategy.end_session("missing"));
}

#[test]
fn test_session_lifecycle_scenario() {
    let s1 = addr("127.0.0.1:8001");
    let s2 = addr("127.0.0.1:8002");
    let strategy = LeastConnections::new();
    strategy.add_server(s1);
    strategy.add_server(s2);

    assert_eq!(strategy.select_server("r1"), Selection::Assigned(s1));
    assert_eq!(strategy.select_server("r2"), Selection::Assigned(s2));
    assert_eq!(strategy.select_server("r3"), Selection::Assigned(s1));

    assert!(strategy.end_session("r1"));
    assert!(strategy.end_session("r3"));
    assert_eq!(loads(&strategy)[&s1], 0);

    // s1 is now the least loaded again
    assert_eq!(strategy.select_server("r4"), Selection::Assigned(s1));
    assert_eq!(strategy.select_server("r2"), Selection::Existing(s2));
}

#[test]
fn test_round_robin_rotates() {
    let strategy = RoundRobin::new();
    let servers = [addr("127.0.0.1:8001"), addr("127.0.0.1:8002"), addr("127.0.0.1:8003")];
    for server in servers {
        strategy.add_server(server);
    }

    let picked: Vec<_> = (0..6)
        .map(|i| strategy.select_server(&format!("room-{}", i)).address().unwrap())
        .collect();
    assert_eq!(&picked[..3], &servers[..]);
    assert_eq!(&picked[3..], &servers[..]);
}

#[test]
fn test_concurrent_sessions_stay_consistent() {
    let strategy = Arc::new(LeastConnections::new());
    for port in 8001..=8008 {
        strategy.add_server(addr(&format!("127.0.0.1:{}", port)));
    }

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let strategy = Arc::clone(&strategy);
            thread::spawn(move || {
                for i in 0..500 {
                    let room = format!("room-{}-{}", worker, i);
                    let first = strategy.select_server(&room).address().unwrap();
                    assert_eq!(strategy.select_server(&room), Selection::Existing(first));
                    if i % 2 == 0 {
                        assert!(strategy.end_session(&room));
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let loads = loads(&*strategy);
    assert_eq!(loads.len(), 8);
    assert_eq!(loads.values().sum::<usize>(), 8 * 250);
}

#[test]
fn test_router_registers_static_servers() {
    let config = parse_config(
        r#"
balancer:
  servers:
    - "127.0.0.1:8001"
    - "127.0.0.1:8002"
"#,
    )
    .unwrap();

    let router = SessionRouter::new(&config.balancer, MetricsCollector::new());
    assert_eq!(router.algorithm(), "least_connections");
    assert_eq!(router.snapshot().len(), 2);
    assert_eq!(router.select("room-1"), Selection::Assigned(addr("127.0.0.1:8001")));
}

/// Send one HTTP/1.1 request and return the status code and raw response.
async fn http_request(
    target: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
) -> (u16, String) {
    let mut stream = TcpStream::connect(target).await.unwrap();

    let mut request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\nConnection: close\r\n",
        method, path, target
    );
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    (status, response)
}

async fn start_frontend() -> (SocketAddr, Arc<SessionRouter>, broadcast::Sender<()>) {
    let config = parse_config(
        r#"
frontend:
  listen: "127.0.0.1:0"
global:
  metrics:
    enabled: false
"#,
    )
    .unwrap();

    let metrics = MetricsCollector::new();
    let router = Arc::new(SessionRouter::new(&config.balancer, metrics.clone()));
    let listener = FrontendListener::bind(config.frontend, Arc::clone(&router), metrics)
        .await
        .unwrap();
    let local = listener.local_addr().unwrap();

    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(listener.run(rx));
    (local, router, tx)
}

#[tokio::test]
async fn test_http_session_flow() {
    let (frontend, router, shutdown) = start_frontend().await;

    let (status, _) = http_request(frontend, "GET", "/", &[("Room-Id", "room-1")]).await;
    assert_eq!(status, 503);

    let (status, _) =
        http_request(frontend, "POST", "/register?address=127.0.0.1:8001", &[]).await;
    assert_eq!(status, 200);
    let (status, _) =
        http_request(frontend, "POST", "/register?address=127.0.0.1:8001", &[]).await;
    assert_eq!(status, 409);

    let (status, body) = http_request(frontend, "GET", "/draw", &[("Room-Id", "room-1")]).await;
    assert_eq!(status, 200);
    assert!(body.contains("x-selected-backend: 127.0.0.1:8001"));
    assert!(body.contains("x-request-id: "));

    let (status, _) = http_request(frontend, "GET", "/draw", &[]).await;
    assert_eq!(status, 400);

    let (status, _) =
        http_request(frontend, "POST", "/end-session", &[("Room-Id", "room-1")]).await;
    assert_eq!(status, 200);
    assert_eq!(router.snapshot()[0].sessions, 0);

    let (status, _) =
        http_request(frontend, "POST", "/unregister?address=127.0.0.1:8001", &[]).await;
    assert_eq!(status, 200);
    let (status, _) =
        http_request(frontend, "POST", "/unregister?address=127.0.0.1:8001", &[]).await;
    assert_eq!(status, 404);

    let (status, _) = http_request(frontend, "GET", "/", &[("Room-Id", "room-1")]).await;
    assert_eq!(status, 503);

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_http_echoes_inbound_request_id() {
    let (frontend, _router, shutdown) = start_frontend().await;

    let (_, body) = http_request(
        frontend,
        "GET",
        "/",
        &[("Room-Id", "room-1"), ("X-Request-Id", "trace-42")],
    )
    .await;
    assert!(body.contains("x-request-id: trace-42"));

    shutdown.send(()).unwrap();
}
