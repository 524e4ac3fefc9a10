#![cfg(unix)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use executor_agent::server::serve;
use executor_agent::{create_app, AppState, EnvBaseline, ExecuteResponse};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct RunningAgent {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
    root: TempDir,
}

async fn start_agent(grace: Duration) -> RunningAgent {
    let root = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(AppState::new(EnvBaseline::capture(), root.path()));

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(
        listener,
        app,
        async move {
            let _ = stopped.await;
        },
        grace,
    ));

    RunningAgent {
        addr,
        stop,
        server,
        root,
    }
}

fn execute_url(addr: SocketAddr) -> String {
    format!("http://{}/execute", addr)
}

#[tokio::test]
async fn serves_probes_and_execute_over_tcp() {
    let agent = start_agent(Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{}/health", agent.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "healthy"}));

    let ready: Value = client
        .get(format!("http://{}/ready", agent.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ready, json!({"status": "ready"}));

    let response = client
        .post(execute_url(agent.addr))
        .json(&json!({"command": ["echo", "hi"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: ExecuteResponse = response.json().await.unwrap();
    assert_eq!(body.exit_code, 0);
    assert_eq!(body.stdout, "hi\n");

    agent.stop.send(()).unwrap();
    agent.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_disconnect_does_not_cancel_the_command() {
    let agent = start_agent(Duration::from_secs(5)).await;
    let result = reqwest::Client::new()
        .post(execute_url(agent.addr))
        .timeout(Duration::from_millis(300))
        .json(&json!({"command": ["sh", "-c", "sleep 1; touch marker"], "timeout": 10}))
        .send()
        .await;
    assert!(result.is_err(), "client should have given up first");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(
        agent.root.path().join("marker").exists(),
        "command was killed when its client went away"
    );

    agent.stop.send(()).unwrap();
    agent.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_drains_in_flight_requests_within_grace() {
    let agent = start_agent(Duration::from_secs(5)).await;
    let url = execute_url(agent.addr);

    let in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .post(url)
            .json(&json!({"command": ["sh", "-c", "sleep 1; echo finished"]}))
            .send()
            .await
            .unwrap()
            .json::<ExecuteResponse>()
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    agent.stop.send(()).unwrap();
    agent.server.await.unwrap().unwrap();

    let body = in_flight.await.unwrap();
    assert_eq!(body.exit_code, 0);
    assert_eq!(body.stdout, "finished\n");
}

#[tokio::test]
async fn shutdown_abandons_requests_after_grace() {
    let agent = start_agent(Duration::from_millis(200)).await;
    let url = execute_url(agent.addr);

    let _in_flight = tokio::spawn(async move {
        let _ = reqwest::Client::new()
            .post(url)
            .json(&json!({"command": ["sleep", "30"], "timeout": 60}))
            .send()
            .await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    agent.stop.send(()).unwrap();
    agent.server.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[tokio::test]
async fn new_connections_are_refused_after_shutdown() {
    let agent = start_agent(Duration::from_secs(1)).await;
    let addr = agent.addr;

    agent.stop.send(()).unwrap();
    agent.server.await.unwrap().unwrap();

    let result = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();
    let config = executor_agent::AgentConfig {
        port,
        working_root: std::env::temp_dir(),
    };

    let err = executor_agent::server::run(config).await.unwrap_err();
    assert!(err.to_string().contains("Failed to bind"), "{err}");
}
