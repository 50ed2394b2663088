//! Fleet tests against the real `tool-server` binary.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};
use toolfleet::fleet::{
    CallRouter, FleetError, HealthChecker, RouterSettings, ServerDescriptor, ServerState, Supervisor,
    SupervisorSettings,
};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn tool_server(id: &str) -> ServerDescriptor {
    let mut descriptor =
        ServerDescriptor::new(id, id, env!("CARGO_BIN_EXE_tool-server"), free_port());
    descriptor
        .env
        .insert("FLEET_LOG_LEVEL".to_string(), "warn".to_string());
    // No daily log files from test servers.
    descriptor
        .env
        .insert("FLEET_LOG_DIR".to_string(), String::new());
    descriptor
}

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        health_attempts: 100,
        health_backoff_ms: 100,
        shutdown_grace_ms: 3_000,
        drain_timeout_ms: 2_000,
    }
}

fn params(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_start_rolls_back_healthy_servers() {
    let benefits = tool_server("benefits");
    let address = benefits.address();
    let ghost = ServerDescriptor::new("ghost", "Ghost", "/definitely/not/a/binary", free_port());
    let supervisor = Supervisor::with_settings(vec![benefits, ghost], settings());

    let err = assert_err!(supervisor.start_all().await);
    match err {
        FleetError::ServerStartupFailed { id, .. } => assert_eq!(id, "ghost"),
        other => panic!("unexpected error: {other}"),
    }

    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot[0].id, "benefits");
    assert_eq!(snapshot[0].state, ServerState::Stopped);
    let pid = snapshot[0].pid.expect("benefits was launched");
    assert!(!process_alive(pid), "benefits still running after rollback");
    assert!(!HealthChecker::new().responds(&address).await);
}

#[tokio::test]
async fn test_unknown_server_id_fails_startup() {
    let supervisor = Supervisor::with_settings(vec![tool_server("bogus")], settings());

    let err = assert_err!(supervisor.start_all().await);
    assert!(err.to_string().contains("exited"), "{err}");
    assert_eq!(supervisor.state("bogus"), Some(ServerState::Stopped));
}

#[tokio::test]
async fn test_stop_all_twice() {
    let supervisor = Supervisor::with_settings(vec![tool_server("safepay_wallet")], settings());
    assert_ok!(supervisor.start_all().await);
    assert_eq!(supervisor.state("safepay_wallet"), Some(ServerState::Healthy));

    supervisor.stop_all().await;
    supervisor.stop_all().await;
    assert_eq!(supervisor.state("safepay_wallet"), Some(ServerState::Stopped));
}

#[tokio::test]
async fn test_resolve_is_stable() {
    let descriptor = tool_server("chase_travel");
    let expected = descriptor.address();
    let supervisor = Supervisor::with_settings(vec![descriptor], settings());
    assert_ok!(supervisor.start("chase_travel").await);

    let first = assert_ok!(supervisor.resolve("chase_travel"));
    let second = assert_ok!(supervisor.resolve("chase_travel"));
    assert_eq!(first, second);
    assert_eq!(first, expected);

    let snapshot = supervisor.check_health().await;
    assert_eq!(snapshot[0].state, ServerState::Healthy);

    assert_ok!(supervisor.stop("chase_travel").await);
    assert!(matches!(
        supervisor.resolve("chase_travel"),
        Err(FleetError::ServerUnavailable { .. })
    ));
    supervisor.stop_all().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_killed_server_turns_unhealthy_and_unresolvable() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let supervisor = Supervisor::with_settings(vec![tool_server("benefits")], settings());
    assert_ok!(supervisor.start_all().await);
    let pid = supervisor.snapshot()[0].pid.expect("benefits was launched");
    assert_ok!(supervisor.resolve("benefits"));

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    // The child stays a zombie until the supervisor reaps it, so just give
    // the signal time to land.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = supervisor.check_health().await;
    assert_eq!(snapshot[0].state, ServerState::Unhealthy);
    assert_eq!(supervisor.state("benefits"), Some(ServerState::Unhealthy));
    assert!(matches!(
        supervisor.resolve("benefits"),
        Err(FleetError::ServerUnavailable { .. })
    ));
    assert!(matches!(
        supervisor.lease("benefits"),
        Err(FleetError::ServerUnavailable { .. })
    ));

    supervisor.stop_all().await;
    assert_eq!(supervisor.state("benefits"), Some(ServerState::Stopped));
}

#[tokio::test]
async fn test_routed_calls_across_fleet() {
    let supervisor = Arc::new(Supervisor::with_settings(
        vec![
            tool_server("chase_travel"),
            tool_server("safepay_wallet"),
            tool_server("benefits"),
        ],
        settings(),
    ));
    assert_ok!(supervisor.start_all().await);

    let router_settings = RouterSettings {
        call_timeout_ms: 5_000,
        max_retries: 1,
    };
    let router = assert_ok!(CallRouter::discover(supervisor.clone(), router_settings).await);
    assert_eq!(router.table().len(), 5);
    assert_eq!(
        router.table().route("search_flights").unwrap().server_id,
        "chase_travel"
    );

    let data = assert_ok!(
        router
            .call(
                "calculate_rewards",
                params(json!({
                    "card_id": "c1",
                    "purchases": [{ "category": "TRAVEL", "amount": 100 }]
                })),
            )
            .await
    );
    assert_eq!(data["total_rewards"], json!(300.0));

    let err = assert_err!(
        router
            .call(
                "calculate_rewards",
                params(json!({ "card_id": "c1", "purchases": [] })),
            )
            .await
    );
    match err {
        FleetError::RemoteOperationError { message } => {
            assert!(message.contains("At least one purchase is required"), "{message}")
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = assert_err!(router.call("book_hotel", params(json!({}))).await);
    assert!(matches!(err, FleetError::RoutingError { .. }));

    assert_ok!(supervisor.stop("benefits").await);
    let err = assert_err!(
        router
            .call("get_card_benefits", params(json!({ "card_id": "c1" })))
            .await
    );
    assert!(matches!(err, FleetError::ServerUnavailable { .. }));

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_call() {
    let supervisor = Arc::new(Supervisor::with_settings(
        vec![tool_server("benefits")],
        settings(),
    ));
    assert_ok!(supervisor.start_all().await);

    let lease = assert_ok!(supervisor.lease("benefits"));
    let stopping = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.stop("benefits").await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!stopping.is_finished());
    // New calls are refused while draining.
    assert!(matches!(
        supervisor.lease("benefits"),
        Err(FleetError::ServerUnavailable { .. })
    ));

    drop(lease);
    let stopped = tokio::time::timeout(Duration::from_secs(10), stopping)
        .await
        .unwrap()
        .unwrap();
    assert_ok!(stopped);
    assert_eq!(supervisor.state("benefits"), Some(ServerState::Stopped));
}
