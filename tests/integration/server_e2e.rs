//! Dev server startup tests.

use tokio_util::sync::CancellationToken;

use nacre::Error;

use crate::fixtures::{free_port, TestProject};

/// Test: Port conflict aborts the default alias
/// Given another process bound to the configured port
/// When the default alias runs
/// Then it fails with PortInUse before buildtest or watch start
#[tokio::test]
async fn test_taken_port_aborts_before_buildtest() {
    let mut project = TestProject::new();

    // Occupy a port and configure the server to want exactly that one.
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    project.config.server.port = taken.local_addr().unwrap().port();

    let orchestrator = project.orchestrator(CancellationToken::new());
    let result = orchestrator.run_alias("default").await;

    match result {
        Err(Error::PortInUse(port)) => assert_eq!(port, project.config.server.port),
        other => panic!("expected PortInUse, got {:?}", other.map(|_| ())),
    }
    // serve is the first step of default; nothing after it ran.
    assert_eq!(project.steps_log(), "");
}

/// Test: Serve-only alias stays up until shutdown
/// Given an alias containing just the server
/// When shutdown fires
/// Then the alias returns cleanly and the socket is released
#[tokio::test]
async fn test_serve_alias_shuts_down_cleanly() {
    let mut project = TestProject::new();
    let port = free_port();
    project.config.server.port = port;
    project
        .config
        .aliases
        .insert("justserve".to_string(), vec!["serve".to_string()]);

    let shutdown = CancellationToken::new();
    let orchestrator = project.orchestrator(shutdown.clone());

    let handle = tokio::spawn(async move { orchestrator.run_alias("justserve").await });

    // Let it bind, then stop it.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("serve alias should stop after cancellation")
        .unwrap()
        .unwrap();

    // The socket is free again.
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("port should be released");
}
