use platformer_server::server::bind_ephemeral;
use platformer_shared::config::NetConfig;

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(NetConfig::default()).await?;
    server.run_for_ticks(3).await;
    assert_eq!(server.tick(), 3);
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn console_rejects_bad_kick_and_quits() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(NetConfig::default()).await?;
    let out = server.exec_console("kick not-a-uuid");
    assert!(out[0].starts_with("Bad player id"));
    assert!(server.exec_console("status")[1].starts_with("Players: 0"));
    assert!(server.is_running());
    server.exec_console("quit");
    assert!(!server.is_running());
    Ok(())
}
