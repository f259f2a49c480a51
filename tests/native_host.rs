//! Bridge against the real echo host process, resolved through a manifest.

#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

use netmanthan_bridge::status::{STATUS_KEY, StorageChange};
use netmanthan_bridge::transport::DEFAULT_MESSAGE_BUFFER;
use netmanthan_bridge::{
    Bridge, ConnectPolicy, Connection, ConnectionManager, ConnectionState, DiagnosticSink,
    Endpoint, EndpointName, Error, ManifestEndpoint, MemoryStore, StatusPublisher, StatusStore,
};

use common::{EventLog, FakeDownloads, RecordingSink, init_tracing, zip_download};

const HOST_NAME: &str = "com.netmanthan.nativemessaging";
const EXTENSION_ID: &str = "bridge@netmanthan.test";

/// Host that closes its stdout right away but keeps running.
const LINGERING_HOST: &str = "#!/bin/sh\nexec 1>&-\nexec sleep 5\n";

fn write_manifest(dir: &Path, allowed: &[&str]) {
    write_manifest_for(dir, Path::new(env!("CARGO_BIN_EXE_netmanthan-echo-host")), allowed);
}

fn write_manifest_for(dir: &Path, program: &Path, allowed: &[&str]) {
    let manifest = json!({
        "name": HOST_NAME,
        "description": "Native host for tests",
        "path": program,
        "type": "stdio",
        "allowed_extensions": allowed,
    });
    fs::write(
        dir.join(format!("{HOST_NAME}.json")),
        serde_json::to_vec_pretty(&manifest).expect("manifest json"),
    )
    .expect("write manifest");
}

#[tokio::test]
async fn request_round_trips_through_process() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    write_manifest(dir.path(), &[EXTENSION_ID]);

    let sink = Arc::new(RecordingSink::default());
    let bridge = Bridge::builder()
        .manifest_dir(dir.path())
        .extension_id(EXTENSION_ID)
        .connect_policy(ConnectPolicy::Lazy)
        .status_file(dir.path().join("status.json"))
        .downloads(Arc::new(FakeDownloads::new(EventLog::default())))
        .sink(Arc::clone(&sink) as Arc<dyn DiagnosticSink>)
        .build()?;

    bridge.on_download(zip_download(1)).await?;
    assert!(bridge.connection_state().connected);

    let responses = sink.wait_for_responses(1).await;
    assert_eq!(
        responses.first().context("no response")?,
        &json!({
            "status": "received",
            "echo": {
                "url": "https://x/test.zip",
                "filename": "test.zip",
                "mimeType": "application/zip"
            }
        })
    );

    bridge.shutdown().await;
    assert!(!bridge.connection_state().connected);

    let stored: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("status.json"))?)?;
    assert_eq!(stored, json!({ "isConnected": false, "lastError": null }));
    Ok(())
}

#[tokio::test]
async fn host_exit_is_error_disconnect() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    write_manifest(dir.path(), &[]);

    let endpoint = ManifestEndpoint::new(vec![dir.path().to_path_buf()], None);
    let name = EndpointName::new(HOST_NAME)?;
    let io = endpoint.launch(&name).await?;
    let connection = Connection::new(name, io, DEFAULT_MESSAGE_BUFFER);

    connection.send(&json!({ "command": "exit", "code": 3 }))?;
    let reason = connection.on_disconnect().await;

    let detail = reason.detail().context("expected error disconnect")?;
    assert!(detail.starts_with("native host has exited"), "{detail}");
    Ok(())
}

#[tokio::test]
async fn forbidden_extension_is_unavailable() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    write_manifest(dir.path(), &["someone-else@netmanthan.test"]);

    let bridge = Bridge::builder()
        .manifest_dir(dir.path())
        .extension_id(EXTENSION_ID)
        .downloads(Arc::new(FakeDownloads::new(EventLog::default())))
        .build()?;

    let err = bridge.start().await.unwrap_err();
    assert!(matches!(err, Error::EndpointUnavailable { .. }));
    assert!(
        bridge
            .connection_state()
            .last_error
            .is_some_and(|e| e.contains("forbidden"))
    );
    Ok(())
}

fn write_lingering_host(dir: &Path) -> Result<()> {
    let script = dir.join("lingering-host.sh");
    fs::write(&script, LINGERING_HOST)?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
    write_manifest_for(dir, &script, &[]);
    Ok(())
}

fn lingering_manager(dir: &Path) -> (ConnectionManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let publisher = Arc::new(StatusPublisher::new(Arc::clone(&store) as Arc<dyn StatusStore>));
    let manager = ConnectionManager::new(
        Arc::new(ManifestEndpoint::new(vec![dir.to_path_buf()], None)),
        publisher,
        DEFAULT_MESSAGE_BUFFER,
    );
    (manager, store)
}

/// Next published `isConnected` value.
async fn next_connected(changes: &mut broadcast::Receiver<StorageChange>) -> Result<bool> {
    loop {
        let change = timeout(Duration::from_secs(1), changes.recv()).await??;
        if let Some(connected) = change
            .get(STATUS_KEY)
            .and_then(|c| c.new_value.as_ref())
            .and_then(Value::as_bool)
        {
            return Ok(connected);
        }
    }
}

#[tokio::test]
async fn closed_stdout_is_dead_before_host_is_reaped() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    write_lingering_host(dir.path())?;
    let (manager, store) = lingering_manager(dir.path());
    let mut changes = store.subscribe();

    let connection = manager.open(&EndpointName::new(HOST_NAME)?).await?;
    assert!(next_connected(&mut changes).await?);
    assert!(!next_connected(&mut changes).await?);

    // The host is still alive, teardown has not finished.
    assert!(connection.disconnect_reason().is_none());
    assert!(!connection.is_live());
    assert!(manager.current().is_none());
    assert_eq!(
        ConnectionState::load(store.as_ref()),
        ConnectionState::disconnected(Some("native host has exited".into()))
    );

    let err = connection
        .send(&json!({ "url": "https://x/late.zip" }))
        .unwrap_err();
    assert!(matches!(err, Error::SendOnDeadChannel { .. }));

    let reason = connection.on_disconnect().await;
    assert_eq!(reason.detail(), Some("native host has exited"));
    Ok(())
}

#[tokio::test]
async fn reopen_waits_for_previous_teardown() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    write_lingering_host(dir.path())?;
    let (manager, store) = lingering_manager(dir.path());
    let mut changes = store.subscribe();
    let name = EndpointName::new(HOST_NAME)?;

    let first = manager.open(&name).await?;
    assert!(next_connected(&mut changes).await?);
    assert!(!next_connected(&mut changes).await?);
    assert!(first.disconnect_reason().is_none());

    let second = manager.open(&name).await?;

    assert_ne!(first.id(), second.id());
    assert!(first.disconnect_reason().is_some());
    assert!(next_connected(&mut changes).await?);
    Ok(())
}
