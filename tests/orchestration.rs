//! Integration tests for the orchestration core.
//!
//! Exercise the managers together the way the server wires them: one
//! event bus, terminals + watches + tasks, and connection-style cascade
//! teardown across all of them.

use std::sync::Arc;
use std::time::Duration;

use atrium_core::{
    EventBus, SimulatedExecutor, TaskKind, TaskStatus, TaskTracker, TerminalConfig,
    TerminalManager, WatchManager, WorkspaceEvent,
};
use uuid::Uuid;

fn stack() -> (EventBus, Arc<TerminalManager>, Arc<WatchManager>, TaskTracker) {
    let bus = EventBus::new(512);
    let terminals = Arc::new(TerminalManager::new(
        bus.clone(),
        TerminalConfig {
            shell: "/bin/sh".to_string(),
            cwd: None,
            max_sessions: 8,
        },
    ));
    let watches = Arc::new(WatchManager::new(bus.clone()));
    let tasks = TaskTracker::new(
        bus.clone(),
        Arc::new(SimulatedExecutor::new(Duration::from_millis(25))),
    );
    (bus, terminals, watches, tasks)
}

#[tokio::test]
async fn disconnect_releases_everything_and_silences_events() {
    let (bus, terminals, watches, _tasks) = stack();
    let conn = Uuid::new_v4();

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "v1").unwrap();

    let s1 = terminals.create(conn, 80, 24).await.unwrap();
    let s2 = terminals.create(conn, 80, 24).await.unwrap();
    let watch = watches.subscribe(conn, &file).await.unwrap();
    assert_eq!(terminals.session_count().await, 2);
    assert_eq!(watches.watch_count().await, 1);

    let mut rx = bus.subscribe();

    // Connection detach: cascade both managers.
    terminals.destroy_all_owned_by(conn).await;
    watches.unsubscribe_all_owned_by(conn).await;

    assert_eq!(terminals.session_count().await, 0);
    assert_eq!(watches.watch_count().await, 0);

    // Exactly one close per session.
    let mut closed = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(WorkspaceEvent::TerminalClosed { session_id, .. })) => closed.push(session_id),
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert_eq!(closed.iter().filter(|id| **id == s1).count(), 1);
    assert_eq!(closed.iter().filter(|id| **id == s2).count(), 1);

    // A change to the previously watched file produces nothing.
    let mut rx = bus.subscribe();
    std::fs::write(&file, "v2 after detach").unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(400), async {
        loop {
            match rx.recv().await {
                Ok(WorkspaceEvent::FileChanged { watch_id, .. }) if watch_id == watch => {
                    return false;
                }
                Ok(_) => continue,
                Err(_) => return true,
            }
        }
    })
    .await
    .unwrap_or(true);
    assert!(quiet, "watch delivered after release");

    // Stale ids from the torn-down connection are benign.
    terminals.write(s1, "echo race\n").await;
    terminals.resize(s2, 120, 40).await;
    terminals.destroy(s1).await;
    watches.unsubscribe(watch).await;
}

#[tokio::test]
async fn terminal_echo_reaches_owner_only() {
    let (bus, terminals, _watches, _tasks) = stack();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let mut rx = bus.subscribe();
    let session = terminals.create(owner, 80, 24).await.unwrap();
    terminals.write(session, "echo integration\n").await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut seen = false;
    while !seen {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(WorkspaceEvent::TerminalOutput {
                connection_id,
                session_id,
                data,
            })) if session_id == session && data.contains("integration") => {
                // Owner-scoped: the event names its owner, never anyone else.
                assert_eq!(connection_id, owner);
                assert_ne!(connection_id, stranger);
                seen = true;
            }
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert!(seen);

    terminals.destroy(session).await;
}

#[tokio::test]
async fn tasks_complete_globally_and_are_retained() {
    let (bus, _terminals, _watches, tasks) = stack();
    let mut rx = bus.subscribe();

    let ai = tasks
        .submit(TaskKind::AiCommand, serde_json::json!({"prompt": "hi"}))
        .await;
    let deploy = tasks
        .submit(TaskKind::Deployment, serde_json::json!({"platform": "vercel"}))
        .await;

    let mut finished = std::collections::HashSet::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while finished.len() < 2 {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(WorkspaceEvent::TaskUpdated { task })) if task.status.is_terminal() => {
                assert_eq!(task.status, TaskStatus::Succeeded);
                finished.insert(task.id);
            }
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert!(finished.contains(&ai));
    assert!(finished.contains(&deploy));

    // Retained for enumeration after completion.
    let listed = tasks.list().await;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|t| t.status == TaskStatus::Succeeded));
}
