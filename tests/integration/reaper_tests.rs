//! Integration tests for the approval reaper.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_turnstile::gate::ExpiredApproval;
use agent_turnstile::models::mutation::MutationRequest;
use agent_turnstile::models::thread::MessageRef;
use agent_turnstile::orchestrator::reaper::{notify_expired, spawn_reaper, sweep};
use agent_turnstile::orchestrator::RunContext;
use agent_turnstile::surface::{ChatSurface, Outbound};
use tokio_util::sync::CancellationToken;

use super::test_helpers::{continuity, gate, scripted_agent, thread, RecordingSurface};

const INTERVAL: Duration = Duration::from_secs(60);
const TTL: Duration = Duration::from_secs(600);

fn context() -> RunContext {
    RunContext::new("U1", thread(), PathBuf::from("/repo"), None)
}

fn card() -> MessageRef {
    MessageRef {
        channel: "C1".into(),
        ts: "42.0".into(),
    }
}

#[tokio::test]
async fn sweep_edits_the_approval_card() {
    let gate = gate(&continuity().await);
    let surface = RecordingSurface::default();
    tokio::time::pause();

    let (handle, probe) = scripted_agent(&[]);
    let id = gate
        .submit(MutationRequest::modify("/repo/a.rs", "a", "b"), handle, context())
        .await;
    gate.attach_card(&id, card()).await;
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let expired = sweep(&gate, &surface, TTL).await;

    assert_eq!(expired, 1);
    assert_eq!(probe.kills(), 1);
    let edits = surface.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, card());
    let Outbound::Text(text) = &edits[0].1 else {
        panic!("expected text");
    };
    assert!(text.contains("Approval timed out"));
    assert!(text.contains("`/repo/a.rs` was not changed"));
    assert!(surface.sent().is_empty());
}

#[tokio::test]
async fn sweep_without_card_posts_to_thread() {
    let gate = gate(&continuity().await);
    let surface = RecordingSurface::default();
    tokio::time::pause();

    let (handle, _) = scripted_agent(&[]);
    gate.submit(MutationRequest::create("/repo/new.rs", ""), handle, context())
        .await;
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    assert_eq!(sweep(&gate, &surface, TTL).await, 1);
    let texts = surface.sent_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("`/repo/new.rs`"));
}

#[tokio::test]
async fn sweep_with_nothing_stale_is_quiet() {
    let gate = gate(&continuity().await);
    let surface = RecordingSurface::default();

    let (handle, probe) = scripted_agent(&[]);
    gate.submit(MutationRequest::create("/repo/new.rs", ""), handle, context())
        .await;

    assert_eq!(sweep(&gate, &surface, TTL).await, 0);
    assert!(surface.log().is_empty());
    assert!(!probe.killed());
}

#[tokio::test]
async fn notify_uses_given_reason() {
    let surface = RecordingSurface::default();
    let entry = ExpiredApproval {
        id: "id-1".into(),
        user_id: "U1".into(),
        thread: thread(),
        file_path: "/repo/a.rs".into(),
        card: None,
    };

    notify_expired(&surface, &entry, "Server shutting down").await;

    assert_eq!(
        surface.sent_texts(),
        vec!["\u{231b} Server shutting down: `/repo/a.rs` was not changed. The agent was stopped."]
    );
}

#[tokio::test]
async fn background_reaper_expires_after_ttl() {
    let gate = gate(&continuity().await);
    let surface = Arc::new(RecordingSurface::default());
    tokio::time::pause();

    let (handle, probe) = scripted_agent(&[]);
    let id = gate
        .submit(MutationRequest::modify("/repo/a.rs", "a", "b"), handle, context())
        .await;

    let cancel = CancellationToken::new();
    let reaper = spawn_reaper(
        gate.clone(),
        surface.clone() as Arc<dyn ChatSurface>,
        INTERVAL,
        TTL,
        cancel.clone(),
    );

    tokio::time::sleep(TTL - Duration::from_secs(30)).await;
    assert!(gate.contains(&id).await, "not stale yet");
    assert!(!probe.killed());

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert!(!gate.contains(&id).await);
    assert_eq!(probe.kills(), 1);
    assert_eq!(surface.sent_texts().len(), 1);

    cancel.cancel();
    reaper.await.expect("reaper task");
}

#[tokio::test]
async fn reaper_stops_on_cancel() {
    let gate = gate(&continuity().await);
    let surface: Arc<dyn ChatSurface> = Arc::new(RecordingSurface::default());
    tokio::time::pause();

    let cancel = CancellationToken::new();
    let reaper = spawn_reaper(gate, surface, INTERVAL, TTL, cancel.clone());
    tokio::time::sleep(INTERVAL * 3).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), reaper)
        .await
        .expect("reaper exits promptly")
        .expect("reaper task");
}
