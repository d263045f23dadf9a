//! Integration tests for `Orchestrator::run` over scripted agent streams.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_turnstile::agent::classify::LOADING_CONTEXT;
use agent_turnstile::agent::{AgentHandle, ExitReport};
use agent_turnstile::gate::Decision;
use agent_turnstile::models::mutation::MutationKind;
use agent_turnstile::models::outcome::OrchestratorOutcome;
use agent_turnstile::orchestrator::{Orchestrator, RunRequest};
use agent_turnstile::persistence::continuity_repo::ContinuityRepo;
use agent_turnstile::progress::NullSink;
use serde_json::json;

use super::test_helpers::{
    edit_line, error_line, init_line, live_agent, orchestrator, result_line,
    scripted_agent, scripted_agent_with_exit, text_line, thread, tool_line, write_line,
    RecordingSink, ScriptedLauncher,
};

fn request(prompt: &str) -> RunRequest {
    RunRequest {
        user_id: "U1".into(),
        thread: thread(),
        prompt: prompt.into(),
        workspace_root: PathBuf::from("/repo"),
        resume_id: None,
    }
}

async fn with_agents(
    agents: Vec<AgentHandle>,
) -> (Orchestrator, Arc<ScriptedLauncher>, ContinuityRepo) {
    let launcher = Arc::new(ScriptedLauncher::new(agents));
    let (orchestrator, continuity) = orchestrator(launcher.clone()).await;
    (orchestrator, launcher, continuity)
}

#[tokio::test]
async fn completed_run_reports_answer_and_progress() {
    let (agent, probe) = scripted_agent(&[
        init_line("s-1"),
        text_line("Let me look."),
        tool_line("Read", json!({"file_path": "/repo/src/main.rs"})),
        result_line("The build is fixed.", "s-1"),
    ]);
    let (orchestrator, launcher, _) = with_agents(vec![agent]).await;
    let sink = RecordingSink::default();

    let outcome = orchestrator.run(request("fix the build"), &sink).await;

    assert_eq!(
        outcome,
        OrchestratorOutcome::Completed {
            text: "The build is fixed.".into(),
            resume_id: Some("s-1".into()),
        }
    );
    assert_eq!(sink.lines(), vec![LOADING_CONTEXT, "Reading: main.rs"]);
    assert!(!probe.killed());

    let launched = launcher.requests();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].prompt, "fix the build");
    assert_eq!(launched[0].workspace_root, Path::new("/repo"));
    assert!(launched[0].resume_id.is_none());
}

#[tokio::test]
async fn empty_result_falls_back_to_last_text() {
    let (agent, _) = scripted_agent(&[
        text_line("Here is the summary."),
        result_line("", "s-1"),
    ]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("summarize"), &NullSink).await;

    assert!(matches!(
        outcome,
        OrchestratorOutcome::Completed { ref text, .. } if text == "Here is the summary."
    ));
}

#[tokio::test]
async fn noise_lines_do_not_end_the_run() {
    let (agent, _) = scripted_agent(&[
        "npm WARN deprecated something".to_owned(),
        String::new(),
        init_line("s-1"),
        result_line("ok", "s-1"),
    ]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("go"), &NullSink).await;

    assert!(matches!(outcome, OrchestratorOutcome::Completed { .. }));
}

#[tokio::test]
async fn edit_suspends_and_approval_continues_same_stream() {
    let (agent, probe) = scripted_agent(&[
        init_line("s-1"),
        edit_line("/repo/src/lib.rs", "old", "new"),
        tool_line("Bash", json!({"command": "cargo fmt"})),
        result_line("Edited lib.rs.", "s-1"),
    ]);
    let (orchestrator, launcher, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("edit"), &NullSink).await;
    let OrchestratorOutcome::AwaitingApproval {
        approval_id,
        request: mutation,
    } = outcome
    else {
        panic!("expected approval request");
    };
    assert_eq!(mutation.kind, MutationKind::Modify);
    assert_eq!(mutation.prior, "old");
    assert_eq!(mutation.proposed, "new");
    assert!(orchestrator.gate().contains(&approval_id).await);

    let sink = RecordingSink::default();
    let resolution = orchestrator
        .gate()
        .resolve(&approval_id, Decision::Approve, "U1", &sink)
        .await
        .expect("resolve");

    assert_eq!(
        resolution.outcome,
        OrchestratorOutcome::Completed {
            text: "Edited lib.rs.".into(),
            resume_id: Some("s-1".into()),
        }
    );
    assert_eq!(sink.lines(), vec!["Running: cargo fmt"]);
    assert_eq!(launcher.requests().len(), 1, "no relaunch on approval");
    assert!(!probe.killed());
}

#[tokio::test]
async fn write_suspends_as_create() {
    let (agent, _) = scripted_agent(&[write_line("/repo/NEW.md", "# New\n")]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("create"), &NullSink).await;

    let OrchestratorOutcome::AwaitingApproval { request, .. } = outcome else {
        panic!("expected approval request");
    };
    assert_eq!(request.kind, MutationKind::Create);
    assert_eq!(request.file_path, "/repo/NEW.md");
    assert!(request.prior.is_empty());
}

#[tokio::test]
async fn rejecting_stops_the_agent() {
    let (agent, probe) = scripted_agent(&[
        edit_line("/repo/a.rs", "a", "b"),
        result_line("never seen", "s-1"),
    ]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let OrchestratorOutcome::AwaitingApproval { approval_id, .. } =
        orchestrator.run(request("edit"), &NullSink).await
    else {
        panic!("expected approval request");
    };
    let resolution = orchestrator
        .gate()
        .resolve(&approval_id, Decision::Reject, "U1", &NullSink)
        .await
        .expect("resolve");

    assert_eq!(resolution.outcome, OrchestratorOutcome::Rejected);
    assert_eq!(probe.kills(), 1);
}

#[tokio::test]
async fn failure_event_fails_and_terminates() {
    let (agent, probe) = scripted_agent(&[init_line("s-1"), error_line("API overloaded")]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("go"), &NullSink).await;

    assert_eq!(outcome, OrchestratorOutcome::failed("API overloaded"));
    assert_eq!(probe.kills(), 1);
}

#[tokio::test]
async fn failure_reason_is_bounded() {
    let long = "e".repeat(2_000);
    let (agent, _) = scripted_agent(&[error_line(&long)]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let OrchestratorOutcome::Failed { reason } = orchestrator.run(request("go"), &NullSink).await
    else {
        panic!("expected failure");
    };
    assert_eq!(reason.chars().count(), 500);
}

#[tokio::test]
async fn eof_with_error_exit_reports_stderr() {
    let (agent, _) = scripted_agent_with_exit(
        &[init_line("s-1")],
        ExitReport {
            code: Some(1),
            stderr: "Error: invalid API key\n".into(),
        },
    );
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("go"), &NullSink).await;

    assert_eq!(
        outcome,
        OrchestratorOutcome::failed("Error: Error: invalid API key")
    );
}

#[tokio::test]
async fn eof_with_error_exit_and_no_stderr_reports_status() {
    let (agent, _) = scripted_agent_with_exit(
        &[],
        ExitReport {
            code: Some(2),
            stderr: String::new(),
        },
    );
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("go"), &NullSink).await;

    assert_eq!(
        outcome,
        OrchestratorOutcome::failed("Error: agent exited with status Some(2)")
    );
}

#[tokio::test]
async fn eof_after_clean_exit_without_result() {
    let (agent, _) = scripted_agent(&[init_line("s-1"), text_line("partial")]);
    let (orchestrator, _, _) = with_agents(vec![agent]).await;

    let outcome = orchestrator.run(request("go"), &NullSink).await;

    assert_eq!(
        outcome,
        OrchestratorOutcome::failed("Agent finished without a response.")
    );
}

#[tokio::test]
async fn silent_agent_times_out_and_is_terminated() {
    let (agent, probe, _stdin_of_stdout) = live_agent();
    let (orchestrator, _, _) = with_agents(vec![agent]).await;
    tokio::time::pause();

    let outcome = orchestrator.run(request("go"), &NullSink).await;

    assert_eq!(
        outcome,
        OrchestratorOutcome::failed("Request timed out after 300s without agent output.")
    );
    assert_eq!(probe.kills(), 1);
}

#[tokio::test]
async fn slow_but_steady_agent_is_not_timed_out() {
    use tokio::io::AsyncWriteExt;

    let (agent, _, mut writer) = live_agent();
    let (orchestrator, _, _) = with_agents(vec![agent]).await;
    tokio::time::pause();

    let feeder = tokio::spawn(async move {
        for line in [init_line("s-1"), text_line("still going")] {
            tokio::time::sleep(std::time::Duration::from_secs(200)).await;
            writer.write_all(format!("{line}\n").as_bytes()).await.expect("write");
        }
        tokio::time::sleep(std::time::Duration::from_secs(200)).await;
        writer
            .write_all(format!("{}\n", result_line("done", "s-1")).as_bytes())
            .await
            .expect("write");
        writer
    });

    let outcome = orchestrator.run(request("go"), &NullSink).await;
    let _writer = feeder.await.expect("feeder");

    assert!(matches!(outcome, OrchestratorOutcome::Completed { .. }));
}

#[tokio::test]
async fn launch_failure_is_reported_as_failed() {
    let (orchestrator, _, _) = with_agents(Vec::new()).await;

    let OrchestratorOutcome::Failed { reason } = orchestrator.run(request("go"), &NullSink).await
    else {
        panic!("expected failure");
    };
    assert!(reason.starts_with("Failed to start agent:"), "{reason}");
}

#[tokio::test]
async fn completion_persists_resume_id_for_next_run() {
    let (first, _) = scripted_agent(&[result_line("one", "s-1")]);
    let (second, _) = scripted_agent(&[result_line("two", "s-2")]);
    let (orchestrator, launcher, continuity) = with_agents(vec![first, second]).await;

    let outcome = orchestrator
        .run_conversation("U1", thread(), "first".into(), Path::new("/repo"), &NullSink)
        .await
        .expect("first run");
    assert!(matches!(outcome, OrchestratorOutcome::Completed { .. }));

    let stored = continuity.get("U1").await.expect("get").expect("exists");
    assert_eq!(stored.resume_id.as_deref(), Some("s-1"));

    orchestrator
        .run_conversation("U1", thread(), "second".into(), Path::new("/repo"), &NullSink)
        .await
        .expect("second run");

    let launched = launcher.requests();
    assert_eq!(launched[0].resume_id, None);
    assert_eq!(launched[1].resume_id.as_deref(), Some("s-1"));
    assert_eq!(
        continuity
            .get("U1")
            .await
            .expect("get")
            .expect("exists")
            .resume_id
            .as_deref(),
        Some("s-2")
    );
}

#[tokio::test]
async fn failed_run_keeps_previous_resume_id() {
    let (first, _) = scripted_agent(&[result_line("one", "s-1")]);
    let (second, _) = scripted_agent(&[error_line("boom")]);
    let (orchestrator, _, continuity) = with_agents(vec![first, second]).await;

    for prompt in ["first", "second"] {
        orchestrator
            .run_conversation("U1", thread(), prompt.into(), Path::new("/repo"), &NullSink)
            .await
            .expect("run");
    }

    let stored = continuity.get("U1").await.expect("get").expect("exists");
    assert_eq!(stored.resume_id.as_deref(), Some("s-1"));
}
