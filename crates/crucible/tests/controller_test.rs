//! Round controller: loop bounds, early exit, tracing, failure attribution.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{council, engine, settings, three_seat, ScriptedTransport, SequenceDetector};
use crucible::council::{Complexity, Grammar, Role};
use crucible::{AbortCause, CallSite, Deliberation, ErrorKind, RunError, TransportError};
use crucible::{MessageRole, TieredRouter, Transport};
use tokio_util::sync::CancellationToken;

fn query() -> Deliberation {
    Deliberation::new("Should we migrate the billing service to event sourcing?")
}

#[tokio::test]
async fn test_converges_at_round_two() {
    let transport = Arc::new(ScriptedTransport::new());
    let detector = Arc::new(SequenceDetector::new(&[true, false], true));
    let engine = engine(settings(true), &transport, Some(detector.clone()));

    let result = engine
        .run(&three_seat(Grammar::FanOut, 3), &query())
        .await
        .unwrap();

    assert_eq!(result.loops_executed, 2);
    assert!(result.early_exit);
    assert_eq!(result.final_response, common::SYNTHESIS_TEXT);
    let trace = result.reasoning_trace.unwrap();
    assert_eq!(trace.len(), 2);
    assert!(trace[0].material_change);
    assert!(!trace[1].material_change);
    assert_eq!(detector.saw_prior(), vec![false, true]);
}

#[tokio::test]
async fn test_always_changed_runs_full_budget() {
    let transport = Arc::new(ScriptedTransport::new());
    let detector = Arc::new(SequenceDetector::always(true));
    let engine = engine(settings(true), &transport, Some(detector));

    let result = engine
        .run(&three_seat(Grammar::FanOut, 3), &query())
        .await
        .unwrap();

    assert_eq!(result.loops_executed, 3);
    assert!(!result.early_exit);
    let rounds: Vec<u32> = result
        .reasoning_trace
        .unwrap()
        .iter()
        .map(|s| s.round)
        .collect();
    assert_eq!(rounds, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_no_early_exit_before_round_two() {
    let transport = Arc::new(ScriptedTransport::new());
    let detector = Arc::new(SequenceDetector::always(false));
    let engine = engine(settings(true), &transport, Some(detector));

    let result = engine
        .run(&three_seat(Grammar::FanOut, 5), &query())
        .await
        .unwrap();

    assert_eq!(result.loops_executed, 2);
    assert!(result.early_exit);
}

#[tokio::test]
async fn test_early_exit_disabled_uses_whole_budget() {
    let transport = Arc::new(ScriptedTransport::new());
    let detector = Arc::new(SequenceDetector::always(false));
    let engine = engine(settings(false), &transport, Some(detector));
    let mut config = three_seat(Grammar::FanOut, 4);
    config.allow_early_exit = false;

    let result = engine.run(&config, &query()).await.unwrap();

    assert_eq!(result.loops_executed, 4);
    assert!(!result.early_exit);
}

#[tokio::test]
async fn test_trace_absent_when_disabled() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(
        settings(false),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );

    let result = engine
        .run(&three_seat(Grammar::FanOut, 2), &query())
        .await
        .unwrap();

    assert!(result.reasoning_trace.is_none());
    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("reasoning_trace").is_none());

    // Without a trace only the final round reaches synthesis.
    let synthesis = transport.requests_for("synthesis");
    assert_eq!(synthesis.len(), 1);
    let prompt = &synthesis[0].messages[0].content;
    assert!(prompt.contains("=== ROUND 2 ==="));
    assert!(!prompt.contains("=== ROUND 1 ==="));
}

#[tokio::test]
async fn test_traced_synthesis_sees_every_round() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(
        settings(true),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );
    let input = query().with_original_query("event sourcing for billing?? pls");

    engine
        .run(&three_seat(Grammar::FanOut, 2), &input)
        .await
        .unwrap();

    let prompt = transport.requests_for("synthesis")[0].messages[0]
        .content
        .clone();
    assert!(prompt.contains("ORIGINAL USER QUERY:\nevent sourcing for billing?? pls"));
    assert!(prompt.contains("RECONSTRUCTED QUERY (used by council):\nShould we migrate"));
    assert!(prompt.contains("=== ROUND 1 ==="));
    assert!(prompt.contains("=== ROUND 2 ==="));
    assert!(prompt.contains("SYNTHESIS INSTRUCTION:\nAnswer in one paragraph."));
}

#[tokio::test]
async fn test_short_circuit_skips_council() {
    let transport = Arc::new(ScriptedTransport::new());
    let detector = Arc::new(SequenceDetector::always(true));
    let engine = engine(settings(true), &transport, Some(detector.clone()));
    let mut config = three_seat(Grammar::FanOut, 3);
    config.complexity = Complexity::Simple;
    config.short_circuit_allowed = true;

    let result = engine
        .run(&config, &Deliberation::new("What is 2+2?"))
        .await
        .unwrap();

    assert_eq!(result.loops_executed, 0);
    assert!(result.early_exit);
    assert_eq!(result.reasoning_trace, Some(vec![]));
    assert_eq!(transport.labels(), vec!["synthesis"]);
    assert!(detector.saw_prior().is_empty());

    let messages = &transport.requests()[0].messages;
    assert_eq!(messages[0].role, MessageRole::System);
    assert_eq!(messages[0].content, "Answer in one paragraph.");
    assert_eq!(messages[1].content, "What is 2+2?");
}

#[tokio::test]
async fn test_short_circuit_without_trace_has_no_trace() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(settings(false), &transport, None);
    let mut config = three_seat(Grammar::ChainedDraft, 2);
    config.complexity = Complexity::Simple;
    config.short_circuit_allowed = true;

    let result = engine.run(&config, &query()).await.unwrap();
    assert_eq!(result.loops_executed, 0);
    assert!(result.reasoning_trace.is_none());
}

#[tokio::test]
async fn test_seat_failure_aborts_run() {
    let transport = Arc::new(
        ScriptedTransport::new().failing("pragmatist", TransportError::unavailable("m", "503")),
    );
    let engine = engine(
        settings(true),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );

    let err = engine
        .run(&three_seat(Grammar::FanOut, 3), &query())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RoundAborted);
    match err {
        RunError::RoundAborted {
            round: 1,
            cause: AbortCause::Call { site, .. },
        } => assert_eq!(site, CallSite::Seat(Role::Pragmatist)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(transport.requests_for("synthesis").is_empty());
    assert!(transport.requests_for("red_team").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_seat_failure_abandons_slow_siblings() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_latency("domain_expert", Duration::from_secs(100))
            .failing("pragmatist", TransportError::unavailable("m", "503")),
    );
    let engine = engine(
        settings(true),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );
    let started = tokio::time::Instant::now();

    let err = engine
        .run(&three_seat(Grammar::FanOut, 3), &query())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RoundAborted);
    assert!(started.elapsed() < Duration::from_secs(100));
    assert!(transport.requests_for("red_team").is_empty());
}

#[tokio::test]
async fn test_trace_records_answering_models() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .answered_by("pragmatist", "b/backup")
            .answered_by("red_team", "c/backup-red"),
    );
    let mut settings = settings(true);
    settings.default_model = "a/primary".to_string();
    let engine = engine(
        settings,
        &transport,
        Some(Arc::new(SequenceDetector::new(&[true, false], true))),
    );

    let result = engine
        .run(&three_seat(Grammar::PositionDefense, 3), &query())
        .await
        .unwrap();

    let trace = result.reasoning_trace.unwrap();
    assert_eq!(trace.len(), 2);
    for snapshot in &trace {
        assert_eq!(snapshot.models_used.get(Role::DomainExpert), Some("a/primary"));
        assert_eq!(snapshot.models_used.get(Role::Pragmatist), Some("b/backup"));
        assert_eq!(snapshot.models_used.len(), 2);
        assert_eq!(snapshot.critique_model, "c/backup-red");
    }
}

#[tokio::test]
async fn test_invalid_request_is_transport_permanent() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .failing("red_team", TransportError::invalid_request("m", "context too long")),
    );
    let engine = engine(settings(false), &transport, None);

    let err = engine
        .run(&three_seat(Grammar::FanOut, 2), &query())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransportPermanent);
    assert!(err.to_string().contains("red_team"));
}

#[tokio::test]
async fn test_synthesis_exhaustion_fails_run() {
    let transport = Arc::new(
        ScriptedTransport::new().failing("synthesis", TransportError::timeout("m", "budget")),
    );
    let engine = engine(
        settings(true),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );

    let err = engine
        .run(&three_seat(Grammar::FanOut, 2), &query())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SynthesisFailed);
}

#[tokio::test]
async fn test_judge_verdict_drives_convergence() {
    let transport = Arc::new(ScriptedTransport::new().with_judge_verdicts(&["NO"]));
    let engine = engine(settings(false), &transport, None);

    let result = engine
        .run(&three_seat(Grammar::FanOut, 4), &query())
        .await
        .unwrap();

    assert_eq!(result.loops_executed, 2);
    assert!(result.early_exit);
    // No judge call for round 1: there is no prior round.
    let judge = transport.requests_for("judge");
    assert_eq!(judge.len(), 1);
    assert!(judge[0].messages[1].content.contains("PRIOR:\n[DOMAIN_EXPERT]"));
}

#[tokio::test]
async fn test_judge_failure_aborts_round() {
    let transport = Arc::new(
        ScriptedTransport::new().failing("judge", TransportError::unavailable("judge", "502")),
    );
    let engine = engine(settings(true), &transport, None);

    let err = engine
        .run(&three_seat(Grammar::FanOut, 3), &query())
        .await
        .unwrap_err();

    match err {
        RunError::RoundAborted {
            round: 2,
            cause: AbortCause::Call { site, .. },
        } => assert_eq!(site, CallSite::Judge),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_invalid_config_rejected_before_any_call() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(settings(false), &transport, None);
    let config = three_seat(Grammar::FanOut, 7);

    let err = engine.run(&config, &query()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_duplicate_role_rejected() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(settings(false), &transport, None);
    let config = council(Grammar::FanOut, &[Role::Creative, Role::Creative], 2);

    let err = engine.run(&config, &query()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(settings(false), &transport, None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .run_with_cancel(&three_seat(Grammar::FanOut, 2), &query(), cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_round_abandons_calls() {
    let transport = Arc::new(
        ScriptedTransport::new().with_latency("pragmatist", Duration::from_secs(60)),
    );
    let engine = engine(settings(false), &transport, None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let config = three_seat(Grammar::FanOut, 2);
    let input = query();

    let started = tokio::time::Instant::now();
    let (outcome, _) = tokio::join!(engine.run_with_cancel(&config, &input, cancel), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(transport.requests_for("synthesis").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_round_timeout_aborts() {
    let transport = Arc::new(
        ScriptedTransport::new().with_latency("domain_expert", Duration::from_secs(30)),
    );
    let mut settings = settings(false);
    settings.round_timeout_secs = Some(5);
    let engine = engine(settings, &transport, None);

    let err = engine
        .run(&three_seat(Grammar::FanOut, 2), &query())
        .await
        .unwrap_err();

    match err {
        RunError::RoundAborted {
            round: 1,
            cause: AbortCause::Timeout { after },
        } => assert_eq!(after, Duration::from_secs(5)),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_correlation_ids_carry_round_and_seat() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(
        settings(false),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );

    engine
        .run(&three_seat(Grammar::FanOut, 2), &query())
        .await
        .unwrap();

    let ids: Vec<String> = transport
        .requests_for("pragmatist")
        .into_iter()
        .filter_map(|r| r.correlation_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[0].ends_with(":r1:pragmatist"));
    assert!(ids[1].ends_with(":r2:pragmatist"));
    let run_id = ids[0].split(':').next().unwrap();
    assert!(ids[1].starts_with(run_id));
}

#[tokio::test]
async fn test_model_resolution_hint_then_router_then_default() {
    let transport = Arc::new(ScriptedTransport::new());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = crucible::Engine::builder(settings(false), dyn_transport)
        .detector(Arc::new(SequenceDetector::always(true)))
        .router(Arc::new(TieredRouter::new("x/premium", "")))
        .build()
        .unwrap();
    let mut config = three_seat(Grammar::FanOut, 2);
    config.seats[0].model_hint = Some("x/hinted".to_string());

    engine.run(&config, &query()).await.unwrap();

    assert!(transport
        .requests_for("domain_expert")
        .iter()
        .all(|r| r.model == "x/hinted"));
    assert!(transport
        .requests_for("red_team")
        .iter()
        .all(|r| r.model == "x/premium"));
    // Blank budget tier defers to the engine default.
    assert!(transport
        .requests_for("pragmatist")
        .iter()
        .all(|r| r.model == "openrouter/auto"));
}

#[tokio::test]
async fn test_engine_serves_concurrent_runs() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(
        settings(false),
        &transport,
        Some(Arc::new(SequenceDetector::always(true))),
    );
    let fan_out = three_seat(Grammar::FanOut, 2);
    let chained = three_seat(Grammar::ChainedDraft, 2);
    let input = query();

    let (a, b) = tokio::join!(engine.run(&fan_out, &input), engine.run(&chained, &input));
    assert_eq!(a.unwrap().loops_executed, 2);
    assert_eq!(b.unwrap().loops_executed, 2);

    let run_ids: std::collections::HashSet<String> = transport
        .requests_for("synthesis")
        .into_iter()
        .filter_map(|r| r.correlation_id)
        .map(|id| id.split(':').next().unwrap().to_string())
        .collect();
    assert_eq!(run_ids.len(), 2);
}
