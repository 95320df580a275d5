//! End-to-end scenarios across cache, coordinator, reconciler and
//! subscription manager.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::models::{Delta, EventId, PushBody, PushEvent, ResourceHandle, Scope, ServerSnapshot};
use crate::projection::{scoreboard, workload_stats, Side};
use crate::reconciler::{PushOutcome, ReconcileOutcome};
use crate::subscription::SignalOutcome;
use crate::testing::{MembershipCall, RecordingTransport, ScriptedApi};
use crate::transport::TransportSignal;

fn score(home: i64, away: i64) -> Value {
    json!({ "home_score": home, "away_score": away, "status": "live" })
}

fn push(scope: &Scope, handle: &ResourceHandle, version: u64, body: PushBody) -> PushEvent {
    PushEvent {
        scope: scope.clone(),
        handle: handle.clone(),
        version,
        event_id: EventId::random(),
        body,
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        reconcile_max_attempts: 2,
        reconcile_backoff_ms: 1,
        reconcile_max_backoff_ms: 2,
        ..SyncConfig::default()
    }
}

struct World {
    api: Arc<ScriptedApi>,
    transport: Arc<RecordingTransport>,
    client: SyncClient,
}

fn world() -> World {
    let api = Arc::new(ScriptedApi::new());
    let transport = Arc::new(RecordingTransport::new());
    let client = SyncClient::new(&fast_config(), api.clone(), transport.clone());
    World {
        api,
        transport,
        client,
    }
}

#[tokio::test]
async fn match_score_tap_duplicate_and_gap() {
    let w = world();
    let scope = Scope::tournament(3);
    let handle = ResourceHandle::match_score("42").unwrap();
    w.api.respond(&handle, Ok(ServerSnapshot::new(5, score(0, 0))));
    let subscriptions = w.client.subscriptions();
    subscriptions.handle_signal(TransportSignal::Connected).await;
    let subscription = w.client.subscribe(scope.clone(), [handle.clone()]).await;
    assert_eq!(w.client.state(&handle).unwrap().version, 5);

    // Tap "+1" for home; the confirm echoes the optimistic state.
    let outcome = w
        .client
        .mutate(
            &handle,
            Delta::increment([Side::Home.score_field()], 1),
            |_| async { Ok(ServerSnapshot::new(6, score(1, 0))) },
        )
        .await;
    assert_eq!(outcome.into_result().unwrap(), 6);
    let settled = w.client.state(&handle).unwrap();
    assert_eq!((settled.version, settled.payload.clone()), (6, score(1, 0)));
    assert!(settled.pending_mutations.is_empty());

    // The push echo of our own write changes nothing.
    let echo = subscriptions
        .handle_signal(TransportSignal::Event(push(
            &scope,
            &handle,
            6,
            PushBody::Payload(score(1, 0)),
        )))
        .await;
    assert_eq!(echo, SignalOutcome::Pushed(PushOutcome::Stale { current: 6 }));
    assert_eq!(w.client.state(&handle).unwrap(), settled);

    // A teammate scored twice for away; we only see version 8.
    w.api.respond(&handle, Ok(ServerSnapshot::new(8, score(1, 2))));
    let gap = subscriptions
        .handle_signal(TransportSignal::Event(push(
            &scope,
            &handle,
            8,
            PushBody::Delta(Delta::increment([Side::Away.score_field()], 1)),
        )))
        .await;
    assert!(matches!(
        gap,
        SignalOutcome::Pushed(PushOutcome::Reconciled(ReconcileOutcome::Adopted {
            version: 8,
            ..
        }))
    ));
    assert_eq!(w.api.fetch_count(&handle), 2);

    let board = scoreboard(&w.client.state(&handle).unwrap().payload);
    assert_eq!((board.home, board.away), (1, 2));
    assert_eq!(board.leader(), Some(Side::Away));

    w.client.unsubscribe(subscription).await;
    assert_eq!(
        w.transport.calls(),
        vec![MembershipCall::Join(scope.clone()), MembershipCall::Leave(scope)]
    );
}

#[tokio::test]
async fn offline_workload_catches_up_on_reconnect() {
    let w = world();
    let scope = Scope::coach(7);
    let handle = ResourceHandle::coach_workload("7").unwrap();
    let one_session = json!({ "sessions": [
        { "start": "2026-03-01T09:00:00Z", "end": "2026-03-01T10:00:00Z" }
    ]});
    w.api.respond(&handle, Ok(ServerSnapshot::new(1, one_session)));

    let subscriptions = w.client.subscriptions();
    subscriptions.handle_signal(TransportSignal::Connected).await;
    let _subscription = w.client.subscribe(scope.clone(), [handle.clone()]).await;
    subscriptions
        .handle_signal(TransportSignal::Disconnected)
        .await;

    // Two sessions were logged server-side while we were offline.
    let three_sessions = json!({ "sessions": [
        { "start": "2026-03-01T09:00:00Z", "end": "2026-03-01T10:00:00Z" },
        { "start": "2026-03-02T09:00:00Z", "end": "2026-03-02T11:00:00Z" },
        { "start": "2026-03-03T09:00:00Z", "end": "2026-03-03T09:30:00Z" }
    ]});
    w.api.respond(&handle, Ok(ServerSnapshot::new(3, three_sessions)));
    w.transport.clear();
    subscriptions.handle_signal(TransportSignal::Connected).await;

    assert_eq!(w.transport.calls(), vec![MembershipCall::Join(scope)]);
    let state = w.client.state(&handle).unwrap();
    assert_eq!(state.version, 3);
    let stats = workload_stats(&state.payload);
    assert_eq!(stats.completed_sessions, 3);
    assert!((stats.total_hours - 3.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn returning_screen_sees_scores_posted_while_away() {
    let w = world();
    let scope = Scope::tournament(3);
    let handle = ResourceHandle::match_score("42").unwrap();
    let subscriptions = w.client.subscriptions();
    subscriptions.handle_signal(TransportSignal::Connected).await;
    w.api.respond(&handle, Ok(ServerSnapshot::new(5, score(0, 0))));
    let watching = w.client.subscribe(scope.clone(), [handle.clone()]).await;
    w.client.unsubscribe(watching).await;

    // Home scored twice while no screen was on the match.
    w.api.respond(&handle, Ok(ServerSnapshot::new(7, score(2, 0))));
    let _back = w.client.subscribe(scope.clone(), [handle.clone()]).await;

    let state = w.client.state(&handle).unwrap();
    assert_eq!((state.version, state.payload.clone()), (7, score(2, 0)));
    assert_eq!(
        crate::projection::freshness(&state),
        crate::projection::Freshness::Live
    );
    assert_eq!(w.api.fetch_count(&handle), 2);
    assert_eq!(
        w.transport.calls(),
        vec![
            MembershipCall::Join(scope.clone()),
            MembershipCall::Leave(scope.clone()),
            MembershipCall::Join(scope)
        ]
    );
}

#[tokio::test]
async fn redelivered_event_is_applied_once() {
    let w = world();
    let scope = Scope::tournament(3);
    let handle = ResourceHandle::match_score("42").unwrap();
    w.api.respond(&handle, Ok(ServerSnapshot::new(5, score(0, 0))));
    let _subscription = w.client.subscribe(scope.clone(), [handle.clone()]).await;

    let event = push(
        &scope,
        &handle,
        6,
        PushBody::Delta(Delta::increment(["home_score"], 1)),
    );
    let subscriptions = w.client.subscriptions();
    subscriptions
        .handle_signal(TransportSignal::Event(event.clone()))
        .await;
    let once = w.client.state(&handle).unwrap();
    subscriptions
        .handle_signal(TransportSignal::Event(event))
        .await;

    assert_eq!(w.client.state(&handle).unwrap(), once);
    assert_eq!(once.payload, score(1, 0));
    assert_eq!(w.api.total_fetches(), 1);
}

#[tokio::test]
async fn versions_never_decrease_under_reordered_delivery() {
    let w = world();
    let scope = Scope::tournament(3);
    let handle = ResourceHandle::match_score("42").unwrap();
    w.api.respond(&handle, Ok(ServerSnapshot::new(1, score(0, 0))));
    let _subscription = w.client.subscribe(scope.clone(), [handle.clone()]).await;
    for version in [2, 3, 4, 5, 6] {
        w.api
            .respond(&handle, Ok(ServerSnapshot::new(version, score(0, 0))));
    }

    let subscriptions = w.client.subscriptions();
    let mut observed = Vec::new();
    for version in [2, 4, 3, 3, 6, 5, 2] {
        let payload = score(i64::try_from(version).unwrap(), 0);
        subscriptions
            .handle_signal(TransportSignal::Event(push(
                &scope,
                &handle,
                version,
                PushBody::Payload(payload),
            )))
            .await;
        observed.push(w.client.state(&handle).unwrap().version);
    }

    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn failed_reconcile_marks_resource_stale() {
    let w = world();
    let scope = Scope::tournament(3);
    let handle = ResourceHandle::match_score("42").unwrap();
    w.api.respond(&handle, Ok(ServerSnapshot::new(5, score(0, 0))));
    let _subscription = w.client.subscribe(scope.clone(), [handle.clone()]).await;

    // No scripted answers left: every refetch fails.
    let outcome = w.client.refresh(&handle).await;
    assert!(matches!(outcome, ReconcileOutcome::MarkedStale { .. }));
    let state = w.client.state(&handle).unwrap();
    assert_eq!(
        crate::projection::freshness(&state),
        crate::projection::Freshness::Stale
    );

    // The next successful push clears the mark.
    w.client
        .subscriptions()
        .handle_signal(TransportSignal::Event(push(
            &scope,
            &handle,
            6,
            PushBody::Payload(score(1, 0)),
        )))
        .await;
    assert!(!w.client.state(&handle).unwrap().is_stale());
}
