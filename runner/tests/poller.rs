//! Poll loop behavior

mod common;

use std::time::Duration;

use common::*;
use deployr_runner::models::job::JobStatus;
use deployr_runner::storage::layout::StorageLayout;
use deployr_runner::workers::poller::{self, poll_once, Cycle};

fn harness(control_plane: FakeControlPlane) -> Harness {
    Harness::new(
        control_plane,
        ScriptedExecutor::succeeding(),
        FakeConnector::new(remote_host(true, "missing")),
        StorageLayout::new("/nonexistent/deployr-work"),
    )
}

#[tokio::test]
async fn idle_cycle_sends_heartbeat() {
    let h = harness(FakeControlPlane::new());

    let cycle = poll_once(h.control_plane.as_ref(), &h.controller()).await;
    assert_eq!(cycle, Cycle::Idle);
    assert_eq!(h.control_plane.calls(), vec![Call::Poll, Call::Heartbeat]);
}

#[tokio::test]
async fn job_is_processed_before_heartbeat() {
    let control_plane = FakeControlPlane::new();
    control_plane.push_job(remote_job(5, "main"));
    let h = harness(control_plane);

    let cycle = poll_once(h.control_plane.as_ref(), &h.controller()).await;
    assert_eq!(cycle, Cycle::Processed);

    let calls = h.control_plane.calls();
    assert_eq!(calls.first(), Some(&Call::Poll));
    assert_eq!(calls.last(), Some(&Call::Heartbeat));
    assert!(matches!(calls[calls.len() - 2], Call::Status(5, JobStatus::Completed, _)));
}

#[tokio::test]
async fn claim_failure_keeps_polling() {
    let mut control_plane = FakeControlPlane::new();
    control_plane.fail_claim = true;
    control_plane.push_job(remote_job(6, "main"));
    let h = harness(control_plane);

    let cycle = poll_once(h.control_plane.as_ref(), &h.controller()).await;
    assert_eq!(cycle, Cycle::Processed);
    assert!(h.control_plane.statuses().is_empty());
    assert_eq!(h.control_plane.heartbeats(), 1);
}

#[tokio::test]
async fn poll_failure_still_sends_heartbeat() {
    let mut control_plane = FakeControlPlane::new();
    control_plane.fail_poll = true;
    let h = harness(control_plane);

    let cycle = poll_once(h.control_plane.as_ref(), &h.controller()).await;
    assert_eq!(cycle, Cycle::PollFailed);
    assert_eq!(h.control_plane.heartbeats(), 1);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let h = harness(FakeControlPlane::new());
    let options = poller::Options {
        interval: Duration::from_secs(3600),
        ..Default::default()
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        poller::run(
            &options,
            h.control_plane.clone(),
            h.controller(),
            tokio::time::sleep,
            Box::pin(async {}),
        ),
    )
    .await
    .unwrap();

    // only the startup heartbeat, no poll
    assert_eq!(h.control_plane.calls(), vec![Call::Heartbeat]);
}

#[tokio::test]
async fn run_polls_every_interval() {
    let control_plane = FakeControlPlane::new();
    control_plane.push_job(remote_job(8, "main"));
    let h = harness(control_plane);
    let options = poller::Options {
        interval: Duration::from_millis(10),
        ..Default::default()
    };

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let cp = h.control_plane.clone();
    let controller = h.controller();
    let worker = tokio::spawn(async move {
        poller::run(
            &options,
            cp,
            controller,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = rx.await;
            }),
        )
        .await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();
    worker.await.unwrap();

    let polls = h.control_plane.calls().iter().filter(|c| **c == Call::Poll).count();
    assert!(polls >= 2, "polled {} times", polls);
    assert_eq!(h.control_plane.statuses().len(), 1);
}
