//! Metrics emitted by the poll loop.
//!
//! Each test installs a `metrics_util::debugging::DebuggingRecorder` as the
//! thread-local recorder and drives the app on a current-thread runtime.

use std::future::Future;

use iotwire::{
    IotApp,
    Message,
    metrics::{CONNECTIONS_ACTIVE, ERRORS_TOTAL, FRAMES_PROCESSED},
};
use iotwire_testing::{MockTransport, wire};
use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
        .block_on(future)
}

type Snapshot = Vec<(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)>;

fn snapshot(snapshotter: &Snapshotter) -> Snapshot { snapshotter.snapshot().into_vec() }

fn counter(snapshot: &Snapshot, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key().labels().any(|l| l.key() == k && l.value() == v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}

fn gauge(snapshot: &Snapshot, name: &str) -> Option<f64> {
    snapshot
        .iter()
        .find(|(key, _, _, _)| key.key().name() == name)
        .and_then(|(_, _, _, value)| match value {
            DebugValue::Gauge(level) => Some(level.into_inner()),
            _ => None,
        })
}

#[test]
fn frames_are_counted_per_direction() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let app = IotApp::default();
            let transport = MockTransport::new();
            let session = app.listen(transport.clone());
            transport.push_inbound(&wire(&Message::signal("/in")));
            app.poll().await;
            session.send(Message::signal("/out")).await.expect("send");
        });
    });

    let recorded = snapshot(&snapshotter);
    assert_eq!(counter(&recorded, FRAMES_PROCESSED, Some(("direction", "inbound"))), 1);
    assert_eq!(counter(&recorded, FRAMES_PROCESSED, Some(("direction", "outbound"))), 1);
}

#[test]
fn malformed_input_is_counted_as_error() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let app = IotApp::default();
            let transport = MockTransport::new();
            app.listen(transport.clone());
            transport.push_inbound(&[0x04, 0xFC]);
            app.poll().await;
        });
    });

    let recorded = snapshot(&snapshotter);
    assert_eq!(counter(&recorded, ERRORS_TOTAL, Some(("kind", "malformed"))), 1);
}

#[test]
fn connection_gauge_follows_registration_and_loss() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let app = IotApp::default();
            let transport = MockTransport::new();
            app.listen(transport.clone());
            app.listen(MockTransport::new());
            transport.disconnect();
            app.poll().await;
        });
    });

    let recorded = snapshot(&snapshotter);
    assert_eq!(gauge(&recorded, CONNECTIONS_ACTIVE), Some(1.0));
}
