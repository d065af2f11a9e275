//! Log output for discarded input and expired requests.

use std::time::Duration;

use iotwire::{Expect, IotApp, Message, ProtocolConfig};
use iotwire_testing::{Level, LoggerHandle, MockTransport, logger, poll_for};
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn malformed_frame_is_logged_as_warning(mut logger: LoggerHandle) {
    let app = IotApp::default();
    let transport = MockTransport::new();
    app.listen(transport.clone());

    transport.push_inbound(&[0x04, 0xFC, 0x00]);
    app.poll().await;

    assert!(logger.contains(Level::Warn, "discarding malformed input"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn expired_request_is_logged_as_warning(mut logger: LoggerHandle) {
    let app = IotApp::new(ProtocolConfig::default().with_response_timeout(Duration::from_millis(200)));
    let transport = MockTransport::new();
    let session = app.listen(transport.clone());
    session
        .request(Message::request("/slow"), Expect::new())
        .await
        .expect("send");

    poll_for(&app, Duration::from_millis(200), Duration::from_millis(50)).await;

    assert!(logger.contains(Level::Warn, "request timed out"));
}
