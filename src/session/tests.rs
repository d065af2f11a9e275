//! Unit tests for the synchronous session state machine.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use rstest::{fixture, rstest};

use super::*;

const CAPACITY: usize = 64;

#[fixture]
fn config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_default_capacity(CAPACITY)
        .with_response_timeout(Duration::from_millis(200))
        .with_alive_interval(Duration::from_secs(5))
        .with_multipart_timeout(Duration::from_millis(100))
}

#[fixture]
fn state(config: ProtocolConfig) -> SessionState {
    SessionState::new(ConnectionId::new(1), &config, Instant::now())
}

fn wire(message: &Message) -> Vec<u8> { codec::encode(message).expect("encodable").to_vec() }

fn dispatched(events: Vec<Inbound>) -> Vec<Message> {
    events
        .into_iter()
        .map(|event| match event {
            Inbound::Dispatch(message) => message,
            other => panic!("expected a dispatch, got {other:?}"),
        })
        .collect()
}

#[rstest]
fn single_frame_is_dispatched(mut state: SessionState) {
    let message = Message::signal("/led").with_body("on");
    let events = state.ingest(&wire(&message), Instant::now());
    let received = dispatched(events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path(), Some("/led"));
    assert_eq!(received[0].body().map(|b| &b[..]), Some(&b"on"[..]));
    assert_eq!(received[0].parts(), 1);
}

#[rstest]
fn byte_at_a_time_yields_the_same_message(mut state: SessionState) {
    let message = Message::request("/temp")
        .with_id(42)
        .with_header("unit", "C")
        .with_body("21.5");
    let now = Instant::now();
    let mut received = Vec::new();
    for byte in wire(&message) {
        received.extend(dispatched(state.ingest(&[byte], now)));
    }
    assert_eq!(received, vec![message]);
}

#[rstest]
fn back_to_back_frames_keep_their_order(mut state: SessionState) {
    let first = Message::signal("/a").with_body("1");
    let second = Message::signal("/b");
    let mut bytes = wire(&first);
    bytes.extend(wire(&second));
    let received = dispatched(state.ingest(&bytes, Instant::now()));
    assert_eq!(received, vec![first, second]);
}

#[rstest]
fn fragmented_body_is_reassembled(mut state: SessionState) {
    let body: Vec<u8> = (0..150u8).collect();
    let message = Message::request("/blob").with_id(9).with_body(body.clone());
    let frames = Fragmenter::new(NonZeroUsize::new(CAPACITY).expect("non-zero"))
        .fragment(&message)
        .expect("fragmentable");
    assert!(frames.len() > 1);

    let now = Instant::now();
    let mut received = Vec::new();
    for frame in &frames {
        received.extend(dispatched(state.ingest(frame, now)));
    }
    assert_eq!(received.len(), 1);
    let frame_len: usize = frames.iter().map(Bytes::len).sum();
    assert_eq!(received[0].parts(), frame_len.div_ceil(CAPACITY));
    assert_eq!(received[0].body().map(|b| &b[..]), Some(&body[..]));
    assert_eq!(state.reassembler.buffered_len(), 0);
}

#[rstest]
fn huge_declared_stream_length_is_buffered_lazily(mut state: SessionState) {
    let frame = [0x06, 0x11, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xAA];
    assert!(state.ingest(&frame, Instant::now()).is_empty());
    assert_eq!(state.reassembler.buffered_len(), 1);
    assert!(state.reassembler.reserved() < CAPACITY);
}

#[rstest]
fn peer_request_fragments_do_not_extend_our_pending_request(mut state: SessionState) {
    let start = Instant::now();
    state
        .correlation
        .register(Message::request("/ours").with_id(21), Expect::new(), start);

    let theirs = Message::request("/theirs").with_id(21).with_body(vec![0; 100]);
    let frames = Fragmenter::new(NonZeroUsize::new(CAPACITY).expect("non-zero"))
        .fragment(&theirs)
        .expect("fragmentable");
    let later = start + Duration::from_millis(150);
    state.ingest(&frames[0], start);
    for frame in &frames[1..] {
        state.ingest(frame, later);
    }

    let sweep = state.sweep(start + Duration::from_millis(200));
    assert_eq!(sweep.expired.len(), 1);
    assert_eq!(sweep.expired[0].id, 21);
}

#[rstest]
fn malformed_input_is_dropped_and_decoding_recovers(mut state: SessionState) {
    let now = Instant::now();
    assert!(state.ingest(&[0x04, 0xFC], now).is_empty());
    assert!(state.leftover.is_empty());

    let message = Message::signal("/ok");
    assert_eq!(dispatched(state.ingest(&wire(&message), now)), vec![message]);
}

#[rstest]
fn header_that_never_ends_is_discarded_at_capacity(mut state: SessionState) {
    let mut bytes = vec![0x05, 0x06];
    bytes.extend(std::iter::repeat_n(b'x', CAPACITY));
    assert!(state.ingest(&bytes, Instant::now()).is_empty());
    assert!(state.leftover.is_empty());
}

#[rstest]
fn stale_partial_header_is_discarded_by_sweep(mut state: SessionState) {
    let start = Instant::now();
    assert!(state.ingest(&[0x05], start).is_empty());
    assert_eq!(state.leftover.len(), 1);

    state.sweep(start + Duration::from_millis(50));
    assert_eq!(state.leftover.len(), 1);

    state.sweep(start + Duration::from_millis(100));
    assert!(state.leftover.is_empty());
}

#[rstest]
fn response_resolves_pending_request(mut state: SessionState) {
    let now = Instant::now();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let request = Message::request("/q").with_id(7);
    state.correlation.register(
        request.clone(),
        Expect::new().on_response(move |reply| {
            assert_eq!(reply.body().map(|b| &b[..]), Some(&b"42"[..]));
            seen.fetch_add(1, Ordering::SeqCst);
        }),
        now,
    );

    let reply = Message::response_to(&request).with_body("42");
    let mut events = state.ingest(&wire(&reply), now);
    assert_eq!(events.len(), 1);
    match events.remove(0) {
        Inbound::Resolved(resolved) => resolved.run(),
        other => panic!("expected a resolved reply, got {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(state.correlation.is_empty());
}

#[rstest]
fn unmatched_response_is_dropped(mut state: SessionState) {
    let reply = Message::new(Method::Response).with_id(300);
    assert!(state.ingest(&wire(&reply), Instant::now()).is_empty());
}

#[rstest]
fn peer_probe_asks_for_a_reply(mut state: SessionState) {
    let probe = Message::new(Method::AliveRequest).with_id(11);
    let events = state.ingest(&wire(&probe), Instant::now());
    assert!(matches!(events.as_slice(), [Inbound::AliveRequested(11)]));
}

#[rstest]
fn buffer_size_request_is_adopted(mut state: SessionState) {
    let events = state.ingest(&wire(&negotiation::buffer_size_request(512)), Instant::now());
    assert!(matches!(events.as_slice(), [Inbound::BufferSizeRequested(512)]));
    assert_eq!(state.outbound_capacity, 512);
    assert_eq!(state.inbound_capacity, 512);
}

#[rstest]
fn buffer_size_response_sets_outbound_capacity(mut state: SessionState) {
    let events = state.ingest(&wire(&negotiation::buffer_size_response(256)), Instant::now());
    assert!(events.is_empty());
    assert_eq!(state.outbound_capacity, 256);
}

#[rstest]
fn expired_probe_means_the_peer_is_lost(mut state: SessionState) {
    let now = Instant::now();
    state
        .correlation
        .register(Message::new(Method::AliveRequest).with_id(3), Expect::new(), now);
    state.alive.probe_sent(3, now);
    state
        .correlation
        .register(Message::request("/slow").with_id(4), Expect::new(), now);

    let sweep = state.sweep(now + Duration::from_millis(200));
    assert!(sweep.peer_lost);
    assert!(!sweep.probe_due);
    assert_eq!(sweep.expired.len(), 1);
    assert_eq!(sweep.expired[0].id, 4);
}

#[rstest]
fn probe_is_due_after_a_quiet_interval(mut state: SessionState) {
    let start = Instant::now();
    assert!(!state.sweep(start + Duration::from_secs(4)).probe_due);
    assert!(state.sweep(start + Duration::from_secs(5)).probe_due);
}

#[rstest]
fn inbound_traffic_postpones_the_probe(mut state: SessionState) {
    let start = Instant::now();
    let later = start + Duration::from_secs(3);
    state.ingest(&wire(&Message::signal("/tick")), later);
    assert!(!state.sweep(start + Duration::from_secs(5)).probe_due);
    assert!(state.sweep(later + Duration::from_secs(5)).probe_due);
}

#[rstest]
fn close_drops_everything(mut state: SessionState) {
    let now = Instant::now();
    state
        .correlation
        .register(Message::request("/q").with_id(5), Expect::new(), now);
    state.ingest(&[0x05], now);
    state.close(now);
    assert!(state.closed);
    assert!(state.correlation.is_empty());
    assert!(state.leftover.is_empty());
}
