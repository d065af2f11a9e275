//! Property tests for the frame codec.

use iotwire::{Message, Method, codec};
use proptest::prelude::*;

fn method() -> impl Strategy<Value = Method> {
    prop::sample::select(vec![
        Method::Signal,
        Method::Request,
        Method::Response,
        Method::Streaming,
    ])
}

prop_compose! {
    fn message()(
        method in method(),
        id in 1..=u16::MAX,
        path in proptest::option::of("/[a-z0-9/]{0,16}"),
        headers in prop::collection::vec(("[a-z]{1,8}", "[a-zA-Z0-9 .]{0,8}"), 0..4),
        body in proptest::option::of(prop::collection::vec(any::<u8>(), 0..200)),
    ) -> Message {
        let mut message = Message::new(method);
        if method.carries_id() {
            message = message.with_id(id);
        }
        if let Some(path) = path {
            message = message.with_path(path);
        }
        for (key, value) in headers {
            message = message.with_header(key, value);
        }
        if let Some(body) = body {
            message = message.with_body(body);
        }
        message
    }
}

proptest! {
    #[test]
    fn encoded_messages_decode_unchanged(message in message()) {
        let bytes = codec::encode(&message).expect("valid message");
        let frame = codec::decode(&bytes).expect("well formed").expect("whole frame");
        prop_assert_eq!(frame.consumed, bytes.len());
        prop_assert_eq!(frame.frame_len(), bytes.len());
        prop_assert_eq!(frame.message, message);
    }

    #[test]
    fn prefixes_are_never_malformed(message in message(), cut in any::<prop::sample::Index>()) {
        let bytes = codec::encode(&message).expect("valid message");
        let prefix = &bytes[..cut.index(bytes.len())];
        match codec::decode(prefix).expect("prefix of a valid frame") {
            None => {}
            Some(frame) => {
                prop_assert_eq!(frame.consumed, prefix.len());
                prop_assert_eq!(frame.message.total_body_length(), message.body_length());
                prop_assert!(!frame.message.is_complete());
            }
        }
    }
}
