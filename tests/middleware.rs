//! Middleware chain ordering and dispatch through the poll loop.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use iotwire::{IotApp, Message, Method, Middleware, Next, Request};
use iotwire_testing::{Collector, MockTransport, decode_all, wire};
use rstest::rstest;

type Trace = Arc<Mutex<Vec<&'static str>>>;

struct Label {
    name: &'static str,
    trace: Trace,
    pass: bool,
}

#[async_trait]
impl Middleware for Label {
    async fn handle(&self, request: &mut Request, next: Next<'_>) {
        self.trace.lock().expect("trace poisoned").push(self.name);
        if self.pass {
            next.run(request).await;
        }
    }
}

fn label(name: &'static str, trace: &Trace, pass: bool) -> Label {
    Label {
        name,
        trace: Arc::clone(trace),
        pass,
    }
}

struct Responder;

#[async_trait]
impl Middleware for Responder {
    async fn handle(&self, request: &mut Request, next: Next<'_>) {
        if request.message().method() == Method::Request {
            let reply = Message::new(Method::Response).with_body("pong");
            request
                .session()
                .respond(request.message(), reply)
                .await
                .expect("reply");
            return;
        }
        next.run(request).await;
    }
}

struct Tagger;

#[async_trait]
impl Middleware for Tagger {
    async fn handle(&self, request: &mut Request, next: Next<'_>) {
        let tagged = request.message().clone().with_header("seen-by", "tagger");
        *request.message_mut() = tagged;
        next.run(request).await;
    }
}

#[rstest]
#[case(true, vec!["a", "b", "c"])]
#[case(false, vec!["a", "b"])]
#[tokio::test]
async fn chain_runs_in_order_until_short_circuit(
    #[case] b_passes: bool,
    #[case] expected: Vec<&'static str>,
) {
    let trace = Trace::default();
    let app = IotApp::default()
        .wrap(label("a", &trace, true))
        .wrap(label("b", &trace, b_passes))
        .wrap(label("c", &trace, true));
    let transport = MockTransport::new();
    app.listen(transport.clone());

    transport.push_inbound(&wire(&Message::signal("/led").with_body("on")));
    app.poll().await;

    assert_eq!(*trace.lock().expect("trace poisoned"), expected);
}

#[tokio::test]
async fn middleware_replies_through_the_session() {
    let app = IotApp::default().wrap(Responder);
    let transport = MockTransport::new();
    app.listen(transport.clone());

    transport.push_inbound(&wire(&Message::request("/ping").with_id(41)));
    app.poll().await;

    let written = decode_all(&transport.written_bytes());
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].method(), Method::Response);
    assert_eq!(written[0].id(), 41);
    assert_eq!(written[0].body().map(|b| &b[..]), Some(&b"pong"[..]));
}

#[tokio::test]
async fn changes_are_visible_downstream() {
    let collector = Collector::new();
    let app = IotApp::default().wrap(Tagger).wrap(collector.clone());
    let transport = MockTransport::new();
    app.listen(transport.clone());

    transport.push_inbound(&wire(&Message::signal("/door")));
    app.poll().await;

    let seen = collector.messages();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].header("seen-by"), Some("tagger"));
}

#[tokio::test]
async fn only_unsolicited_traffic_reaches_middleware() {
    let collector = Collector::new();
    let app = IotApp::default().wrap(collector.clone());
    let transport = MockTransport::new();
    app.listen(transport.clone());

    let mut bytes = wire(&Message::new(Method::Response).with_id(5));
    bytes.extend(wire(&Message::new(Method::AliveRequest).with_id(6)));
    bytes.extend(wire(&Message::streaming("/feed").with_id(7).with_body("x")));
    bytes.extend(wire(&Message::request("/q").with_id(8)));
    transport.push_inbound(&bytes);
    app.poll().await;

    let methods: Vec<Method> = collector.messages().iter().map(Message::method).collect();
    assert_eq!(methods, vec![Method::Streaming, Method::Request]);
}

#[tokio::test]
async fn empty_chain_drops_requests() {
    let app = IotApp::default();
    let transport = MockTransport::new();
    let session = app.listen(transport.clone());

    transport.push_inbound(&wire(&Message::request("/nobody").with_id(2)));
    app.poll().await;

    assert!(transport.written().is_empty());
    assert!(!session.is_closed().await);
}
