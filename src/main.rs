//! Minimal binary demonstrating `iotwire` usage.
//!
//! Connects to a device over TCP, sends one message and prints the reply to
//! requests.

mod cli;

use std::{error::Error, fs, time::Duration};

use clap::Parser;
use iotwire::{Expect, IotApp, Message, ProtocolConfig, TcpTransport};
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Outcome {
    Reply(Message),
    TimedOut,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = match &cli.config {
        Some(path) => ProtocolConfig::from_toml_str(&fs::read_to_string(path)?)?,
        None => ProtocolConfig::default(),
    };

    let mut message = if cli.request {
        Message::request(cli.path.as_str())
    } else {
        Message::signal(cli.path.as_str())
    };
    for header in &cli.headers {
        let (key, value) = header
            .split_once('=')
            .ok_or_else(|| format!("header `{header}` is not key=value"))?;
        message = message.with_header(key, value);
    }
    if let Some(body) = cli.body {
        message = message.with_body(body);
    }

    let app = IotApp::new(config);
    let session = app.listen(TcpTransport::connect(cli.connect.as_str()).await?);

    if !cli.request {
        session.send(message).await?;
        session.reset().await;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let timeout_tx = tx.clone();
    let expect = Expect::new()
        .on_response(move |reply| {
            let _ = tx.send(Outcome::Reply(reply));
        })
        .on_timeout(move |_| {
            let _ = timeout_tx.send(Outcome::TimedOut);
        });
    session.request(message, expect).await?;

    loop {
        app.poll().await;
        match rx.try_recv() {
            Ok(Outcome::Reply(reply)) => {
                let body = reply.body().map(|b| String::from_utf8_lossy(b).into_owned());
                println!("{} {}: {}", reply.method(), reply.id(), body.unwrap_or_default());
                break;
            }
            Ok(Outcome::TimedOut) => return Err("no response before the timeout".into()),
            Err(_) if app.is_empty() => return Err("connection lost".into()),
            Err(_) => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
    session.reset().await;
    Ok(())
}
