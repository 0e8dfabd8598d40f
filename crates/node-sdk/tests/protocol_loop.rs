//! Integration test: runs a full session over the in-memory transport, with
//! the test playing the orchestrator on the other side of the broker.
//!
//! Covered here:
//! - connect announce and subscriptions
//! - messages from other senders are dropped
//! - config delivery caches, publishes parameter docs once, calls `on_config`
//! - `command` routing with default value and unit
//! - `query` / `status` for one node and for `"all"`
//! - broker disconnect clears the connected flag
//! - shutdown waits for running handlers
//! - a blocked handler does not hold up later messages

use std::sync::Arc;
use std::time::Duration;

use pg_node_sdk::transport::memory::{self, MemoryBroker, MemoryTransport};
use pg_node_sdk::{
    CancellationToken, CommandContext, Interface, InterfaceError, Namespace, NodeServer,
    SessionManager, Settings,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

const PROFILE: u32 = 7;
const WAIT: Duration = Duration::from_secs(2);

// ── Test node server: reports every callback on a channel ───────────────

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Start,
    Config(Value),
    ShortPoll,
    LongPoll,
    Command { cmd: String, value: String, uom: i32 },
}

struct Recorder {
    tx: mpsc::UnboundedSender<Seen>,
    /// When set, `short_poll` parks until notified.
    gate: Option<Arc<Notify>>,
}

#[async_trait::async_trait]
impl NodeServer for Recorder {
    async fn start(&self, iface: Interface) {
        let ctl = iface.alloc_node("controller", "ctl", "ctl", "Controller");
        ctl.add_driver("ST", "1", 2);
        let tx = self.tx.clone();
        ctl.add_command("DON", move |ctx: CommandContext| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(Seen::Command {
                    cmd: ctx.cmd,
                    value: ctx.value,
                    uom: ctx.uom,
                });
            }
        });
        iface.add_node(&ctl);

        let child = iface.alloc_node("dimmer", "ctl", "child", "Dimmer");
        child.add_driver("ST", "0", 51);
        iface.add_node(&child);

        let _ = self.tx.send(Seen::Start);
    }

    async fn on_config(&self, _iface: Interface, config: Value) {
        let _ = self.tx.send(Seen::Config(config));
    }

    async fn short_poll(&self, _iface: Interface) {
        match &self.gate {
            Some(gate) => gate.notified().await,
            None => tokio::time::sleep(Duration::from_millis(50)).await,
        }
        let _ = self.tx.send(Seen::ShortPoll);
    }

    async fn long_poll(&self, _iface: Interface) {
        let _ = self.tx.send(Seen::LongPoll);
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

struct Harness {
    transport: MemoryTransport,
    broker: MemoryBroker,
    iface: Interface,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), InterfaceError>>,
    seen: mpsc::UnboundedReceiver<Seen>,
    _doc_dir: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(None).await
    }

    async fn start_with(gate: Option<Arc<Notify>>) -> Self {
        let doc_dir = tempfile::tempdir().unwrap();
        let doc_path = doc_dir.path().join("POLYGLOT_CONFIG.md");
        std::fs::write(&doc_path, "## Parameters\n\n- `host`: device address\n").unwrap();

        let settings = Settings {
            profile: PROFILE,
            doc_path,
            drain_timeout_ms: 2_000,
            ..Settings::default()
        };
        let transport = MemoryTransport::new();
        let manager = SessionManager::new(&settings, Arc::new(transport.clone()));
        let iface = manager.interface();

        let (tx, seen) = mpsc::unbounded_channel();
        let (broker, events) = memory::channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(manager.run(
            events,
            Arc::new(Recorder { tx, gate }),
            shutdown.clone(),
        ));

        broker.connect();
        assert!(transport.wait_for("connected", 1, WAIT).await, "no connect announce");

        Self {
            transport,
            broker,
            iface,
            shutdown,
            task,
            seen,
            _doc_dir: doc_dir,
        }
    }

    fn send(&self, body: Value) {
        self.broker.from_orchestrator(PROFILE, body);
    }

    async fn next(&mut self) -> Seen {
        tokio::time::timeout(WAIT, self.seen.recv())
            .await
            .expect("callback within timeout")
            .expect("recorder alive")
    }

    /// Deliver `connected` and wait for the server to register its nodes.
    async fn start_nodes(&mut self) {
        self.send(json!({"connected": true}));
        assert_eq!(self.next().await, Seen::Start);
        assert!(self.transport.wait_for("addnode", 2, WAIT).await);
    }

    async fn stop(self) -> (Result<(), InterfaceError>, mpsc::UnboundedReceiver<Seen>) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(WAIT, self.task)
            .await
            .expect("session stops")
            .expect("session task did not panic");
        (result, self.seen)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_subscribes_and_announces() {
    let h = Harness::start().await;

    assert!(h.iface.is_connected());
    assert_eq!(
        h.transport.subscriptions(),
        vec!["udi/polyglot/connections/polyglot", "udi/polyglot/ns/7"]
    );
    let first = &h.transport.published()[0];
    assert_eq!(first.topic, "udi/polyglot/connections/7");
    assert_eq!(first.message, json!({"node": "7", "connected": true}));

    let (result, _) = h.stop().await;
    assert!(matches!(result, Err(InterfaceError::Shutdown)));
}

#[tokio::test]
async fn foreign_sender_is_dropped() {
    let mut h = Harness::start().await;

    h.broker.deliver(
        &pg_protocol::input_topic(PROFILE),
        &json!({"node": "12", "shortPoll": {}}),
    );
    h.broker
        .deliver_raw(&pg_protocol::input_topic(PROFILE), b"not json at all");
    h.send(json!({"shortPoll": {}}));
    assert_eq!(h.next().await, Seen::ShortPoll);

    let (_, mut seen) = h.stop().await;
    assert!(seen.try_recv().is_err(), "foreign poll must not run");
}

#[tokio::test]
async fn config_twice_publishes_doc_once() {
    let mut h = Harness::start().await;

    let first = json!({"customParams": {"host": "10.0.0.2"}});
    let second = json!({"customParams": {"host": "10.0.0.3"}, "notices": {"n": "hi"}});
    h.send(json!({"config": first}));
    h.send(json!({"config": second}));

    let mut got = vec![h.next().await, h.next().await];
    got.sort_by_key(|s| format!("{s:?}"));
    let mut want = vec![Seen::Config(first), Seen::Config(second.clone())];
    want.sort_by_key(|s| format!("{s:?}"));
    assert_eq!(got, want);

    assert_eq!(h.iface.config(), Some(second));
    assert_eq!(
        h.iface.params().get_one(Namespace::Parameters, "host").as_deref(),
        Some("10.0.0.3")
    );

    let docs = h.transport.published_of("customparamsdoc");
    assert_eq!(docs.len(), 1);
    assert!(docs[0].as_str().unwrap().contains("<h2>Parameters</h2>"));

    h.stop().await;
}

#[tokio::test]
async fn command_without_value_uses_defaults() {
    let mut h = Harness::start().await;
    h.start_nodes().await;

    h.send(json!({"command": {"address": "ctl", "cmd": "DON"}}));
    assert_eq!(
        h.next().await,
        Seen::Command {
            cmd: "DON".into(),
            value: String::new(),
            uom: 0
        }
    );

    h.send(json!({"command": {"address": "ctl", "cmd": "DON", "value": 75, "uom": "51"}}));
    assert_eq!(
        h.next().await,
        Seen::Command {
            cmd: "DON".into(),
            value: "75".into(),
            uom: 51
        }
    );

    // Unknown node and unknown command are ignored.
    h.send(json!({"command": {"address": "ghost", "cmd": "DON"}}));
    h.send(json!({"command": {"address": "child", "cmd": "DON"}}));

    let (_, mut seen) = h.stop().await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn status_all_versus_single() {
    let mut h = Harness::start().await;
    h.start_nodes().await;
    h.transport.clear();

    h.send(json!({"status": {"address": "all"}}));
    assert!(h.transport.wait_for("status", 2, WAIT).await);
    let addrs: Vec<_> = h
        .transport
        .published_of("status")
        .into_iter()
        .map(|s| s["address"].clone())
        .collect();
    assert_eq!(addrs, vec![json!("ctl"), json!("child")]);

    h.transport.clear();
    h.send(json!({"query": {"address": "child"}}));
    assert!(h.transport.wait_for("status", 1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.transport.published_of("status"),
        vec![json!({"address": "child", "driver": "ST", "value": "0", "uom": 51})]
    );

    h.stop().await;
}

#[tokio::test]
async fn broker_disconnect_clears_flag() {
    let h = Harness::start().await;
    assert!(h.iface.is_connected());

    h.broker.disconnect("keep-alive timeout");
    let cleared = tokio::time::timeout(WAIT, async {
        while h.iface.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(cleared.is_ok());

    // The adapter reconnected underneath us: announce again.
    h.broker.connect();
    assert!(h.transport.wait_for("connected", 2, WAIT).await);
    assert!(h.iface.is_connected());

    h.stop().await;
}

#[tokio::test]
async fn shutdown_waits_for_running_handlers() {
    let mut h = Harness::start().await;

    h.send(json!({"shortPoll": {}}));
    // Let the dispatcher pick it up before cancelling.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let iface = h.iface.clone();
    let (result, mut seen) = h.stop().await;
    assert!(matches!(result, Err(InterfaceError::Shutdown)));
    assert_eq!(seen.try_recv().ok(), Some(Seen::ShortPoll));
    assert!(!iface.is_connected());
}

#[tokio::test]
async fn blocked_handler_does_not_hold_up_later_messages() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::start_with(Some(gate.clone())).await;
    h.start_nodes().await;

    h.send(json!({"shortPoll": {}}));
    h.send(json!({"longPoll": {}}));
    h.send(json!({"command": {"address": "ctl", "cmd": "DON"}}));

    let mut early = vec![h.next().await, h.next().await];
    early.sort_by_key(|s| format!("{s:?}"));
    assert_eq!(
        early,
        vec![
            Seen::Command {
                cmd: "DON".into(),
                value: String::new(),
                uom: 0
            },
            Seen::LongPoll,
        ]
    );
    assert!(h.seen.try_recv().is_err(), "short poll is still parked");

    gate.notify_one();
    assert_eq!(h.next().await, Seen::ShortPoll);

    h.stop().await;
}

#[tokio::test]
async fn refused_connection_is_fatal() {
    let transport = MemoryTransport::new();
    let settings = Settings {
        profile: PROFILE,
        ..Settings::default()
    };
    let manager = SessionManager::new(&settings, Arc::new(transport.clone()));
    let (broker, events) = memory::channel();
    broker.disconnect("connection refused");

    let (tx, _rx) = mpsc::unbounded_channel();
    let server = Arc::new(Recorder { tx, gate: None });
    let err = manager
        .run(events, server, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), -1);
    assert!(transport.subscriptions().is_empty());
}
