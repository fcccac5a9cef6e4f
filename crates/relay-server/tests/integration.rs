//! End-to-end tests over the assembled stack: loopback messaging client,
//! in-memory store, session registry, connection hub, and admission gate.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{BotId, OperatorId};
use relay_registry::{ClientEvent, ClientMessage, LoopbackClient, SessionRegistry};
use relay_server::{
    ConnectionGate, ConnectionHub, GateConfig, JwtVerifier, OperatorConnection, run_fanout,
};
use relay_store::{MemoryStore, SessionStatus, SessionStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Stack {
    client: Arc<LoopbackClient>,
    store: Arc<MemoryStore>,
    registry: Arc<SessionRegistry>,
    hub: Arc<ConnectionHub>,
    cancel: CancellationToken,
}

impl Stack {
    fn new() -> Self {
        let client = Arc::new(LoopbackClient::new());
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(client.clone(), store.clone(), 256));
        let hub = Arc::new(ConnectionHub::new(store.clone()));

        let cancel = CancellationToken::new();
        let _ = tokio::spawn(run_fanout(
            hub.clone(),
            registry.subscribe(),
            cancel.clone(),
        ));

        Self {
            client,
            store,
            registry,
            hub,
            cancel,
        }
    }

    async fn connect_operator(
        &self,
        operator: &str,
    ) -> (Arc<OperatorConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(64);
        let connection = Arc::new(OperatorConnection::new(OperatorId::from(operator), tx));
        let _ = self.hub.register(connection.clone()).await;
        (connection, rx)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn next_json(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
    let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed");
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn pairing_message_stop_scenario() {
    let stack = Stack::new();
    let bot = BotId::from("bot1");
    stack
        .store
        .set_owner(&bot, &OperatorId::from("op_a"))
        .unwrap();
    let (_conn, mut rx) = stack.connect_operator("op_a").await;

    // start → the loopback client pairs immediately.
    let _ = stack.registry.start(&bot, "s1").await.unwrap();
    let pairing = next_json(&mut rx).await;
    assert_eq!(pairing["type"], "pairing");
    assert_eq!(pairing["botId"], "bot1");
    assert_eq!(stack.registry.pairing_code(&bot).as_deref(), Some("LOOP-s1"));

    // A refreshed code replaces the previous one.
    let _ = stack
        .client
        .emit("s1", ClientEvent::PairingCode("QR123".into()))
        .await;
    let refreshed = next_json(&mut rx).await;
    assert_eq!(refreshed["data"]["code"], "QR123");
    assert_eq!(stack.registry.pairing_code(&bot).as_deref(), Some("QR123"));

    // Inbound message: logged, delivered, session is connected.
    let _ = stack
        .client
        .emit("s1", ClientEvent::Message(ClientMessage::received_text("hi")))
        .await;
    let message = next_json(&mut rx).await;
    assert_eq!(message["type"], "message");
    assert_eq!(message["data"]["body"], "hi");
    assert!(stack.registry.is_active(&bot));
    let log = stack.registry.event_log(&bot);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].body, "hi");

    // stop: pairing code gone, persisted record flipped, stop event fanned out.
    stack.registry.stop(&bot).await;
    assert!(!stack.registry.is_active(&bot));
    assert!(stack.registry.pairing_code(&bot).is_none());
    let stopped = next_json(&mut rx).await;
    assert_eq!(stopped["type"], "session.stopped");

    for _ in 0..100 {
        let record = stack.store.get_session(&bot).unwrap();
        if record
            .as_ref()
            .is_some_and(|r| r.status == SessionStatus::Inactive && r.pairing_code.is_none())
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("persisted record never flipped to inactive");
}

#[tokio::test]
async fn events_reach_only_the_owning_operator() {
    let stack = Stack::new();
    let bot_a = BotId::from("bot_a");
    let bot_b = BotId::from("bot_b");
    stack
        .store
        .set_owner(&bot_a, &OperatorId::from("op_a"))
        .unwrap();
    stack
        .store
        .set_owner(&bot_b, &OperatorId::from("op_b"))
        .unwrap();

    let (_conn_a, mut rx_a) = stack.connect_operator("op_a").await;
    let (_conn_b, mut rx_b) = stack.connect_operator("op_b").await;

    let _ = stack.registry.start(&bot_a, "sess_a").await.unwrap();
    let _ = stack.registry.start(&bot_b, "sess_b").await.unwrap();

    // Each operator sees only their own bot's pairing event.
    let a_event = next_json(&mut rx_a).await;
    assert_eq!(a_event["botId"], "bot_a");
    let b_event = next_json(&mut rx_b).await;
    assert_eq!(b_event["botId"], "bot_b");

    // Traffic on bot_a reaches operator A only, with B concurrently connected.
    let _ = stack
        .client
        .emit(
            "sess_a",
            ClientEvent::Message(ClientMessage::received_text("for A")),
        )
        .await;
    let delivered = next_json(&mut rx_a).await;
    assert_eq!(delivered["data"]["body"], "for A");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx_b.try_recv().is_err(), "operator B must not see A's traffic");
}

#[tokio::test]
async fn second_transport_for_same_operator_evicts_first() {
    let stack = Stack::new();
    let bot = BotId::from("bot_1");
    stack
        .store
        .set_owner(&bot, &OperatorId::from("op_a"))
        .unwrap();

    let (first, _rx_first) = stack.connect_operator("op_a").await;
    let (second, mut rx_second) = stack.connect_operator("op_a").await;

    assert!(first.cancel_token().is_cancelled());
    assert!(!second.cancel_token().is_cancelled());
    assert_eq!(stack.hub.connection_count().await, 1);

    // Events flow to the surviving (second) connection.
    let _ = stack.registry.start(&bot, "s1").await.unwrap();
    let event = next_json(&mut rx_second).await;
    assert_eq!(event["type"], "pairing");

    // The first connection's stale disconnect cannot evict the second.
    assert!(!stack.hub.unregister(&first).await);
    assert_eq!(stack.hub.connection_count().await, 1);
}

#[tokio::test]
async fn unowned_bot_events_are_never_broadcast() {
    let stack = Stack::new();
    let (_conn, mut rx) = stack.connect_operator("op_a").await;

    // No owner recorded for this bot.
    let _ = stack.registry.start(&BotId::from("stray"), "stray").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn admission_gate_scopes_identities_in_the_stack() {
    let gate = ConnectionGate::new(GateConfig::default());
    let flooder = OperatorId::from("flooder");
    let calm = OperatorId::from("calm");

    for _ in 0..5 {
        gate.check(&flooder).unwrap();
    }
    let err = gate.check(&flooder).unwrap_err();
    assert!(err.retry_after_secs() >= 1);
    assert!(gate.check(&calm).is_ok());
}

#[tokio::test]
async fn verifier_round_trips_operator_identity() {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use relay_server::{Claims, CredentialVerifier};

    let secret = b"integration-secret";
    let verifier = JwtVerifier::new(secret, Some("relay"));
    #[allow(clippy::cast_sign_loss)]
    let exp = (chrono::Utc::now().timestamp() + 600) as u64;
    let token = encode(
        &Header::default(),
        &Claims {
            sub: "op_42".into(),
            exp,
            iss: Some("relay".into()),
        },
        &EncodingKey::from_secret(secret),
    )
    .unwrap();

    assert_eq!(verifier.verify(&token).unwrap(), OperatorId::from("op_42"));
    assert!(verifier.verify("garbage").is_err());
}

#[tokio::test]
async fn concurrent_starts_share_one_external_session() {
    let stack = Stack::new();
    let bot = BotId::from("bot_1");

    let r1 = stack.registry.clone();
    let r2 = stack.registry.clone();
    let b1 = bot.clone();
    let b2 = bot.clone();
    let (a, b) = tokio::join!(
        async move { r1.start(&b1, "s1").await },
        async move { r2.start(&b2, "s1").await },
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(stack.client.connect_count(), 1);
}
