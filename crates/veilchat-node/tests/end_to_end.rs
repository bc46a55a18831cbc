//! Two full nodes against a real discovery service: register, find
//! each other, exchange an encrypted message, and check the stored log.

use std::time::Duration;

use tokio::sync::mpsc;
use veilchat_crypto::key::ChatKey;
use veilchat_directory::service::{DiscoveryService, ShutdownHandle};
use veilchat_node::node::ChatNode;
use veilchat_node::outgoing::SendOutcome;
use veilchat_storage::engine::StorageEngine;
use veilchat_storage::messages::MessageLog;
use veilchat_types::config::{DirectoryConfig, NodeConfig};
use veilchat_types::{NodeEvent, Result, Username, VeilchatError};

const WAIT: Duration = Duration::from_secs(15);

/// The handle must stay alive for the test's duration — dropping it
/// shuts the service down.
async fn start_directory() -> (String, u16, ShutdownHandle) {
    let config = DirectoryConfig {
        bind_host: "127.0.0.1".into(),
        bind_port: 0,
        ..DirectoryConfig::default()
    };
    let (service, shutdown) = DiscoveryService::bind(config).await.expect("bind directory");
    let addr = service.local_addr().expect("local addr");
    tokio::spawn(service.run());
    (addr.ip().to_string(), addr.port(), shutdown)
}

struct TestNode {
    _dir: tempfile::TempDir,
    node: ChatNode,
    log: MessageLog,
    events: mpsc::Receiver<NodeEvent>,
    username: Username,
}

/// Builds a node on an ephemeral port with a fast refresh cycle,
/// bound but not started.
async fn make_node(name: &str, directory_host: &str, directory_port: u16) -> TestNode {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = StorageEngine::open(dir.path()).expect("open engine");
    let log = engine.messages().expect("open log");

    let username: Username = name.parse().expect("valid username");
    let mut config = NodeConfig::new(
        username.clone(),
        directory_host,
        directory_port,
        "127.0.0.1",
        0,
    );
    config.keepalive_interval_secs = 1;
    config.mute_sweep_secs = 1;

    let mut node = ChatNode::new(config, log.clone()).expect("create node");
    node.bind().await.expect("bind node");
    let events = node.take_event_receiver().expect("event receiver");

    TestNode {
        _dir: dir,
        node,
        log,
        events,
        username,
    }
}

/// Drains events until one matches, or panics after the deadline.
async fn wait_for_event<F>(rx: &mut mpsc::Receiver<NodeEvent>, what: &str, mut matches: F) -> NodeEvent
where
    F: FnMut(&NodeEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = tokio::time::timeout(remaining, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .unwrap_or_else(|| panic!("event channel closed waiting for {what}"));
        if matches(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn message_flows_between_two_nodes() -> Result<()> {
    let (host, port, _shutdown) = start_directory().await;

    let mut alice = make_node("alice", &host, port).await;
    let mut bob = make_node("bob", &host, port).await;

    let key = ChatKey::generate();
    let convo_id = key.convo_id();
    alice.node.add_conversation(key.clone(), bob.username.clone())?;
    bob.node.add_conversation(key, alice.username.clone())?;

    alice.node.start()?;
    bob.node.start()?;

    // Bob's refresh loop must observe alice's registration before he
    // can resolve her address.
    wait_for_event(&mut bob.events, "snapshot with alice", |e| {
        matches!(e, NodeEvent::SnapshotApplied { peers } if *peers >= 1)
    })
    .await;

    let outcome = bob.node.send_message(&alice.username, "hi").await?;
    assert_eq!(outcome, SendOutcome::Sent);

    let received = wait_for_event(&mut alice.events, "message from bob", |e| {
        matches!(e, NodeEvent::MessageReceived { .. })
    })
    .await;
    match received {
        NodeEvent::MessageReceived {
            convo_id: received_convo,
            sender,
        } => {
            assert_eq!(received_convo, convo_id);
            assert_eq!(sender, bob.username);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Both sides hold the plaintext: bob as sender, alice as receiver.
    let alice_messages = alice.log.messages_for(&convo_id, 10, 0)?;
    assert_eq!(alice_messages.len(), 1);
    assert_eq!(alice_messages[0].sender, bob.username);
    assert_eq!(alice_messages[0].body, "hi");

    let bob_messages = bob.log.messages_for(&convo_id, 10, 0)?;
    assert_eq!(bob_messages.len(), 1);
    assert_eq!(bob_messages[0].sender, bob.username);
    assert_eq!(bob_messages[0].body, "hi");

    alice.node.shutdown().await?;
    bob.node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn muted_recipient_is_suppressed_quietly() -> Result<()> {
    let (host, port, _shutdown) = start_directory().await;

    let mut bob = make_node("bob", &host, port).await;
    let alice_user: Username = "alice".parse()?;

    let key = ChatKey::generate();
    let convo_id = key.convo_id();
    bob.node.add_conversation(key, alice_user.clone())?;
    bob.node.start()?;

    bob.node.mute(&alice_user, Duration::from_secs(3600));
    let outcome = bob.node.send_message(&alice_user, "you won't see this").await?;
    assert_eq!(outcome, SendOutcome::Suppressed);

    wait_for_event(&mut bob.events, "suppression event", |e| {
        matches!(e, NodeEvent::MessageSuppressed { recipient } if *recipient == alice_user)
    })
    .await;

    // Suppressed messages are never stored.
    assert_eq!(bob.log.count(&convo_id)?, 0);

    bob.node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn undiscovered_recipient_is_unreachable() -> Result<()> {
    let (host, port, _shutdown) = start_directory().await;

    let mut bob = make_node("bob", &host, port).await;
    let alice_user: Username = "alice".parse()?;

    let key = ChatKey::generate();
    bob.node.add_conversation(key, alice_user.clone())?;
    bob.node.start()?;

    // Alice never registered, so there is no address to resolve.
    let err = bob
        .node
        .send_message(&alice_user, "into the void")
        .await
        .unwrap_err();
    assert!(matches!(err, VeilchatError::UnreachablePeer { .. }));

    wait_for_event(&mut bob.events, "delivery failure event", |e| {
        matches!(e, NodeEvent::DeliveryFailed { recipient, .. } if *recipient == alice_user)
    })
    .await;

    bob.node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_conversation_frame_is_dropped() -> Result<()> {
    use tokio::io::AsyncWriteExt;
    use veilchat_crypto::aead::seal;
    use veilchat_proto::envelope::{MessageFrame, MessagePayload};

    let (host, port, _shutdown) = start_directory().await;

    let mut alice = make_node("alice", &host, port).await;
    let listen_addr = alice.node.local_addr().expect("listener addr");
    alice.node.start()?;

    // A well-formed frame under a key alice never registered.
    let stranger_key = ChatKey::generate();
    let convo_id = stranger_key.convo_id();
    let payload = MessagePayload {
        sender: "mallory".parse()?,
        body: b"let me in".to_vec(),
    };
    let ciphertext = seal(&stranger_key, &payload.encode(), &MessageFrame::aad(&convo_id))?;
    let frame = MessageFrame {
        convo_id,
        ciphertext,
    }
    .encode();

    let mut stream = tokio::net::TcpStream::connect(listen_addr)
        .await
        .expect("connect to listener");
    stream.write_all(&frame).await.expect("write frame");
    let _ = stream.shutdown().await;

    wait_for_event(&mut alice.events, "unrecognized-sender event", |e| {
        matches!(e, NodeEvent::UnrecognizedSender { .. })
    })
    .await;

    assert_eq!(alice.log.count(&convo_id)?, 0);

    alice.node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn tampered_frame_surfaces_integrity_event() -> Result<()> {
    use tokio::io::AsyncWriteExt;
    use veilchat_crypto::aead::seal;
    use veilchat_proto::envelope::{MessageFrame, MessagePayload};

    let (host, port, _shutdown) = start_directory().await;

    let mut alice = make_node("alice", &host, port).await;
    let listen_addr = alice.node.local_addr().expect("listener addr");

    let key = ChatKey::generate();
    let convo_id = key.convo_id();
    alice.node.add_conversation(key.clone(), "bob".parse()?)?;
    alice.node.start()?;

    // A frame for the known conversation with one ciphertext bit flipped.
    let payload = MessagePayload {
        sender: "bob".parse()?,
        body: b"hi".to_vec(),
    };
    let mut ciphertext = seal(&key, &payload.encode(), &MessageFrame::aad(&convo_id))?;
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0x01;
    let frame = MessageFrame {
        convo_id,
        ciphertext,
    }
    .encode();

    let mut stream = tokio::net::TcpStream::connect(listen_addr)
        .await
        .expect("connect to listener");
    stream.write_all(&frame).await.expect("write frame");
    let _ = stream.shutdown().await;

    let event = wait_for_event(&mut alice.events, "integrity-failure event", |e| {
        matches!(e, NodeEvent::IntegrityFailed { .. })
    })
    .await;
    match event {
        NodeEvent::IntegrityFailed {
            convo_id: failed_convo,
            ..
        } => assert_eq!(failed_convo, convo_id),
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(alice.log.count(&convo_id)?, 0);

    alice.node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn blocked_sender_is_dropped_on_receive() -> Result<()> {
    let (host, port, _shutdown) = start_directory().await;

    let mut alice = make_node("alice", &host, port).await;
    let mut bob = make_node("bob", &host, port).await;

    let key = ChatKey::generate();
    let convo_id = key.convo_id();
    alice.node.add_conversation(key.clone(), bob.username.clone())?;
    bob.node.add_conversation(key, alice.username.clone())?;

    alice.node.block(&bob.username);

    alice.node.start()?;
    bob.node.start()?;

    wait_for_event(&mut bob.events, "snapshot with alice", |e| {
        matches!(e, NodeEvent::SnapshotApplied { peers } if *peers >= 1)
    })
    .await;

    // Delivery succeeds on the wire; alice drops it at her gate.
    let outcome = bob.node.send_message(&alice.username, "hello?").await?;
    assert_eq!(outcome, SendOutcome::Sent);

    // Give the inbound path time to (not) store it.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(alice.log.count(&convo_id)?, 0);

    alice.node.shutdown().await?;
    bob.node.shutdown().await?;
    Ok(())
}
