//! Concurrency properties: linearizable session creation, gap-free
//! per-session sequencing under concurrent load on one key, and the idle
//! sweep boundary.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use opsdesk_conversation_core::prelude::*;
use pretty_assertions::assert_eq;
use serial_test::serial;

#[tokio::test]
async fn test_get_or_create_is_linearizable_for_one_key() {
    let engine = Arc::new(
        ConversationEngine::builder()
            .with_config(fast_config())
            .with_ticketing_gateway(Arc::new(CountingGateway::new()))
            .with_ai_connector(Arc::new(EchoAi), 64)
            .build()
            .expect("Should build engine"),
    );

    let k = key("hot");
    let senders: Vec<_> = (0..32)
        .map(|i| {
            let engine = engine.clone();
            let k = k.clone();
            tokio::spawn(async move {
                engine
                    .handle_inbound(InboundEvent::message(k, format!("msg {}", i)))
                    .await
                    .expect("Should accept the event");
            })
        })
        .collect();
    for result in futures::future::join_all(senders).await {
        result.expect("Sender task should not panic");
    }

    // All 32 concurrent creators landed in one session
    assert_eq!(engine.session_count(), 1);
    assert!(engine.session_state(&k).is_some());
}

#[tokio::test]
async fn test_sequences_are_contiguous_under_concurrent_same_key_load() {
    let transcript: Arc<InMemoryTranscript> = Arc::new(InMemoryTranscript::new());
    let engine = Arc::new(
        ConversationEngine::builder()
            .with_config(fast_config())
            .with_transcript(transcript.clone())
            .with_ticketing_gateway(Arc::new(CountingGateway::new()))
            .with_ai_connector(Arc::new(EchoAi), 64)
            .build()
            .expect("Should build engine"),
    );

    let k = key("busy");
    let messages = 20usize;
    let senders: Vec<_> = (0..messages)
        .map(|i| {
            let engine = engine.clone();
            let k = k.clone();
            tokio::spawn(async move {
                engine
                    .handle_inbound(InboundEvent::message(k, format!("msg {}", i)))
                    .await
                    .expect("Should accept the event");
            })
        })
        .collect();
    for result in futures::future::join_all(senders).await {
        result.expect("Sender task should not panic");
    }

    // Every inbound gets an echo, so the transcript settles at 2 per message
    let expected = messages * 2;
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let history = transcript.history(&k).await.expect("Should fetch history");
            if history.len() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("All messages should be processed");

    let history = transcript.history(&k).await.expect("Should fetch history");

    // Contiguous from 1, no gaps, no duplicates
    let sequences: Vec<u64> = history.iter().map(|m| m.sequence).collect();
    let expected_sequences: Vec<u64> = (1..=expected as u64).collect();
    assert_eq!(sequences, expected_sequences);

    // Per-session serialization: each inbound is fully processed (echo
    // recorded) before the next inbound is accepted.
    for pair in history.chunks(2) {
        assert_eq!(pair[0].direction, MessageDirection::Inbound);
        assert_eq!(pair[1].direction, MessageDirection::Outbound);
        assert_eq!(pair[1].body, format!("echo: {}", pair[0].body));
    }
}

#[tokio::test]
async fn test_independent_sessions_run_in_parallel() {
    // A slow agent on one key must not stall another key's session.
    let transcript: Arc<InMemoryTranscript> = Arc::new(InMemoryTranscript::new());
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_transcript(transcript.clone())
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(SlowAi(Duration::from_secs(30))), 1)
        .with_ai_connector(Arc::new(EchoAi), 64)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let slow = key("slow");
    let fast = key("fast");

    // The single-capacity slow connector is registered first, so the first
    // session occupies it and blocks on its reply.
    engine
        .handle_inbound(InboundEvent::message(slow.clone(), "take your time"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { key, sequence: 1, .. } if *key == slow)
    })
    .await;

    engine
        .handle_inbound(InboundEvent::message(fast.clone(), "quick one"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { key, sequence: 2, .. } if *key == fast)
    })
    .await;

    let history = transcript.history(&fast).await.expect("Should fetch history");
    assert_eq!(history.len(), 2, "Fast session finished while slow one hung");
}

#[tokio::test]
#[serial]
async fn test_idle_sweep_honors_the_threshold_boundary() {
    let config = fast_config().with_idle_timeout(Duration::from_millis(200));
    let engine = ConversationEngine::builder()
        .with_config(config)
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(EchoAi), 8)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let stale = key("stale");
    let fresh = key("fresh");

    for (k, body) in [(&stale, "old"), (&fresh, "old too")] {
        engine
            .handle_inbound(InboundEvent::message(k.clone(), body))
            .await
            .expect("Should accept the event");
    }
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { key, sequence: 2, .. } if *key == fresh)
    })
    .await;

    tokio::time::sleep(Duration::from_millis(250)).await;

    // Activity one tick before the sweep keeps a session alive
    engine
        .handle_inbound(InboundEvent::message(fresh.clone(), "still here"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { key, sequence: 4, .. } if *key == fresh)
    })
    .await;

    engine.expire_idle_once();

    let closed = wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::SessionClosed { key, .. } if *key == stale)
    })
    .await;
    match closed {
        SessionNotice::SessionClosed { reason, .. } => {
            assert_eq!(reason, CloseReason::IdleTimeout)
        }
        _ => unreachable!(),
    }

    assert_eq!(
        engine.session_state(&fresh),
        Some(ConversationState::ActiveAi),
        "Recently active session must survive the sweep"
    );
    assert_eq!(engine.session_state(&stale), None);
}
