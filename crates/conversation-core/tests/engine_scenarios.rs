//! End-to-end engine scenarios: a session is driven through the public
//! engine API only, and behavior is observed through the notice stream,
//! the transcript sink, and the recording channel adapter.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use opsdesk_conversation_core::prelude::*;

#[tokio::test]
async fn test_web_chat_message_reaches_active_ai_with_ordered_transcript() {
    // Scenario A: brand-new key, AI answers, transcript holds 2 ordered
    // messages.
    let transcript: Arc<InMemoryTranscript> = Arc::new(InMemoryTranscript::new());
    let adapter = Arc::new(RecordingAdapter::new(Channel::WebChat));
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_transcript(transcript.clone())
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(EchoAi), 8)
        .with_adapter(adapter.clone())
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let k = key("alice");
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "my laptop won't boot"))
        .await
        .expect("Should accept the event");

    wait_for(&mut notices, |n| {
        matches!(
            n,
            SessionNotice::MessageAccepted {
                sequence: 2,
                direction: MessageDirection::Outbound,
                ..
            }
        )
    })
    .await;

    assert_eq!(engine.session_state(&k), Some(ConversationState::ActiveAi));

    let history = transcript.history(&k).await.expect("Should fetch history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sequence, 1);
    assert_eq!(history[0].direction, MessageDirection::Inbound);
    assert_eq!(history[0].body, "my laptop won't boot");
    assert_eq!(history[1].sequence, 2);
    assert_eq!(history[1].direction, MessageDirection::Outbound);
    assert_eq!(history[1].body, "echo: my laptop won't boot");

    // Lookup by (key, sequence) for audit
    let second = transcript
        .lookup(&k, 2)
        .await
        .expect("Should look up")
        .expect("Should find the reply");
    assert_eq!(second.sender, MessageSender::AiAgent);

    // The reply also went out on the channel
    assert_eq!(adapter.bodies(), vec!["echo: my laptop won't boot"]);
}

#[tokio::test]
async fn test_escalation_queues_then_promotes_when_human_frees_up() {
    // Scenario B: AI escalates, no human free -> WaitingForHuman; once the
    // human is released back to the pool the session becomes ActiveHuman
    // without any new inbound event.
    let adapter = Arc::new(RecordingAdapter::new(Channel::WebChat));
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(EscalatingAi), 8)
        .with_adapter(adapter.clone())
        .build()
        .expect("Should build engine");
    engine.start();
    engine.register_human(Arc::new(HumanConsole));

    let mut notices = engine.subscribe();

    // First session takes the only human
    let first = key("first");
    engine
        .handle_inbound(InboundEvent::message(first.clone(), "urgent issue"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::StateChanged { key, to: ConversationState::ActiveHuman, .. } if *key == first)
    })
    .await;

    // Second session has to wait
    let second = key("second");
    engine
        .handle_inbound(InboundEvent::message(second.clone(), "me too"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::StateChanged { key, to: ConversationState::WaitingForHuman, .. } if *key == second)
    })
    .await;
    assert_eq!(
        engine.session_state(&second),
        Some(ConversationState::WaitingForHuman)
    );

    // The end user saw a waiting indication, not an error
    assert!(
        adapter
            .bodies()
            .iter()
            .any(|b| b.contains("human agent will be with you")),
        "Waiting notice should have been delivered"
    );

    // Closing the first session releases the human; the pool hands them to
    // the waiting session.
    engine.close_session(&first, CloseReason::EndUserRequest);
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::StateChanged { key, from: ConversationState::WaitingForHuman, to: ConversationState::ActiveHuman } if *key == second)
    })
    .await;
    assert_eq!(
        engine.session_state(&second),
        Some(ConversationState::ActiveHuman)
    );
}

#[tokio::test]
async fn test_ticketing_outage_degrades_to_pending_sync() {
    // Scenario C: the gateway rejects three consecutive attempts; the
    // session still escalates and the ticket is left PendingSync.
    let gateway = Arc::new(DownGateway::new());
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_ticketing_gateway(gateway.clone())
        .with_ai_connector(Arc::new(EscalatingAi), 8)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let k = key("carol");
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "broken printer"))
        .await
        .expect("Should accept the event");

    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::TicketPendingSync { key } if *key == k)
    })
    .await;
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::StateChanged { to: ConversationState::WaitingForHuman, .. })
    })
    .await;

    // Conversation kept flowing regardless of the outage
    assert_eq!(
        engine.session_state(&k),
        Some(ConversationState::WaitingForHuman)
    );
    assert_eq!(gateway.attempts.load(Ordering::SeqCst), 3);

    // The conversation still accepts messages while degraded
    tokio_test::assert_ok!(
        engine
            .handle_inbound(InboundEvent::message(k.clone(), "still there?"))
            .await
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(EchoAi), 8)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let k = key("dave");
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "hello"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { sequence: 2, .. })
    })
    .await;

    engine.close_session(&k, CloseReason::EndUserRequest);
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::SessionClosed { key, .. } if *key == k)
    })
    .await;

    // Second close: same observable state, no panic, no second notice
    engine.close_session(&k, CloseReason::EndUserRequest);
    // Closing an unknown key is also a no-op
    engine.close_session(&key("nobody"), CloseReason::EndUserRequest);

    tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            if engine.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Closed session should leave the registry");
    assert_eq!(engine.session_state(&k), None);
}

#[tokio::test]
async fn test_repeat_escalations_share_one_ticket() {
    // Two escalation signals in one session: exactly one open, the second
    // produces an update.
    let gateway = Arc::new(CountingGateway::new());
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_ticketing_gateway(gateway.clone())
        .with_ai_connector(Arc::new(EscalatingAi), 8)
        .build()
        .expect("Should build engine");
    engine.start();
    engine.register_human(Arc::new(HumanConsole));

    let mut notices = engine.subscribe();
    let k = key("erin");

    // First escalation comes from the AI
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "this is broken"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::TicketOpened { key, .. } if *key == k)
    })
    .await;
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::StateChanged { to: ConversationState::ActiveHuman, .. })
    })
    .await;

    // Second escalation is an explicit end-user request
    engine
        .handle_inbound(InboundEvent::escalate(k.clone(), "still unresolved"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::TicketUpdated { key } if *key == k)
    })
    .await;

    assert_eq!(gateway.opens.load(Ordering::SeqCst), 1, "Exactly one ticket");
    assert_eq!(gateway.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_cancels_inflight_agent_invocation() {
    let transcript: Arc<InMemoryTranscript> = Arc::new(InMemoryTranscript::new());
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_transcript(transcript.clone())
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(SlowAi(Duration::from_secs(30))), 8)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let k = key("frank");
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "are you there"))
        .await
        .expect("Should accept the event");
    // Let the worker reach the (slow) invocation
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { sequence: 1, .. })
    })
    .await;

    let started = std::time::Instant::now();
    engine.close_session(&k, CloseReason::EndUserRequest);
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::SessionClosed { key, .. } if *key == k)
    })
    .await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "Close must not wait out the agent invocation"
    );

    // The abandoned invocation's result was discarded, not recorded
    let history = transcript.history(&k).await.expect("Should fetch history");
    assert_eq!(history.len(), 1, "Only the inbound message is recorded");
}

#[tokio::test]
async fn test_unrecoverable_agent_error_surfaces_incident() {
    let transcript: Arc<InMemoryTranscript> = Arc::new(InMemoryTranscript::new());
    let gateway = Arc::new(CountingGateway::new());
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_transcript(transcript.clone())
        .with_ticketing_gateway(gateway.clone())
        .with_ai_connector(Arc::new(BrokenAi), 8)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let k = key("grace");
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "hello?"))
        .await
        .expect("Should accept the event");

    let incident = wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::Incident { key, .. } if *key == k)
    })
    .await;
    match incident {
        SessionNotice::Incident { detail, .. } => assert!(detail.contains("backend exploded")),
        _ => unreachable!(),
    }
    wait_for(&mut notices, |n| matches!(n, SessionNotice::SessionFailed { key } if *key == k)).await;

    // Incident ticket was opened and the transcript holds the record
    assert_eq!(gateway.opens.load(Ordering::SeqCst), 1);
    let history = transcript.history(&k).await.expect("Should fetch history");
    assert!(history
        .iter()
        .any(|m| m.body.contains("incident: unrecoverable agent error")));
}

#[tokio::test]
async fn test_explicit_phrase_triggers_escalation() {
    let engine = ConversationEngine::builder()
        .with_config(fast_config())
        .with_ticketing_gateway(Arc::new(CountingGateway::new()))
        .with_ai_connector(Arc::new(EchoAi), 8)
        .build()
        .expect("Should build engine");

    let mut notices = engine.subscribe();
    let k = key("henry");
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "hi"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::MessageAccepted { sequence: 2, .. })
    })
    .await;

    // The echo AI never escalates on its own; the phrase does it
    engine
        .handle_inbound(InboundEvent::message(k.clone(), "I want to talk to a human"))
        .await
        .expect("Should accept the event");
    wait_for(&mut notices, |n| {
        matches!(n, SessionNotice::StateChanged { to: ConversationState::WaitingForHuman, .. })
    })
    .await;

    assert_eq!(
        engine.session_state(&k),
        Some(ConversationState::WaitingForHuman)
    );
}
