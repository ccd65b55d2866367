//! Integration test for the Event Bus simulating the event sequence one tool-using turn would
//! emit (status -> text delta -> tool call created -> tool call completed -> status), verifying
//! registration-order delivery and that one misbehaving listener doesn't take down the others.

use agent_core::{Event, EventBus, EventKind};
use std::sync::{Arc, Mutex};

#[test]
fn test_listeners_receive_events_in_registration_order() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let log1 = log.clone();
    bus.on(EventKind::Status, move |e| {
        if let Event::Status { status, .. } = e {
            log1.lock().unwrap().push(format!("listener1:{status}"));
        }
    });
    let log2 = log.clone();
    bus.on(EventKind::Status, move |e| {
        if let Event::Status { status, .. } = e {
            log2.lock().unwrap().push(format!("listener2:{status}"));
        }
    });

    bus.emit(Event::Status { session_id: "s1".into(), status: "thinking".into() });

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["listener1:thinking", "listener2:thinking"]);
}

#[test]
fn test_panicking_listener_does_not_prevent_later_listeners_from_running() {
    let bus = EventBus::new();
    let ran = Arc::new(Mutex::new(false));

    bus.on(EventKind::TextDelta, |_e| {
        panic!("a buggy listener");
    });
    let ran2 = ran.clone();
    bus.on(EventKind::TextDelta, move |_e| {
        *ran2.lock().unwrap() = true;
    });

    bus.emit(Event::TextDelta { session_id: "s1".into(), delta: "hi".into() });
    assert!(*ran.lock().unwrap(), "second listener should still have run");
}

#[test]
fn test_simulated_tool_turn_emits_expected_kind_sequence() {
    let bus = EventBus::new();
    let kinds = Arc::new(Mutex::new(Vec::new()));

    for kind in [
        EventKind::Status,
        EventKind::TextDelta,
        EventKind::ToolCallCreated,
        EventKind::ToolCallCompleted,
    ] {
        let kinds = kinds.clone();
        bus.on(kind, move |e| kinds.lock().unwrap().push(e.kind()));
    }

    bus.emit(Event::Status { session_id: "s1".into(), status: "thinking".into() });
    bus.emit(Event::TextDelta { session_id: "s1".into(), delta: "I'll check the logs".into() });
    bus.emit(Event::ToolCallCreated { session_id: "s1".into(), call_id: "c1".into(), name: "grep".into() });
    bus.emit(Event::ToolCallCompleted { session_id: "s1".into(), call_id: "c1".into(), success: true });

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![EventKind::Status, EventKind::TextDelta, EventKind::ToolCallCreated, EventKind::ToolCallCompleted]
    );
}

#[test]
fn test_remove_all_listeners_for_one_kind_leaves_others_intact() {
    let bus = EventBus::new();
    let status_hits = Arc::new(Mutex::new(0));
    let aborted_hits = Arc::new(Mutex::new(0));

    let s = status_hits.clone();
    bus.on(EventKind::Status, move |_e| *s.lock().unwrap() += 1);
    let a = aborted_hits.clone();
    bus.on(EventKind::Aborted, move |_e| *a.lock().unwrap() += 1);

    bus.remove_all_listeners(Some(EventKind::Status));

    bus.emit(Event::Status { session_id: "s1".into(), status: "running".into() });
    bus.emit(Event::Aborted { session_id: "s1".into() });

    assert_eq!(*status_hits.lock().unwrap(), 0);
    assert_eq!(*aborted_hits.lock().unwrap(), 1);
}
