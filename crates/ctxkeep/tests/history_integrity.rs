//! Message history driven the way an agent loop drives it: prompts, tool
//! calls, results, and periodic truncation.

use std::collections::HashSet;
use std::sync::Arc;

use ctxkeep::history::ensure_tool_call_integrity;
use ctxkeep::logging::{LogLevel, capture};
use ctxkeep::prelude::*;
use serde_json::json;

fn history(max_size: usize, keep_first: usize) -> MessageHistory {
    let counter: Arc<dyn TokenCounter> = Arc::new(CharRatioCounter::default());
    let strategy = AmortizedForgetting::new(counter, RetentionWindow::new(max_size, keep_first).unwrap());
    MessageHistory::new(Arc::new(strategy))
}

fn ids(turns: &[Turn]) -> (HashSet<String>, HashSet<String>) {
    let calls = turns
        .iter()
        .flatten()
        .filter_map(|b| b.tool_call_id().map(String::from))
        .collect();
    let results = turns
        .iter()
        .flatten()
        .filter_map(|b| b.result_call_id().map(String::from))
        .collect();
    (calls, results)
}

/// One agent round: the model asks for a tool, the tool answers.
fn tool_round(history: &mut MessageHistory, round: usize) {
    history
        .add_assistant_turn(vec![
            ContentBlock::result(format!("round {round}")),
            ContentBlock::tool_call(format!("call-{round}"), "grep", json!({"pattern": round})),
        ])
        .unwrap();
    let pending = history.pending_tool_calls();
    assert_eq!(pending.len(), 1);
    history
        .add_tool_call_result(&pending[0], format!("{round} matches"))
        .unwrap();
}

#[test]
fn every_truncation_leaves_calls_and_results_paired() {
    // keep_first 2 cuts between the first call and its result on every pass.
    let mut h = history(9, 2);
    h.add_user_prompt("find the bug", vec![]);
    for round in 0..50 {
        tool_round(&mut h, round);
        h.truncate();
        let (calls, results) = ids(h.turns());
        assert_eq!(calls, results, "unpaired ids after round {round}");
        assert!(h.len() <= 9);
    }
    assert_eq!(h.turns()[0], vec![ContentBlock::prompt("find the bug")]);
}

#[test]
fn split_pair_keeps_assistant_text() {
    let mut h = history(9, 2);
    h.add_user_prompt("go", vec![]);
    for round in 0..5 {
        tool_round(&mut h, round);
    }
    // 11 turns -> head 2 + tail 2; the head's assistant turn loses its call.
    h.truncate();
    assert_eq!(h.len(), 4);
    assert_eq!(h.turns()[1], vec![ContentBlock::result("round 0")]);
    let (calls, results) = ids(h.turns());
    assert_eq!(calls, HashSet::from(["call-4".to_string()]));
    assert_eq!(calls, results);
}

#[test]
fn extra_tool_calls_are_dropped_with_warning() {
    let mut h = history(100, 1);
    let (outcome, logs) = capture(|| {
        h.add_assistant_turn(vec![
            ContentBlock::tool_call("first", "ls", json!({})),
            ContentBlock::tool_call("second", "cat", json!({"path": "x"})),
        ])
    });
    assert!(outcome.is_ok());
    assert!(logs.contains(LogLevel::Warn, "Multiple tool calls in one turn"));
    let pending = h.pending_tool_calls();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "first");
}

#[test]
fn thinking_and_images_are_accepted_on_their_sides() {
    let mut h = history(100, 1);
    h.add_user_turn(vec![
        ContentBlock::image(ImageSource::base64("image/png", "iVBORw0KGgo=")),
        ContentBlock::prompt("what is this?"),
    ])
    .unwrap();
    h.add_assistant_turn(vec![
        ContentBlock::thinking("looks like a logo"),
        ContentBlock::redacted_thinking("opaque"),
        ContentBlock::result("A logo."),
    ])
    .unwrap();
    assert_eq!(h.last_assistant_text(), Some("A logo."));
    assert!(h.count_tokens() >= 1000);

    assert_eq!(
        h.add_user_turn(vec![ContentBlock::thinking("not mine")]),
        Err(HistoryError::InvalidUserBlock {
            kind: "VisibleThinking"
        })
    );
}

#[test]
fn conversation_json_round_trips_through_history() {
    let raw = json!([
        [{"type": "text_prompt", "text": "hi"}],
        [{"type": "text_result", "text": "calling"},
         {"type": "tool_call", "id": "c1", "name": "ls", "input": {}}],
        [{"type": "tool_result", "call_id": "c1", "name": "ls",
          "output": [{"type": "text", "text": "a.rs"}]}],
        [{"type": "citation", "url": "https://example.com"}]
    ]);
    let turns: Conversation = serde_json::from_value(raw).unwrap();
    assert_eq!(turns[3], vec![ContentBlock::Unknown]);

    let mut h = history(100, 1);
    h.set_turns(turns);
    assert_eq!(h.len(), 4);

    let printed: serde_json::Value = serde_json::from_str(&h.to_string()).unwrap();
    assert_eq!(printed[2][0]["output"][0]["text"], "a.rs");
}

#[test]
fn integrity_filter_is_stable() {
    let turns = vec![
        vec![ContentBlock::tool_call("a", "ls", json!({}))],
        vec![ContentBlock::tool_result("a", "ls", "ok")],
        vec![ContentBlock::tool_result("b", "ls", "stray")],
    ];
    let once = ensure_tool_call_integrity(turns);
    assert_eq!(once.len(), 2);
    assert_eq!(ensure_tool_call_integrity(once.clone()), once);
}

#[test]
fn rewind_after_truncation_never_reaches_the_head() {
    let mut h = history(10, 1);
    h.add_user_prompt("continue", vec![]);
    h.add_assistant_turn(vec![ContentBlock::result("working")]).unwrap();
    h.add_user_prompt("continue", vec![]);
    for round in 0..9 {
        h.add_assistant_turn(vec![ContentBlock::result(format!("step {round}"))])
            .unwrap();
    }
    h.truncate();
    let kept = h.turns().to_vec();
    h.rewind_to_last_user_prompt();
    assert_eq!(h.turns(), kept.as_slice());
}

#[test]
fn duplicate_results_collapse_to_one() {
    let turns = vec![
        vec![ContentBlock::tool_call("a", "ls", json!({}))],
        vec![ContentBlock::tool_result("a", "ls", "ok")],
        vec![ContentBlock::tool_result("a", "ls", "again")],
    ];
    let cleaned = ensure_tool_call_integrity(turns);
    let results = cleaned
        .iter()
        .flatten()
        .filter(|b| b.result_call_id() == Some("a"))
        .count();
    assert_eq!(results, 1);
}
