//! Browser-side checks of the JavaScript surface. Run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use campaign_core::{Command, GamePhase, GameState, MatchEngine, RuleResolution};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn state_of(engine: &MatchEngine) -> GameState {
    let json = engine.state_json().expect("state should serialize");
    serde_json::from_str(&json).expect("state should parse")
}

#[wasm_bindgen_test]
fn engine_runs_commands_from_json() {
    let mut engine = MatchEngine::new(vec![0, 1], Some(r#"{"seed": 3}"#.to_string()), None)
        .expect("engine should build");
    engine.start().expect("match should start");
    assert_eq!(engine.next_player(), Some(0));

    let roll = serde_json::to_string(&Command::Roll { player: 0 }).expect("command should serialize");
    let resolution: RuleResolution =
        serde_json::from_str(&engine.submit_command_json(&roll).expect("roll should be accepted"))
            .expect("resolution should parse");
    assert!(!resolution.events.is_empty());
    assert!(engine.submit_command_json(&roll).is_err());
    assert_eq!(state_of(&engine).phase, GamePhase::Setup);
}

#[wasm_bindgen_test]
fn ai_moves_advance_the_match() {
    let mut engine = MatchEngine::new(vec![0, 1], None, None).expect("engine should build");
    engine.start().expect("match should start");
    for _ in 0..20 {
        if engine.next_player().is_none() {
            break;
        }
        engine
            .apply_ai_move(Some("easy".to_string()), None)
            .expect("ai move should be accepted");
    }
    assert!(state_of(&engine).integrity_check().is_ok());
}

#[wasm_bindgen_test]
fn replay_json_rebuilds_the_match() {
    let mut engine = MatchEngine::new(vec![0, 1, 2], None, None).expect("engine should build");
    engine.start().expect("match should start");
    for _ in 0..10 {
        engine.apply_ai_move(None, None).expect("ai move should be accepted");
    }
    let replay = engine.replay_json().expect("replay should serialize");
    let rebuilt = MatchEngine::from_replay(&replay, None).expect("replay should rebuild");
    assert_eq!(state_of(&rebuilt), state_of(&engine));
}
