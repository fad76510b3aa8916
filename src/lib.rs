pub mod ai;
pub mod game;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{legal_commands, next_actor, AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy};
pub use game::{
    sample_definitions, CardDefinitions, CardId, Command, CommandProcessor, GameEvent, GamePhase, GameState,
    IntegrityError, Match, MatchConfig, MatchError, MatchSnapshot, PlayerId, ReplayLog, RuleEngine, RuleError,
    RuleResolution, Submission, VictoryState,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn match_to_js_error(error: MatchError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn ai_config(difficulty: Option<String>, strategy: Option<String>) -> AiConfig {
    let difficulty = difficulty
        .as_deref()
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or(AiDifficulty::Normal);
    let mut config = AiConfig::from_difficulty(difficulty);
    if let Some(strategy) = strategy
        .as_deref()
        .and_then(|value| AiStrategy::from_str(value).ok())
    {
        config = config.with_strategy(strategy);
    }
    config
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

/// One local match exposed to JavaScript. Commands and results travel as JSON.
#[wasm_bindgen]
pub struct MatchEngine {
    game: Match,
    processor: CommandProcessor,
}

#[wasm_bindgen]
impl MatchEngine {
    /// Builds a match over `definitions_json`, or the sample catalog when
    /// omitted. `config_json` may list only the fields it overrides.
    #[wasm_bindgen(constructor)]
    pub fn new(
        players: Vec<u8>,
        config_json: Option<String>,
        definitions_json: Option<String>,
    ) -> Result<MatchEngine, JsValue> {
        let config = match config_json {
            Some(json) => MatchConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => MatchConfig::default(),
        };
        let definitions: CardDefinitions = match definitions_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => sample_definitions(),
        };
        let game = Match::new(&definitions, config, &players).map_err(match_to_js_error)?;
        let processor = CommandProcessor::local(&game);
        Ok(MatchEngine { game, processor })
    }

    /// Rebuilds a match by replaying a recorded log.
    #[wasm_bindgen(js_name = "fromReplay")]
    pub fn from_replay(replay_json: &str, definitions_json: Option<String>) -> Result<MatchEngine, JsValue> {
        let log = ReplayLog::from_json(replay_json).map_err(serde_to_js_error)?;
        let definitions: CardDefinitions = match definitions_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => sample_definitions(),
        };
        let game = Match::replay(&definitions, &log).map_err(match_to_js_error)?;
        let mut processor = CommandProcessor::local(&game);
        processor.adopt(log);
        Ok(MatchEngine { game, processor })
    }

    pub fn start(&mut self) -> Result<String, JsValue> {
        let events = self.game.start();
        make_resolution_json(self.game.resolution(events))
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.game.state()).map_err(serde_to_js_error)
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        self.game.snapshot().to_json().map_err(serde_to_js_error)
    }

    pub fn replay_json(&self) -> Result<String, JsValue> {
        self.processor.replay().to_json().map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "nextPlayer")]
    pub fn next_player(&self) -> Option<u8> {
        next_actor(self.game.state())
    }

    pub fn validate_command_json(&self, command_json: &str) -> Result<(), JsValue> {
        let command: Command = serde_json::from_str(command_json).map_err(serde_to_js_error)?;
        self.game.validate(&command).map_err(to_js_error)
    }

    pub fn submit_command_json(&mut self, command_json: &str) -> Result<String, JsValue> {
        let command: Command = serde_json::from_str(command_json).map_err(serde_to_js_error)?;
        let resolution = self.submit(command)?;
        make_resolution_json(resolution)
    }

    pub fn legal_commands_json(&self, player_id: u8) -> Result<String, JsValue> {
        let commands = legal_commands(self.game.engine(), self.game.state(), player_id);
        serde_json::to_string(&commands).map_err(serde_to_js_error)
    }

    pub fn apply_ai_move(&mut self, difficulty: Option<String>, strategy: Option<String>) -> Result<String, JsValue> {
        let Some(player) = next_actor(self.game.state()) else {
            return Err(to_js_error(RuleError::GameFinished));
        };
        let mut agent = AiAgent::new(ai_config(difficulty, strategy));
        let decision = agent
            .decide(self.game.engine(), self.game.state(), player)
            .ok_or_else(|| to_js_error(RuleError::NotPlayerTurn { player }))?;
        let applied = Some(self.submit(decision.command.clone())?);
        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// Decides for the waiting player now and resolves with the decision JSON
    /// once the think delay has passed. The decision is not applied.
    pub fn think_ai(&self, difficulty: Option<String>, strategy: Option<String>, delay_ms: Option<u32>) -> Promise {
        let config = ai_config(difficulty, strategy);
        let decision = next_actor(self.game.state()).and_then(|player| {
            AiAgent::new(config).decide(self.game.engine(), self.game.state(), player)
        });

        future_to_promise(async move {
            let Some(decision) = decision else {
                return Ok(JsValue::NULL);
            };
            let delay = delay_ms.unwrap_or(decision.think_delay_ms.min(u64::from(u32::MAX)) as u32);
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    fn submit(&mut self, command: Command) -> Result<RuleResolution, JsValue> {
        match self.processor.submit(&mut self.game, command) {
            Ok(Submission::Applied { events }) => Ok(self.game.resolution(events)),
            Ok(Submission::Queued { .. }) => Ok(self.game.resolution(Vec::new())),
            Err(error) => {
                web_sys::console::warn_1(&format!("command rejected: {error}").into());
                Err(to_js_error(error))
            }
        }
    }
}

/// The built-in sample catalog, for hosts without their own card data.
#[wasm_bindgen(js_name = "sampleDefinitions")]
pub fn sample_definitions_js() -> Result<JsValue, JsValue> {
    to_value(&sample_definitions()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
