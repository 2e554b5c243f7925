//! Root configuration struct and its field defaults.

use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::runtime::GameMode;

const fn default_port() -> u16 {
    8080
}

fn default_experiment_id() -> String {
    "default".to_string()
}

const fn default_pyodide_load_timeout_s() -> u64 {
    60
}

const fn default_reconnection_grace_s() -> u64 {
    30
}

const fn default_waitroom_timeout_s() -> u64 {
    120
}

const fn default_max_server_rtt_ms() -> Option<u32> {
    None
}

const fn default_max_p2p_rtt_ms() -> Option<u32> {
    None
}

const fn default_probe_timeout_ms() -> u64 {
    10_000
}

/// Interval, measured in simulator ticks, between state broadcasts in the
/// server-authoritative runtime (see DESIGN.md's Open Question
/// resolution).
const fn default_state_broadcast_interval() -> u32 {
    1
}

const fn default_input_buffer_size() -> usize {
    8
}

const fn default_input_delay_frames() -> u32 {
    0
}

const fn default_tick_rate_fps() -> u32 {
    30
}

fn default_data_dir() -> String {
    "data".to_string()
}

const fn default_needs_pyodide() -> bool {
    false
}

const fn default_entry_screening() -> bool {
    false
}

/// What a scene does once activated. Which scenes exist and in what order
/// is the "experiment authoring" spec.md puts out of scope; this only
/// carries the structural knobs `GameManager` needs to stand up at
/// startup for a scene that happens to be a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneKind {
    /// Static content: the stager presents it and waits for
    /// `advance_scene`. No `GameManager` is created for it.
    Static,
    Game {
        group_size: usize,
        mode: GameMode,
        #[serde(default = "default_episodes_total")]
        episodes_total: u32,
        #[serde(default = "default_frame_confirmation_timeout_ms")]
        frame_confirmation_timeout_ms: u64,
    },
}

const fn default_episodes_total() -> u32 {
    1
}

const fn default_frame_confirmation_timeout_ms() -> u64 {
    5_000
}

/// One entry in the scripted scene sequence every new session gets
/// (spec.md §4.7's "per-subject ordered list of scenes").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDefinition {
    pub scene_id: String,
    #[serde(flatten)]
    pub kind: SceneKind,
}

fn default_scenes() -> Vec<SceneDefinition> {
    vec![SceneDefinition {
        scene_id: "main".to_string(),
        kind: SceneKind::Game {
            group_size: 2,
            mode: GameMode::Relay,
            episodes_total: default_episodes_total(),
            frame_confirmation_timeout_ms: default_frame_confirmation_timeout_ms(),
        },
    }]
}

/// Root configuration for the engine process.
///
/// Every field here maps to exactly one of spec.md's §6 configuration
/// knobs; none of them change wire-protocol identity, only runtime
/// behaviour (timeouts, thresholds, cadence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TCP port the HTTP/WebSocket listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Identifies this experiment run; used as a path component for
    /// persisted match logs and exports.
    #[serde(default = "default_experiment_id")]
    pub experiment_id: String,

    /// Deadline, in seconds, for both loading-gate signals to resolve
    /// after the first `experiment_config` is sent.
    #[serde(default = "default_pyodide_load_timeout_s")]
    pub pyodide_load_timeout_s: u64,

    /// How long a disconnected participant's session is kept alive,
    /// pending reconnection, before teardown runs.
    #[serde(default = "default_reconnection_grace_s")]
    pub reconnection_grace_s: u64,

    /// How long a `WaitingEntry` may sit unmatched before the waitroom
    /// timeout path fires for it.
    #[serde(default = "default_waitroom_timeout_s")]
    pub waitroom_timeout_s: u64,

    /// Matchmaker prefilter: candidates may only be paired if their
    /// summed measured RTT to the server is within this bound. `None`
    /// disables the filter (falls back to plain FIFO).
    #[serde(default = "default_max_server_rtt_ms")]
    pub max_server_rtt_ms: Option<u32>,

    /// Upper bound on measured peer-to-peer RTT a probe result may
    /// report before the pairing is rejected. `None` disables probing.
    #[serde(default = "default_max_p2p_rtt_ms")]
    pub max_p2p_rtt_ms: Option<u32>,

    /// How long the probe coordinator waits for a probe result before
    /// treating it as a timeout (a rejection).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Ticks between state broadcasts in the server-authoritative
    /// runtime (see DESIGN.md).
    #[serde(default = "default_state_broadcast_interval")]
    pub state_broadcast_interval: u32,

    /// Bounded-channel capacity for a seat's action queue (Rule L2).
    #[serde(default = "default_input_buffer_size")]
    pub input_buffer_size: usize,

    /// Number of ticks an action is delayed before being applied.
    #[serde(default = "default_input_delay_frames")]
    pub input_delay_frames: u32,

    /// Fixed tick rate of the server-authoritative runtime.
    #[serde(default = "default_tick_rate_fps")]
    pub tick_rate_fps: u32,

    /// Root directory for persisted match logs and exports.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// The scripted scene sequence every new session is given, and which
    /// of those scenes need a `GameManager`. Scene *content* is an
    /// external collaborator; this is only the structural shape the
    /// engine needs to wire itself up.
    #[serde(default = "default_scenes")]
    pub scenes: Vec<SceneDefinition>,

    /// Whether a connecting client must load a Pyodide runtime before the
    /// loading gate can resolve (sent back verbatim in `experiment_config`).
    #[serde(default = "default_needs_pyodide")]
    pub needs_pyodide: bool,

    /// Package list passed through to the client's Pyodide bootstrap.
    /// Opaque to the engine.
    #[serde(default)]
    pub pyodide_packages: Vec<String>,

    /// Whether the loading gate requires a `screening_result` signal at
    /// all, or resolves on the runtime signal alone.
    #[serde(default = "default_entry_screening")]
    pub entry_screening: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            experiment_id: default_experiment_id(),
            pyodide_load_timeout_s: default_pyodide_load_timeout_s(),
            reconnection_grace_s: default_reconnection_grace_s(),
            waitroom_timeout_s: default_waitroom_timeout_s(),
            max_server_rtt_ms: default_max_server_rtt_ms(),
            max_p2p_rtt_ms: default_max_p2p_rtt_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            state_broadcast_interval: default_state_broadcast_interval(),
            input_buffer_size: default_input_buffer_size(),
            input_delay_frames: default_input_delay_frames(),
            tick_rate_fps: default_tick_rate_fps(),
            data_dir: default_data_dir(),
            scenes: default_scenes(),
            needs_pyodide: default_needs_pyodide(),
            pyodide_packages: Vec::new(),
            entry_screening: default_entry_screening(),
            logging: LoggingConfig::default(),
        }
    }
}
