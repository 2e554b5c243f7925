#![cfg_attr(not(test), deny(clippy::panic))]

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use clap::Parser;
use uuid::Uuid;

use scene_engine::config;
use scene_engine::engine::{Engine, EnvironmentFactories};
use scene_engine::ids::SubjectId;
use scene_engine::logging;
use scene_engine::probe::ProbeOracle;
use scene_engine::protocol::ServerMessage;
use scene_engine::websocket;

/// Session, matchmaking, and game-lifecycle engine for browser-based
/// multi-participant experiments.
#[derive(Parser, Debug)]
#[command(name = "scene-engine")]
#[command(about = "Session, matchmaking, and game-lifecycle engine")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,

    /// Comma-separated CORS origins, or "*" to allow any.
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    cors_origins: String,
}

/// Probes are run over the wire: `probe_start` goes out to both subjects'
/// live connections, and their `probe_report` replies feed back into
/// `ProbeCoordinator::report_result` via `Engine::probe_report`. The
/// oracle needs a connection-id lookup that only exists once the engine
/// itself is built, so it's handed an empty cell here and bound right
/// after `Engine::new` returns.
struct WebsocketProbeOracle {
    engine: OnceLock<Arc<Engine>>,
}

impl WebsocketProbeOracle {
    fn new() -> Arc<Self> {
        Arc::new(Self { engine: OnceLock::new() })
    }

    fn bind(&self, engine: Arc<Engine>) {
        let _ = self.engine.set(engine);
    }
}

#[async_trait]
impl ProbeOracle for WebsocketProbeOracle {
    async fn start_probe(&self, handle: Uuid, subject_a: SubjectId, subject_b: SubjectId) {
        let Some(engine) = self.engine.get() else {
            tracing::warn!("probe oracle used before engine was bound, dropping probe");
            return;
        };

        for (subject, peer) in [(subject_a, subject_b), (subject_b, subject_a)] {
            if let Some(connection_id) = engine.connection_for_subject(subject) {
                engine
                    .transport()
                    .send(connection_id, ServerMessage::ProbeStart { handle, peer_subject_id: peer })
                    .await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg).map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Experiment id: {}", cfg.experiment_id);
                println!("  Scenes: {}", cfg.scenes.len());
                println!("  Entry screening: {}", cfg.entry_screening);
                println!("  Max p2p RTT (ms): {:?}", cfg.max_p2p_rtt_ms);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    let port = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let oracle = WebsocketProbeOracle::new();
    let probe_oracle: Option<Arc<dyn ProbeOracle>> = if cfg.max_p2p_rtt_ms.is_some() {
        Some(oracle.clone() as Arc<dyn ProbeOracle>)
    } else {
        None
    };

    // No scene in the bundled default configuration is server-authoritative
    // (see config::types::default_scenes); an operator who configures one
    // must ship their own `SimulationEnvironment` and wire it in here.
    let environment_factories: EnvironmentFactories = EnvironmentFactories::new();

    let engine = Engine::new(cfg, probe_oracle, environment_factories)?;
    oracle.bind(engine.clone());

    tracing::info!(%addr, "starting scene engine");
    websocket::run_server(addr, engine, &cli.cors_origins).await
}
