//! A separate, non-fatal sanity pass over a loaded [`EngineConfig`].

use super::EngineConfig;

/// Validate configuration invariants that the type system can't express
/// (e.g. `max_p2p_rtt_ms` is only meaningful alongside a probe
/// coordinator, zero timeouts would make every candidate time out
/// immediately). Returns an error describing the first problem found;
/// `loader::load()` only warns on this, `main.rs` propagates it.
pub fn validate_config(config: &EngineConfig) -> anyhow::Result<()> {
    if config.port == 0 {
        anyhow::bail!("port must be nonzero");
    }

    if config.pyodide_load_timeout_s == 0 {
        anyhow::bail!("pyodide_load_timeout_s must be nonzero");
    }

    if config.probe_timeout_ms == 0 {
        anyhow::bail!("probe_timeout_ms must be nonzero");
    }

    if config.tick_rate_fps == 0 {
        anyhow::bail!("tick_rate_fps must be nonzero");
    }

    if config.state_broadcast_interval == 0 {
        anyhow::bail!("state_broadcast_interval must be at least 1 tick");
    }

    if config.input_buffer_size == 0 {
        anyhow::bail!("input_buffer_size must be nonzero (Rule L2 requires a bounded channel with capacity)");
    }

    if config.scenes.is_empty() {
        anyhow::bail!("scenes must list at least one scene");
    }

    let mut seen = std::collections::HashSet::new();
    for scene in &config.scenes {
        if !seen.insert(scene.scene_id.as_str()) {
            anyhow::bail!("duplicate scene_id in scenes: {}", scene.scene_id);
        }
        if let super::types::SceneKind::Game { group_size, .. } = &scene.kind {
            if *group_size == 0 {
                anyhow::bail!("scene {} has group_size 0", scene.scene_id);
            }
        }
    }

    if let (Some(server_rtt), Some(p2p_rtt)) = (config.max_server_rtt_ms, config.max_p2p_rtt_ms) {
        if p2p_rtt > server_rtt * 2 {
            tracing::warn!(
                server_rtt,
                p2p_rtt,
                "max_p2p_rtt_ms is more than double max_server_rtt_ms; probe is unlikely to ever reject"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = EngineConfig::default();
        config.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_input_buffer_is_rejected() {
        let mut config = EngineConfig::default();
        config.input_buffer_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
