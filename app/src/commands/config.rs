use crate::state::AppState;
use anyhow::Context;

/// Effective configuration rendered as TOML.
pub fn show(state: &AppState) -> anyhow::Result<String> {
    toml::to_string_pretty(&state.config).context("failed to render configuration")
}

/// Config file path, noting when it does not exist yet.
pub fn path(state: &AppState) -> String {
    if state.config_path.exists() {
        state.config_path.display().to_string()
    } else {
        format!("{} (not created; defaults in effect)", state.config_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storescan_core::AppConfig;

    #[test]
    fn test_show_renders_sections() {
        let mut config = AppConfig::default();
        config.scanning.agents = 7;
        let state = AppState::with_config(config, "/nonexistent/config.toml");

        let rendered = show(&state).expect("render");
        assert!(rendered.contains("[scanning]"));
        assert!(rendered.contains("agents = 7"));

        let parsed: AppConfig = toml::from_str(&rendered).expect("parse back");
        assert_eq!(parsed.scanning.agents, 7);
    }

    #[test]
    fn test_path_marks_missing_file() {
        let state = AppState::with_config(AppConfig::default(), "/nonexistent/config.toml");
        assert!(path(&state).ends_with("(not created; defaults in effect)"));
    }
}
