use rand::Rng;

/// Browser identity presented by every tab of a run
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl FingerprintConfig {
    /// Pick a common desktop user agent at random
    pub fn randomized(viewport_width: u32, viewport_height: u32) -> Self {
        let mut rng = rand::thread_rng();

        let user_agents = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ];

        let ua_idx = rng.gen_range(0..user_agents.len());

        Self {
            user_agent: user_agents[ua_idx].to_string(),
            viewport_width,
            viewport_height,
        }
    }

    /// Use the configured user agent, falling back to a random one
    pub fn from_settings(
        user_agent: Option<&str>,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Self {
        match user_agent {
            Some(ua) if !ua.trim().is_empty() => Self {
                user_agent: ua.to_string(),
                viewport_width,
                viewport_height,
            },
            _ => Self::randomized(viewport_width, viewport_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_fingerprint() {
        let config = FingerprintConfig::randomized(1920, 1080);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert_eq!(config.viewport_width, 1920);
        assert_eq!(config.viewport_height, 1080);
    }

    #[test]
    fn test_configured_user_agent_wins() {
        let config = FingerprintConfig::from_settings(Some("storescan-test/1.0"), 800, 600);
        assert_eq!(config.user_agent, "storescan-test/1.0");

        let blank = FingerprintConfig::from_settings(Some("  "), 800, 600);
        assert!(blank.user_agent.starts_with("Mozilla/5.0"));
    }
}
