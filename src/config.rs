//! Env-var driven service configuration, following the `PORT`/`NODE_ID`
//! convention the rest of the workspace uses for its edge binaries.

/// Runtime configuration for the `geo-index` HTTP service.
#[derive(Debug, Clone)]
pub struct GeoServiceConfig {
    pub port: u16,
    pub node_id: String,
}

impl GeoServiceConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(18112);

        let node_id =
            std::env::var("NODE_ID").unwrap_or_else(|_| format!("geo-{}", uuid::Uuid::new_v4()));

        Self { port, node_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_unset() {
        std::env::remove_var("PORT");
        std::env::remove_var("NODE_ID");
        let config = GeoServiceConfig::from_env();
        assert_eq!(config.port, 18112);
        assert!(config.node_id.starts_with("geo-"));
    }
}
