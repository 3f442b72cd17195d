//! Productivity BFF
//!
//! Backend-for-frontend for a personal productivity app:
//! - Owner-scoped task trees (five levels deep) stored in Neo4j
//! - Google OAuth connections with automatic access-token refresh
//! - Google Calendar and Gmail sync driven by push channels
//! - Webhook and cron endpoints for notification processing and watch renewal

pub mod accounts;
pub mod api;
pub mod auth;
pub mod google;
pub mod neo4j;
pub mod sync;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub store: StoreYamlConfig,
    /// Auth section. When absent, auth_config is None and every protected route is denied.
    pub auth: Option<AuthConfig>,
    pub google: GoogleConfig,
    pub webhooks: WebhookConfig,
    pub cron: CronYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    /// Externally reachable base URL, used for webhook addresses
    pub public_url: String,
    pub api_env: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            public_url: "http://localhost:8080".into(),
            api_env: "development".into(),
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:5173".into(),
            ],
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Neo4j,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "neo4j" => Ok(StoreBackend::Neo4j),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("Unknown store backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreYamlConfig {
    pub backend: StoreBackend,
    pub neo4j: Neo4jYamlConfig,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "productivity".into(),
        }
    }
}

/// Bearer-token verification settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider
    pub jwt_secret: String,
    /// Required `aud` claim; unchecked when absent
    #[serde(default)]
    pub jwt_audience: Option<String>,
    /// Restrict access to emails of this domain
    #[serde(default)]
    pub allowed_email_domain: Option<String>,
}

/// Google OAuth client and API endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Cloud project hosting the Gmail Pub/Sub topic
    pub project_id: Option<String>,
    pub pubsub_topic: String,
    pub token_url: String,
    pub calendar_base_url: String,
    pub gmail_base_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            project_id: None,
            pubsub_topic: "gmail-push".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            calendar_base_url: "https://www.googleapis.com/calendar/v3".into(),
            gmail_base_url: "https://gmail.googleapis.com/gmail/v1".into(),
        }
    }
}

impl GoogleConfig {
    /// Fully qualified Pub/Sub topic for Gmail watches
    pub fn gmail_topic(&self) -> Option<String> {
        self.project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|project| format!("projects/{}/topics/{}", project, self.pubsub_topic))
    }
}

/// Shared secrets for inbound push notifications
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebhookConfig {
    /// Key for calendar channel tokens; tokens are not checked when absent
    pub channel_secret: Option<String>,
    /// Expected `token` query parameter on Pub/Sub pushes
    pub pubsub_verification_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CronYamlConfig {
    pub secret: Option<String>,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub public_url: String,
    pub api_env: String,
    pub allowed_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    /// None denies every protected route
    pub auth_config: Option<AuthConfig>,
    pub google: GoogleConfig,
    pub webhooks: WebhookConfig,
    /// Bearer secret for cron endpoints; cron is rejected when absent
    pub cron_secret: Option<String>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let store_backend = match env_opt("STORE_BACKEND") {
            Some(value) => value.parse().context("Invalid STORE_BACKEND")?,
            None => yaml.store.backend,
        };

        let allowed_origins = match env_opt("ALLOWED_ORIGINS") {
            Some(value) => value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => yaml.server.allowed_origins,
        };

        // A JWT secret in the environment enables auth even without a YAML section
        let auth_config = match (env_opt("JWT_SECRET"), yaml.auth) {
            (Some(secret), Some(mut auth)) => {
                auth.jwt_secret = secret;
                Some(auth)
            }
            (Some(secret), None) => Some(AuthConfig {
                jwt_secret: secret,
                jwt_audience: None,
                allowed_email_domain: None,
            }),
            (None, auth) => auth,
        }
        .map(|mut auth| {
            if let Some(aud) = env_opt("JWT_AUDIENCE") {
                auth.jwt_audience = Some(aud);
            }
            if let Some(domain) = env_opt("ALLOWED_EMAIL_DOMAIN") {
                auth.allowed_email_domain = Some(domain);
            }
            auth
        });

        let mut google = yaml.google;
        google.client_id = env_opt("GOOGLE_CLIENT_ID").or(google.client_id);
        google.client_secret = env_opt("GOOGLE_CLIENT_SECRET").or(google.client_secret);
        google.project_id = env_opt("GOOGLE_PROJECT_ID").or(google.project_id);
        if let Some(topic) = env_opt("GOOGLE_PUBSUB_TOPIC") {
            google.pubsub_topic = topic;
        }

        let mut webhooks = yaml.webhooks;
        webhooks.channel_secret = env_opt("WEBHOOK_CHANNEL_SECRET").or(webhooks.channel_secret);
        webhooks.pubsub_verification_token =
            env_opt("PUBSUB_VERIFICATION_TOKEN").or(webhooks.pubsub_verification_token);

        Ok(Self {
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            public_url: env_opt("PUBLIC_URL")
                .unwrap_or(yaml.server.public_url)
                .trim_end_matches('/')
                .to_string(),
            api_env: env_opt("API_ENV").unwrap_or(yaml.server.api_env),
            allowed_origins,
            store_backend,
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.store.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.store.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.store.neo4j.password),
            auth_config,
            google,
            webhooks,
            cron_secret: env_opt("CRON_SECRET").or(yaml.cron.secret),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application services
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn neo4j::RecordStore>,
    pub google: Arc<dyn google::GoogleApi>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect the configured store backend and build the Google client
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn neo4j::RecordStore> = match config.store_backend {
            StoreBackend::Neo4j => Arc::new(
                neo4j::Neo4jClient::new(
                    &config.neo4j_uri,
                    &config.neo4j_user,
                    &config.neo4j_password,
                )
                .await?,
            ),
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                Arc::new(neo4j::MemoryStore::new())
            }
        };

        let google = Arc::new(google::GoogleClient::new(&config.google));

        Ok(Self {
            store,
            google,
            config: Arc::new(config),
        })
    }

    /// Sync service over the shared store and Google client
    pub fn sync_service(&self) -> Arc<sync::SyncService> {
        Arc::new(sync::SyncService::new(
            self.store.clone(),
            self.google.clone(),
            self.config.clone(),
        ))
    }
}

/// Bind the listener and serve the HTTP API until shutdown
pub async fn start_server(state: AppState) -> Result<()> {
    let port = state.config.server_port;
    let api_state = api::handlers::ServerState::from_app(&state);
    let app = api::routes::create_router(api_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_config_loading() {
        let yaml = r#"
server:
  port: 9090
  public_url: https://api.example.com
  allowed_origins: ["https://app.example.com"]

store:
  backend: memory
  neo4j:
    uri: bolt://db:7687
    user: admin
    password: secret

auth:
  jwt_secret: "super-secret-key-min-32-characters!"
  jwt_audience: authenticated
  allowed_email_domain: example.com

google:
  client_id: "123.apps.googleusercontent.com"
  client_secret: "secret123"
  project_id: my-project

cron:
  secret: cron-secret
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.allowed_origins, vec!["https://app.example.com"]);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.neo4j.uri, "bolt://db:7687");

        let auth = config.auth.unwrap();
        assert_eq!(auth.jwt_audience.as_deref(), Some("authenticated"));
        assert_eq!(auth.allowed_email_domain.as_deref(), Some("example.com"));

        assert_eq!(
            config.google.gmail_topic().as_deref(),
            Some("projects/my-project/topics/gmail-push")
        );
        // Endpoint defaults survive a partial google section
        assert_eq!(config.google.token_url, "https://oauth2.googleapis.com/token");
        assert_eq!(config.cron.secret.as_deref(), Some("cron-secret"));
    }

    #[test]
    fn test_auth_config_absent() {
        let yaml = r#"
server:
  port: 8080
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.auth.is_none());
        assert!(config.google.gmail_topic().is_none());
    }

    #[test]
    fn test_yaml_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_env, "development");
        assert_eq!(config.store.backend, StoreBackend::Neo4j);
        assert_eq!(config.store.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.store.neo4j.user, "neo4j");
        assert_eq!(config.google.pubsub_topic, "gmail-push");
        assert!(config.auth.is_none());
        assert!(config.cron.secret.is_none());
    }

    /// Combined test for YAML file loading and env var overrides.
    /// Runs as a single test to avoid parallel env var race conditions.
    #[test]
    fn test_yaml_and_env_lifecycle() {
        fn clear_env() {
            for var in &[
                "NEO4J_URI",
                "NEO4J_USER",
                "NEO4J_PASSWORD",
                "SERVER_PORT",
                "PUBLIC_URL",
                "STORE_BACKEND",
                "JWT_SECRET",
                "CRON_SECRET",
                "GOOGLE_PROJECT_ID",
            ] {
                std::env::remove_var(var);
            }
        }

        // --- Phase 1: YAML values loaded correctly ---
        let yaml = r#"
server:
  port: 9999
  public_url: https://yaml.example.com/
store:
  neo4j:
    uri: bolt://yaml-host:7687
    user: yaml-user
    password: yaml-pass
"#;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        clear_env();

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.public_url, "https://yaml.example.com");
        assert_eq!(config.neo4j_uri, "bolt://yaml-host:7687");
        assert_eq!(config.neo4j_user, "yaml-user");
        assert!(config.auth_config.is_none());
        assert!(config.cron_secret.is_none());

        // --- Phase 2: Env vars override YAML ---
        std::env::set_var("NEO4J_URI", "bolt://env-host:7687");
        std::env::set_var("SERVER_PORT", "7777");
        std::env::set_var("STORE_BACKEND", "memory");
        std::env::set_var("JWT_SECRET", "env-secret");
        std::env::set_var("CRON_SECRET", "env-cron");

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.neo4j_uri, "bolt://env-host:7687");
        assert_eq!(config.server_port, 7777);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.auth_config.unwrap().jwt_secret, "env-secret");
        assert_eq!(config.cron_secret.as_deref(), Some("env-cron"));
        // YAML value still used where no env override
        assert_eq!(config.neo4j_user, "yaml-user");

        // --- Phase 3: bad backend name is an error ---
        std::env::set_var("STORE_BACKEND", "sqlite");
        assert!(Config::from_yaml_and_env(Some(&file_path)).is_err());

        clear_env();

        // --- Phase 4: No YAML file → defaults ---
        let nonexistent = Path::new("/tmp/nonexistent-config-12345.yaml");
        let config = Config::from_yaml_and_env(Some(nonexistent)).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.neo4j_uri, "bolt://localhost:7687");
        assert!(config.auth_config.is_none());
    }
}
