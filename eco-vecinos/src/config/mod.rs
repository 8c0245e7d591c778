use secrecy::Secret;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    pub backend: BackendSettings,
    #[serde(default)]
    pub meetings: MeetingSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Mark the session cookie `Secure`; enable behind HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
    /// Idle time after which a browser session is forgotten.
    #[serde(default = "default_session_idle_hours")]
    pub session_idle_hours: i64,
}

fn default_session_idle_hours() -> i64 {
    24
}

#[derive(Deserialize, Clone)]
pub struct TelemetrySettings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP gRPC collector, e.g. http://tempo:4317. Export is off when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_service_name() -> String {
    "eco-vecinos".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Process-local store; data is lost on restart.
    Memory,
    Appwrite,
}

#[derive(Deserialize, Clone)]
pub struct BackendSettings {
    pub provider: BackendProvider,
    #[serde(default)]
    pub appwrite: Option<AppwriteSettings>,
    #[serde(default)]
    pub memory: MemorySettings,
}

#[derive(Deserialize, Clone)]
pub struct AppwriteSettings {
    /// REST root including the version segment, e.g. https://cloud.appwrite.io/v1
    pub endpoint: String,
    pub project_id: String,
    /// Server API key; needed to receive session secrets from the account API.
    pub api_key: Secret<String>,
    pub database_id: String,
    #[serde(default)]
    pub collections: CollectionIds,
}

/// Collection ids as configured in the hosted database.
#[derive(Deserialize, Clone)]
pub struct CollectionIds {
    pub users: String,
    pub communities: String,
    pub incidents: String,
    pub meetings: String,
    pub posts: String,
    pub services: String,
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            communities: "communities".to_string(),
            incidents: "incidents".to_string(),
            meetings: "meetings".to_string(),
            posts: "posts".to_string(),
            services: "services".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct MemorySettings {
    /// Account created at startup so a fresh in-memory instance is usable.
    #[serde(default)]
    pub seed_admin: Option<SeedAccount>,
}

#[derive(Deserialize, Clone)]
pub struct SeedAccount {
    pub email: String,
    pub password: Secret<String>,
    pub name: String,
}

#[derive(Deserialize, Clone)]
pub struct MeetingSettings {
    /// Prefix joined with the meeting id to form the video room link.
    #[serde(default = "default_video_base_url")]
    pub video_base_url: String,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            video_base_url: default_video_base_url(),
        }
    }
}

fn default_video_base_url() -> String {
    "https://meet.jit.si/eco-vecinos-".to_string()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path =
        std::env::current_dir().map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

    // Running from the crate directory or from the workspace root both work.
    let configuration_directory = if base_path.ends_with("eco-vecinos") {
        base_path.join("config")
    } else {
        base_path.join("eco-vecinos").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
