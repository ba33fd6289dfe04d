use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// Where pictures and records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Hosted Appwrite project (REST API).
    Appwrite,
    /// Process-local stores; contents vanish on exit.
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "appwrite" => Ok(Self::Appwrite),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown backend `{}` (expected appwrite or memory)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub endpoint: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub bucket_id: String,
    pub database_id: String,
    pub collection_id: String,
    pub debounce: Duration,
    pub page_size: usize,
    pub orphan_grace: chrono::Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Picture gallery backed by a hosted storage service")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides GALLERY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Service endpoint including API version (overrides GALLERY_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Project identifier (overrides GALLERY_PROJECT_ID)
    #[arg(long)]
    pub project_id: Option<String>,

    /// Server API key (overrides GALLERY_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Storage bucket identifier (overrides GALLERY_BUCKET_ID)
    #[arg(long)]
    pub bucket_id: Option<String>,

    /// Database identifier (overrides GALLERY_DATABASE_ID)
    #[arg(long)]
    pub database_id: Option<String>,

    /// Collection identifier (overrides GALLERY_COLLECTION_ID)
    #[arg(long)]
    pub collection_id: Option<String>,

    /// Search debounce in milliseconds (overrides GALLERY_DEBOUNCE_MS)
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Cards per gallery page (overrides GALLERY_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Minimum age before an unreferenced blob is swept (overrides GALLERY_ORPHAN_GRACE_SECS)
    #[arg(long)]
    pub orphan_grace_secs: Option<i64>,
}

/// Read `key`, parsing it when present.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", key, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    /// Merge parsed CLI args over the environment and defaults.
    pub fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env_string("GALLERY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = env_parse::<u16>("GALLERY_PORT")?.unwrap_or(3000);
        let env_backend =
            env_parse::<BackendKind>("GALLERY_BACKEND")?.unwrap_or(BackendKind::Appwrite);
        let env_debounce = env_parse::<u64>("GALLERY_DEBOUNCE_MS")?.unwrap_or(1000);
        let env_page_size = env_parse::<usize>("GALLERY_PAGE_SIZE")?.unwrap_or(24);
        let env_grace = env_parse::<i64>("GALLERY_ORPHAN_GRACE_SECS")?.unwrap_or(300);

        // --- Merge ---
        // Backend identifiers are not checked here; a missing one surfaces as
        // a failed backend call.
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            endpoint: args
                .endpoint
                .or_else(|| env_string("GALLERY_ENDPOINT"))
                .unwrap_or_default(),
            project_id: args
                .project_id
                .or_else(|| env_string("GALLERY_PROJECT_ID"))
                .unwrap_or_default(),
            api_key: args.api_key.or_else(|| env_string("GALLERY_API_KEY")),
            bucket_id: args
                .bucket_id
                .or_else(|| env_string("GALLERY_BUCKET_ID"))
                .unwrap_or_default(),
            database_id: args
                .database_id
                .or_else(|| env_string("GALLERY_DATABASE_ID"))
                .unwrap_or_default(),
            collection_id: args
                .collection_id
                .or_else(|| env_string("GALLERY_COLLECTION_ID"))
                .unwrap_or_default(),
            debounce: Duration::from_millis(args.debounce_ms.unwrap_or(env_debounce)),
            page_size: args.page_size.unwrap_or(env_page_size).max(1),
            orphan_grace: chrono::Duration::seconds(
                args.orphan_grace_secs.unwrap_or(env_grace).max(0),
            ),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Names of backend settings that are empty.
    pub fn missing_backend_settings(&self) -> Vec<&'static str> {
        if self.backend == BackendKind::Memory {
            return Vec::new();
        }
        [
            ("endpoint", &self.endpoint),
            ("project-id", &self.project_id),
            ("bucket-id", &self.bucket_id),
            ("database-id", &self.database_id),
            ("collection-id", &self.collection_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_args_win_over_defaults() {
        let cfg = AppConfig::merge(Args {
            port: Some(8080),
            backend: Some(BackendKind::Memory),
            debounce_ms: Some(250),
            page_size: Some(0),
            ..Args::default()
        })
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.debounce, Duration::from_millis(250));
        assert_eq!(cfg.page_size, 1);
        assert!(cfg.missing_backend_settings().is_empty());
    }

    #[test]
    fn reports_missing_appwrite_settings() {
        let cfg = AppConfig::merge(Args {
            backend: Some(BackendKind::Appwrite),
            endpoint: Some("https://cloud.example/v1".into()),
            project_id: Some("p".into()),
            bucket_id: Some("b".into()),
            database_id: Some("d".into()),
            collection_id: Some("c".into()),
            ..Args::default()
        })
        .unwrap();
        assert!(cfg.missing_backend_settings().is_empty());

        let cfg = AppConfig {
            bucket_id: String::new(),
            ..cfg
        };
        assert_eq!(cfg.missing_backend_settings(), ["bucket-id"]);
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("s3".parse::<BackendKind>().is_err());
    }
}
