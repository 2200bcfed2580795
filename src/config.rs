use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

/// GridFS-compatible default: 255 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub chunk_size: usize,
    pub media_category: String,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked video object store")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_STORE_PORT / PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where chunks are stored (overrides VIDEO_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Catalog database URL (overrides VIDEO_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Chunk size in bytes (overrides VIDEO_STORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Content-type prefix accepted for streaming (overrides VIDEO_STORE_MEDIA_CATEGORY)
    #[arg(long)]
    pub media_category: Option<String>,

    /// Largest accepted upload request in bytes (overrides VIDEO_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("VIDEO_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env_parse::<u16>("VIDEO_STORE_PORT")? {
            Some(port) => port,
            None => env_parse::<u16>("PORT")?.unwrap_or(3000),
        };
        let env_storage =
            env::var("VIDEO_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/chunks".into());
        let env_db = env::var("VIDEO_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/catalog.db".into());
        let env_chunk_size =
            env_parse::<usize>("VIDEO_STORE_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        let env_category =
            env::var("VIDEO_STORE_MEDIA_CATEGORY").unwrap_or_else(|_| "video/".into());
        let env_max_upload = env_parse::<usize>("VIDEO_STORE_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            chunk_size: args.chunk_size.unwrap_or(env_chunk_size),
            media_category: args.media_category.unwrap_or(env_category),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        if self.media_category.len() < 2 || !self.media_category.ends_with('/') {
            bail!(
                "media category `{}` must look like `video/`",
                self.media_category
            );
        }
        if self.max_upload_bytes == 0 {
            bail!("max upload size must be greater than zero");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> AppConfig {
        let args = Args::try_parse_from(argv).expect("parse args");
        AppConfig::from_args(args).expect("build config")
    }

    #[test]
    fn test_cli_overrides() {
        let cfg = parse(&[
            "video-store",
            "--host",
            "127.0.0.1",
            "--port",
            "8081",
            "--chunk-size",
            "1024",
            "--media-category",
            "audio/",
            "--database-url",
            "sqlite::memory:",
        ]);
        assert_eq!(cfg.addr(), "127.0.0.1:8081");
        assert_eq!(cfg.chunk_size, 1024);
        assert_eq!(cfg.media_category, "audio/");
        assert_eq!(cfg.database_url, "sqlite::memory:");
    }

    #[test]
    fn test_migrate_flag() {
        let args = Args::try_parse_from(["video-store", "--migrate"]).unwrap();
        assert!(args.migrate);
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let args = Args::try_parse_from(["video-store", "--chunk-size", "0"]).unwrap();
        assert!(AppConfig::from_args(args).is_err());
    }

    #[test]
    fn test_rejects_category_without_slash() {
        let args = Args::try_parse_from(["video-store", "--media-category", "video"]).unwrap();
        assert!(AppConfig::from_args(args).is_err());
    }
}
