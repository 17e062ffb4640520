use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Token secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-access-secret-change-me",
    "dev-refresh-secret-change-me",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub production: bool,
    pub cors_origin: Option<String>,
    pub temp_dir: PathBuf,
    pub media_dir: PathBuf,
    pub public_url: String,
    pub cloudinary: Option<CloudinaryConfig>,
    pub default_page_size: u32,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        fn parsed<T>(value: Option<String>, key: &str, default: T) -> Result<T>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match value {
                Some(v) => v.parse().with_context(|| format!("{} has an invalid value {:?}", key, v)),
                None => Ok(default),
            }
        }

        let production = match get("VIDTUBE_ENV").as_deref() {
            None | Some("development") => false,
            Some("production") => true,
            Some(other) => bail!("VIDTUBE_ENV must be development or production, got {:?}", other),
        };

        let access_secret = secret(get("ACCESS_TOKEN_SECRET"), "ACCESS_TOKEN_SECRET", "dev-access-secret-change-me", production)?;
        let refresh_secret = secret(get("REFRESH_TOKEN_SECRET"), "REFRESH_TOKEN_SECRET", "dev-refresh-secret-change-me", production)?;

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => {
                warn!("Cloudinary is partially configured; storing media on local disk");
                None
            }
        };

        let default_page_size = parsed(get("DEFAULT_PAGE_SIZE"), "DEFAULT_PAGE_SIZE", 10u32)?;
        if default_page_size == 0 {
            bail!("DEFAULT_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            host: get("VIDTUBE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(get("VIDTUBE_PORT"), "VIDTUBE_PORT", 8001)?,
            db_path: get("VIDTUBE_DB_PATH").unwrap_or_else(|| "vidtube.db".into()).into(),
            access_secret,
            refresh_secret,
            access_ttl: Duration::from_secs(parsed(get("ACCESS_TOKEN_TTL_SECS"), "ACCESS_TOKEN_TTL_SECS", 86_400)?),
            refresh_ttl: Duration::from_secs(parsed(get("REFRESH_TOKEN_TTL_SECS"), "REFRESH_TOKEN_TTL_SECS", 864_000)?),
            production,
            cors_origin: get("CORS_ORIGIN"),
            temp_dir: get("VIDTUBE_TEMP_DIR").unwrap_or_else(|| "./public/temp".into()).into(),
            media_dir: get("VIDTUBE_MEDIA_DIR").unwrap_or_else(|| "./public/media".into()).into(),
            public_url: get("VIDTUBE_PUBLIC_URL").unwrap_or_else(|| "http://localhost:8001".into()),
            cloudinary,
            default_page_size,
            max_upload_bytes: parsed(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", 500 * 1024 * 1024)?,
        })
    }
}

fn secret(value: Option<String>, key: &str, dev_default: &str, production: bool) -> Result<String> {
    match value {
        Some(v) if !PLACEHOLDER_SECRETS.contains(&v.as_str()) => Ok(v),
        _ if production => bail!("{} is unset or still a placeholder", key),
        Some(v) => {
            warn!("{} is a placeholder; do not run like this in production", key);
            Ok(v)
        }
        None => {
            warn!("{} is unset, using a development placeholder", key);
            Ok(dev_default.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_in_development() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8001);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(!cfg.production);
        assert_eq!(cfg.access_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.refresh_ttl, Duration::from_secs(864_000));
        assert_eq!(cfg.default_page_size, 10);
        assert_eq!(cfg.max_upload_bytes, 524_288_000);
        assert!(cfg.cloudinary.is_none());
        assert_ne!(cfg.access_secret, cfg.refresh_secret);
    }

    #[test]
    fn production_needs_real_secrets() {
        assert!(config(&[("VIDTUBE_ENV", "production")]).is_err());
        assert!(
            config(&[
                ("VIDTUBE_ENV", "production"),
                ("ACCESS_TOKEN_SECRET", "change-me-to-a-random-string"),
                ("REFRESH_TOKEN_SECRET", "r3fr3sh"),
            ])
            .is_err()
        );

        let cfg = config(&[
            ("VIDTUBE_ENV", "production"),
            ("ACCESS_TOKEN_SECRET", "a-long-random-access-secret"),
            ("REFRESH_TOKEN_SECRET", "a-long-random-refresh-secret"),
        ])
        .unwrap();
        assert!(cfg.production);
    }

    #[test]
    fn cloudinary_needs_all_three_keys() {
        let partial = config(&[("CLOUDINARY_CLOUD_NAME", "demo")]).unwrap();
        assert!(partial.cloudinary.is_none());

        let full = config(&[
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
        ])
        .unwrap();
        assert_eq!(full.cloudinary.unwrap().cloud_name, "demo");
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("VIDTUBE_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("VIDTUBE_PORT"));
        assert!(config(&[("DEFAULT_PAGE_SIZE", "0")]).is_err());
        assert!(config(&[("VIDTUBE_ENV", "staging")]).is_err());
    }
}
