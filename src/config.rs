use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Http,
}

impl StoreBackend {
    fn from_env(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "http" | "remote" => Ok(Self::Http),
            _ => Err(anyhow::anyhow!("STORE_BACKEND must be one of: memory, http")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub store_url: String,
    pub store_anon_key: SecretString,
    pub store_service_key: SecretString,
    pub store_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("APP_PORT must be a valid u16")?;

        let store_backend = StoreBackend::from_env(
            &env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string()),
        )?;

        let store_url =
            env::var("STORE_URL").unwrap_or_else(|_| "http://localhost:54321".to_string());

        let anon_key = env::var("STORE_ANON_KEY").unwrap_or_default();
        let service_key = env::var("STORE_SERVICE_KEY").unwrap_or_default();

        if store_backend == StoreBackend::Http {
            if anon_key.is_empty() {
                return Err(anyhow::anyhow!(
                    "STORE_ANON_KEY must be set for the http store backend"
                ));
            }
            if service_key.is_empty() {
                return Err(anyhow::anyhow!(
                    "STORE_SERVICE_KEY must be set for the http store backend"
                ));
            }
        }

        let store_timeout_secs = env::var("STORE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse::<u64>()
            .context("STORE_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            host,
            port,
            store_backend,
            store_url,
            store_anon_key: SecretString::new(anon_key.into()),
            store_service_key: SecretString::new(service_key.into()),
            store_timeout: Duration::from_secs(store_timeout_secs),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
