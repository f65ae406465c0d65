use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// The default allowed origins.
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "my.company.dev"];
/// The maximum raw length of a URL-encoded procedure parameter.
pub const DEFAULT_MAX_PARAM_LENGTH: usize = 5000;
/// The maximum size of a POSTed procedure body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The address the server binds to.
    pub listen_addr: SocketAddr,
    /// The externally visible base URL, used to build OAuth redirect URIs.
    pub public_url: String,
    /// The path prefix of the RPC endpoint.
    pub rpc_prefix: String,
    /// The origins allowed by the CORS policy.
    pub cors_origins: Vec<String>,
    /// The secret used to sign session tokens.
    pub auth_secret: Zeroizing<Vec<u8>>,
    /// The secret used for the signed cookie jar.
    pub cookie_secret: Zeroizing<Vec<u8>>,
    /// The GitHub OAuth client id.
    pub github_client_id: String,
    /// The GitHub OAuth client secret.
    pub github_client_secret: Zeroizing<String>,
    /// The duration of a session in days.
    pub session_max_age_days: i64,
    /// The maximum raw length of a URL-encoded procedure parameter.
    pub max_param_length: usize,
    /// The maximum size of a POSTed procedure body.
    pub max_body_bytes: usize,
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let auth_secret = Zeroizing::new(
            env::var("AUTH_SECRET")
                .context("AUTH_SECRET must be set to at least 32 bytes (generate with: openssl rand -hex 32)")?
                .into_bytes(),
        );

        let cookie_secret = match env::var("COOKIE_SECRET") {
            Ok(secret) => Zeroizing::new(secret.into_bytes()),
            Err(_) => auth_secret.clone(),
        };

        let host: IpAddr = parse_or("HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port: u16 = parse_or("PORT", 3000)?;

        let cors_origins = match env::var("CORS_ORIGINS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            rpc_prefix: env::var("RPC_PREFIX").unwrap_or_else(|_| "/trpc".to_string()),
            cors_origins,
            auth_secret,
            cookie_secret,
            github_client_id: env::var("GITHUB_CLIENT_ID").context("GITHUB_CLIENT_ID must be set")?,
            github_client_secret: Zeroizing::new(
                env::var("GITHUB_CLIENT_SECRET").context("GITHUB_CLIENT_SECRET must be set")?,
            ),
            session_max_age_days: parse_or("SESSION_MAX_AGE_DAYS", 30)?,
            max_param_length: parse_or("MAX_PARAM_LENGTH", DEFAULT_MAX_PARAM_LENGTH)?,
            max_body_bytes: parse_or("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
        })
    }

    /// A configuration for tests and local tooling; no environment access.
    pub fn for_local(auth_secret: &str) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            public_url: "http://localhost:3000".to_string(),
            rpc_prefix: "/trpc".to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
            auth_secret: Zeroizing::new(auth_secret.as_bytes().to_vec()),
            cookie_secret: Zeroizing::new(auth_secret.as_bytes().to_vec()),
            github_client_id: "local-client".to_string(),
            github_client_secret: Zeroizing::new("local-secret".to_string()),
            session_max_age_days: 30,
            max_param_length: DEFAULT_MAX_PARAM_LENGTH,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }
}
