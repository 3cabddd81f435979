//! PostgreSQL connection establishment.
//!
//! The service may start before the database accepts connections, so opening
//! the pool is retried a bounded number of times with a fixed delay between
//! attempts. Exhausting the attempts is fatal for the caller.

use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid connection config: {0}")]
    InvalidConfig(String),
    #[error("failed to connect to database after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

/// Discrete connection fields. Credentials are optional.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, ConnectError> {
        let config = Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: database.into(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.host.trim().is_empty() {
            return Err(ConnectError::InvalidConfig("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectError::InvalidConfig("port is zero".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(ConnectError::InvalidConfig("database is empty".to_string()));
        }
        Ok(())
    }

    /// Driver options built from the discrete fields.
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database);
        if !self.username.is_empty() {
            options = options.username(&self.username);
        }
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        options
    }
}

/// Renders the connection descriptor with the password redacted.
impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgresql://")?;
        if !self.username.is_empty() {
            write!(f, "{}", self.username)?;
            if !self.password.is_empty() {
                write!(f, ":***")?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Bounded attempts with a fixed delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// `Backoff` yielding `delay` until `attempts - 1` retries are spent.
#[derive(Debug)]
struct FixedDelay {
    delay: Duration,
    retries: u32,
    remaining: u32,
}

impl FixedDelay {
    fn new(policy: RetryPolicy) -> Self {
        let retries = policy.attempts.saturating_sub(1);
        Self {
            delay: policy.delay,
            retries,
            remaining: retries,
        }
    }
}

impl Backoff for FixedDelay {
    fn reset(&mut self) {
        self.remaining = self.retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.delay)
    }
}

/// Pool sizing applied to every connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a pool to `config`, retrying per `policy`.
pub async fn connect(
    config: &ConnectionConfig,
    pool: PoolSettings,
    policy: RetryPolicy,
) -> Result<PgPool, ConnectError> {
    config.validate()?;
    info!(target_db = %config, attempts = policy.attempts, "connecting to database");
    let options = config.connect_options();

    retry_connect(policy, || {
        PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .acquire_timeout(pool.acquire_timeout)
            .connect_with(options.clone())
    })
    .await
}

/// Retry `open` per `policy`. Only a fully opened value is ever returned.
pub async fn retry_connect<T, F, Fut>(policy: RetryPolicy, mut open: F) -> Result<T, ConnectError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let policy = RetryPolicy::new(policy.attempts, policy.delay);
    let attempt = AtomicU32::new(0);

    let result = retry_notify(
        FixedDelay::new(policy),
        || {
            attempt.fetch_add(1, Ordering::SeqCst);
            let fut = open();
            async move { fut.await.map_err(backoff::Error::transient) }
        },
        |err: sqlx::Error, wait: Duration| {
            let current = attempt.load(Ordering::SeqCst);
            warn!(
                attempt = current,
                remaining = policy.attempts - current,
                error = %err,
                "failed to connect to database, retrying in {:?}",
                wait
            );
        },
    )
    .await;

    let attempts = attempt.load(Ordering::SeqCst);
    match result {
        Ok(value) => {
            info!(attempt = attempts, "connected to database");
            Ok(value)
        }
        Err(source) => {
            error!(attempts, error = %source, "giving up connecting to database");
            Err(ConnectError::Exhausted { attempts, source })
        }
    }
}
