//! NATS connection manager with bounded connect retries and optional auth.
//!
//! Wraps `async-nats`. Once the initial connection is up, async-nats handles
//! reconnection internally; this layer exposes connection state so callers
//! can distinguish "never connected" from "reconnecting".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_nats::ConnectOptions;
use async_nats::jetstream;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use config::{NatsConfig, NatsSecurityMode};

use crate::error::{BackendError, BackendResult};

/// Base delay for retrying initial NATS connections.
const CONNECT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for retry backoff during initial NATS connect.
const MAX_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and operating normally.
    Connected,
    /// Attempting to reconnect after a failure.
    Reconnecting,
    /// Not connected; never established or shut down.
    Disconnected,
}

struct ClientInner {
    nats_client: Option<async_nats::Client>,
    state: ConnectionState,
}

/// Shared NATS connection used by both the registry and lock-store backends.
#[derive(Clone)]
pub struct NatsClient {
    inner: Arc<RwLock<ClientInner>>,
    config: NatsConfig,
}

impl NatsClient {
    /// Create a new client without connecting yet. Call [`connect`] to
    /// establish the connection.
    ///
    /// [`connect`]: NatsClient::connect
    pub fn new(config: NatsConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ClientInner {
                nats_client: None,
                state: ConnectionState::Disconnected,
            })),
            config,
        }
    }

    /// Build connect options from the config, applying the selected security mode.
    fn build_connect_options(config: &NatsConfig) -> BackendResult<ConnectOptions> {
        let mut opts = ConnectOptions::new();

        match config.security_mode {
            NatsSecurityMode::None => {}
            NatsSecurityMode::UserPassword => {
                let user = config.username.as_deref().ok_or_else(|| {
                    BackendError::Config("user_password security mode requires 'username'".into())
                })?;
                let pass = config.password.as_deref().ok_or_else(|| {
                    BackendError::Config("user_password security mode requires 'password'".into())
                })?;
                opts = opts.user_and_password(user.into(), pass.into());
            }
            NatsSecurityMode::Token => {
                let token = config.token.as_deref().ok_or_else(|| {
                    BackendError::Config("token security mode requires 'token'".into())
                })?;
                opts = opts.token(token.into());
            }
        }

        opts = opts.connection_timeout(config.connect_timeout);
        opts = opts.retry_on_initial_connect();
        Ok(opts)
    }

    /// Establish the NATS connection with bounded retries and exponential
    /// backoff. On success the client transitions to `Connected`.
    pub async fn connect(&self) -> BackendResult<()> {
        if self.connection_state().await == ConnectionState::Connected {
            debug!("NATS client already connected, skipping connect");
            return Ok(());
        }

        info!(
            servers = ?self.config.servers,
            security_mode = ?self.config.security_mode,
            connect_retry_max = self.config.connect_retry_max,
            "connecting to NATS"
        );

        {
            let mut inner = self.inner.write().await;
            inner.nats_client = None;
            inner.state = ConnectionState::Reconnecting;
        }

        let total_attempts = self.config.connect_retry_max.saturating_add(1);
        for attempt in 0..total_attempts {
            let opts = match Self::build_connect_options(&self.config) {
                Ok(opts) => opts,
                Err(err) => {
                    let mut inner = self.inner.write().await;
                    inner.state = ConnectionState::Disconnected;
                    return Err(err);
                }
            };

            match opts.connect(self.config.servers.clone()).await {
                Ok(client) => {
                    let mut inner = self.inner.write().await;
                    inner.nats_client = Some(client);
                    inner.state = ConnectionState::Connected;
                    info!(
                        attempt = attempt + 1,
                        total_attempts, "NATS connection established"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let attempt_num = attempt + 1;
                    if attempt_num >= total_attempts {
                        error!(
                            attempts = total_attempts,
                            error = %err,
                            "NATS connection failed after all retry attempts"
                        );
                        let mut inner = self.inner.write().await;
                        inner.state = ConnectionState::Disconnected;
                        return Err(BackendError::Transport(format!(
                            "NATS connection failed after {total_attempts} attempt(s): {err}"
                        )));
                    }

                    let delay = CONNECT_RETRY_BASE_DELAY
                        .saturating_mul(2u32.saturating_pow(attempt))
                        .min(MAX_CONNECT_RETRY_DELAY);
                    warn!(
                        attempt = attempt_num,
                        total_attempts,
                        retry_in_ms = delay.as_millis(),
                        error = %err,
                        "NATS connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        unreachable!("connect loop returns on success or terminal failure")
    }

    /// Returns the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        let inner = self.inner.read().await;
        if let Some(ref client) = inner.nats_client {
            match client.connection_state() {
                async_nats::connection::State::Connected => ConnectionState::Connected,
                async_nats::connection::State::Disconnected
                | async_nats::connection::State::Pending => ConnectionState::Reconnecting,
            }
        } else {
            inner.state
        }
    }

    /// Returns true if the client is currently connected.
    pub async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    /// Bound `fut` by the request timeout. An elapsed deadline surfaces as
    /// [`BackendError::Timeout`]: the operation may or may not have landed.
    /// Every KV call goes through here so a hung store turns into an error
    /// instead of wedging the caller.
    pub async fn bounded<T>(&self, what: &str, fut: impl Future<Output = T>) -> BackendResult<T> {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| {
                BackendError::Timeout(format!(
                    "{what} timed out after {:?}",
                    self.config.request_timeout
                ))
            })
    }

    /// Build a JetStream context for the active connection.
    pub async fn jetstream_context(&self) -> BackendResult<jetstream::Context> {
        let client = self.nats_client().await?;
        Ok(jetstream::new(client))
    }

    /// Get an existing KV bucket or create it with the given max-age.
    ///
    /// `max_age` is a bucket-wide property: keys expire after this long
    /// without a rewrite. An existing bucket keeps whatever max-age it was
    /// created with.
    pub async fn get_or_create_kv_bucket(
        &self,
        bucket: &str,
        max_age: Duration,
    ) -> BackendResult<jetstream::kv::Store> {
        let js = self.jetstream_context().await?;
        match js.get_key_value(bucket.to_string()).await {
            Ok(store) => Ok(store),
            Err(get_err) => {
                debug!(bucket, error = %get_err, "creating missing JetStream KV bucket");
                js.create_key_value(jetstream::kv::Config {
                    bucket: bucket.to_string(),
                    max_age,
                    ..Default::default()
                })
                .await
                .map_err(|create_err| {
                    BackendError::Transport(format!(
                        "failed to create JetStream KV bucket '{bucket}': {create_err} (get error: {get_err})"
                    ))
                })
            }
        }
    }

    async fn nats_client(&self) -> BackendResult<async_nats::Client> {
        let inner = self.inner.read().await;
        inner
            .nats_client
            .clone()
            .ok_or_else(|| BackendError::NotConnected("NATS client not connected".into()))
    }

    /// Shut down the client, transitioning to Disconnected state.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.write().await;
        inner.nats_client = None;
        inner.state = ConnectionState::Disconnected;
        info!("NATS client disconnected");
    }
}

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("servers", &self.config.servers)
            .field("request_timeout", &self.config.request_timeout)
            .finish_non_exhaustive()
    }
}
