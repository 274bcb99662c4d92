//! Connection provider for MongoDB
//!
//! One [`ConnectionProvider`] lives for the whole process (or until the owner
//! calls [`ConnectionProvider::reset`]) and hands out clones of a single shared
//! [`Client`]. The client is built at most once: the first caller spawns the
//! construction on its executor and every other caller, concurrent or later,
//! awaits the same memoized future.
//!
//! A failed construction is memoized as well, so every caller sees the same
//! [`ConnectionError`] and no new attempt is made until `reset`.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use mongodb::Client;
use mongodb::options::{ClientOptions, Credential, ServerAddress, Tls, TlsOptions};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::PersistenceSettings;
use crate::error::{ConnectionError, Result};

type ClientFuture = Shared<BoxFuture<'static, std::result::Result<Client, ConnectionError>>>;

/// Lazily constructed, shared backend client
#[derive(Default)]
pub struct ConnectionProvider {
    /// Memoized construction, `None` until the first request
    slot: Mutex<Option<ClientFuture>>,

    /// Number of constructions started
    attempts: AtomicUsize,
}

impl ConnectionProvider {
    /// Create a provider with nothing memoized yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared client, constructing it on first use
    ///
    /// # Arguments
    /// * `settings` - Persistence settings; only the first caller's are used
    /// * `handle` - Executor the construction is spawned on
    ///
    /// # Returns
    /// * `Result<Client>` - Shared client or the memoized connection failure
    pub async fn client(&self, settings: &PersistenceSettings, handle: &Handle) -> Result<Client> {
        let settings = settings.clone();
        self.get_or_connect(handle, move || async move { connect(&settings).await })
            .await
    }

    /// Await the memoized construction, starting it with `connect` if needed
    pub async fn get_or_connect<F, Fut>(&self, handle: &Handle, connect: F) -> Result<Client>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Client, ConnectionError>> + Send + 'static,
    {
        let pending = {
            let mut slot = self.slot.lock().map_err(|_| {
                ConnectionError::ConnectionFailed("connection slot poisoned".to_string())
            })?;

            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Starting client construction (attempt {})", attempt);

                    let task = handle.spawn(connect());
                    let pending = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => Err(ConnectionError::ConnectionFailed(format!(
                                "connection task failed: {e}"
                            ))),
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        Ok(pending.await?)
    }

    /// Forget the memoized client or failure
    ///
    /// Existing clones of the client stay usable; the next request builds a
    /// new one.
    pub fn reset(&self) {
        match self.slot.lock() {
            Ok(mut slot) => {
                if slot.take().is_some() {
                    info!("Connection provider reset");
                }
            }
            Err(poisoned) => {
                warn!("Resetting poisoned connection slot");
                *poisoned.into_inner() = None;
            }
        }
    }

    /// Number of client constructions started so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Build the driver options for the given settings
///
/// A configured `url` wins over the discrete host, port, credential and TLS
/// fields.
pub async fn client_options(
    settings: &PersistenceSettings,
) -> std::result::Result<ClientOptions, ConnectionError> {
    if let Some(url) = settings
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        return ClientOptions::parse(url)
            .await
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()));
    }

    let mut options = ClientOptions::default();
    options.hosts = vec![ServerAddress::Tcp {
        host: settings.host.clone(),
        port: Some(settings.port),
    }];

    if let Some(username) = settings.credential_username() {
        let mut credential = Credential::default();
        credential.username = Some(username.to_string());
        credential.password = settings.password.clone();
        credential.source = settings.database.clone();
        options.credential = Some(credential);
    }

    options.tls = settings.enable_ssl.map(|enabled| {
        if enabled {
            Tls::Enabled(TlsOptions::default())
        } else {
            Tls::Disabled
        }
    });

    Ok(options)
}

async fn connect(settings: &PersistenceSettings) -> std::result::Result<Client, ConnectionError> {
    let options = client_options(settings).await?;
    let hosts: Vec<String> = options.hosts.iter().map(ToString::to_string).collect();

    let client = Client::with_options(options)
        .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

    info!("Created MongoDB client for {}", hosts.join(","));
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_host_form_options() {
        let settings = PersistenceSettings {
            host: "db.internal".to_string(),
            port: 27018,
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: Some("shop".to_string()),
            enable_ssl: Some(true),
            ..PersistenceSettings::default()
        };

        let options = client_options(&settings).await.unwrap();
        assert_eq!(
            options.hosts,
            vec![ServerAddress::Tcp {
                host: "db.internal".to_string(),
                port: Some(27018),
            }]
        );
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("app"));
        assert_eq!(credential.password.as_deref(), Some("secret"));
        assert_eq!(credential.source.as_deref(), Some("shop"));
        assert!(matches!(options.tls, Some(Tls::Enabled(_))));
    }

    #[tokio::test]
    async fn test_blank_username_means_no_credential() {
        let settings = PersistenceSettings {
            username: Some("  ".to_string()),
            password: Some("ignored".to_string()),
            enable_ssl: Some(false),
            ..PersistenceSettings::default()
        };

        let options = client_options(&settings).await.unwrap();
        assert!(options.credential.is_none());
        assert!(matches!(options.tls, Some(Tls::Disabled)));
    }

    #[tokio::test]
    async fn test_url_takes_precedence() {
        let settings = PersistenceSettings {
            url: Some("mongodb://example.net:27019/admin".to_string()),
            host: "ignored".to_string(),
            username: Some("ignored".to_string()),
            ..PersistenceSettings::default()
        };

        let options = client_options(&settings).await.unwrap();
        assert_eq!(
            options.hosts,
            vec![ServerAddress::Tcp {
                host: "example.net".to_string(),
                port: Some(27019),
            }]
        );
        assert!(options.credential.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let settings = PersistenceSettings {
            url: Some("postgres://nope".to_string()),
            ..PersistenceSettings::default()
        };
        let err = client_options(&settings).await.unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidUri(_)));
    }

    #[tokio::test]
    async fn test_failure_is_memoized() {
        let provider = ConnectionProvider::new();
        let handle = Handle::current();

        let first = provider
            .get_or_connect(&handle, || async {
                Err(ConnectionError::ConnectionFailed("refused".to_string()))
            })
            .await
            .unwrap_err();

        let second = provider
            .get_or_connect(&handle, || async {
                Err(ConnectionError::ConnectionFailed("second attempt".to_string()))
            })
            .await
            .unwrap_err();

        assert_eq!(first.to_string(), second.to_string());
        assert!(second.to_string().contains("refused"));
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_construction() {
        let provider = Arc::new(ConnectionProvider::new());
        let handle = Handle::current();

        let callers = (0..8).map(|_| {
            let provider = Arc::clone(&provider);
            let handle = handle.clone();
            async move {
                provider
                    .get_or_connect(&handle, || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Client::with_uri_str("mongodb://127.0.0.1:1")
                            .await
                            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))
                    })
                    .await
            }
        });

        let results = futures::future::join_all(callers).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn test_reset_allows_new_attempt() {
        let provider = ConnectionProvider::new();
        let handle = Handle::current();

        for _ in 0..2 {
            let _ = provider
                .get_or_connect(&handle, || async { Err(ConnectionError::NotConnected) })
                .await;
        }
        assert_eq!(provider.attempts(), 1);

        provider.reset();
        let _ = provider
            .get_or_connect(&handle, || async { Err(ConnectionError::NotConnected) })
            .await;
        assert_eq!(provider.attempts(), 2);
    }
}
