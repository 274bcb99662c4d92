//! Persistence controller
//!
//! The host framework drives the resolver through [`PersistenceController`]:
//! `init` once, then any number of `query` / `update` calls, optional
//! transaction bracketing, and finally `close`. Every async method receives the
//! caller's executor and runs its backend work as a task spawned there.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mongodb::ClientSession;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::connection::ConnectionProvider;
use crate::error::{ConnectionError, Result};
use crate::executor::{OperationResult, QueryResolver, to_operation_result};
use crate::normalizer::{NormalizeMode, normalize};

/// Contract the host framework invokes
#[async_trait]
pub trait PersistenceController: Send + Sync {
    /// Abort any active transaction, release the session and drop the client
    async fn close(&self, handle: &Handle) -> Result<()>;

    /// Start a transaction; a no-op when one is already active
    async fn init_transaction(&self, handle: &Handle) -> Result<()>;

    /// Commit the active transaction; a no-op when none is active
    async fn commit_transaction(&self, handle: &Handle) -> Result<()>;

    /// Abort the active transaction; a no-op when none is active
    async fn rollback_transaction(&self, handle: &Handle) -> Result<()>;

    fn is_in_transaction(&self) -> bool;

    /// Resolve a read query into a structured value
    async fn query(&self, query: &str, handle: &Handle) -> Result<Value>;

    /// Resolve a write query into an operation result
    async fn update(&self, query: &str, handle: &Handle) -> Result<Option<OperationResult>>;
}

type SharedSession = Arc<Mutex<Option<ClientSession>>>;

/// Controller backed by the MongoDB driver
#[derive(Debug)]
pub struct MongoPersistenceController {
    /// `None` once closed
    resolver: RwLock<Option<QueryResolver>>,

    /// Session used for transactions, absent when the backend refused one
    session: SharedSession,

    in_transaction: Arc<AtomicBool>,

    /// Apply the id-only normalization pass to results
    normalize_id_fields: bool,
}

#[derive(Debug, Clone, Copy)]
enum TransactionStep {
    Start,
    Commit,
    Abort,
}

impl MongoPersistenceController {
    /// Connect and prepare a controller
    ///
    /// # Arguments
    /// * `provider` - Process-scoped connection provider
    /// * `settings` - Settings whose `persistence` section configures the backend
    /// * `handle` - Executor for the connection and verification tasks
    ///
    /// # Returns
    /// * `Result<Self>` - Ready controller, or the connection/backend failure
    pub async fn init(
        provider: &ConnectionProvider,
        settings: &Settings,
        handle: &Handle,
    ) -> Result<Self> {
        let persistence = &settings.persistence;
        let client = provider.client(persistence, handle).await?;

        let verify = client.clone();
        let databases = handle
            .spawn(async move { verify.list_database_names().await })
            .await??;
        debug!("Backend reachable, {} database(s) visible", databases.len());

        let starter = client.clone();
        let session = match handle
            .spawn(async move { starter.start_session().await })
            .await?
        {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Sessions unavailable, transactions are disabled: {}", e);
                None
            }
        };

        let resolver = QueryResolver::new(client, persistence.database.as_deref())
            .with_server_eval(persistence.allow_server_eval);

        info!(
            "Persistence controller ready (database: {})",
            persistence.database.as_deref().unwrap_or("<none>")
        );
        Ok(Self::from_parts(
            resolver,
            session,
            persistence.normalize_id_fields,
        ))
    }

    fn from_parts(
        resolver: QueryResolver,
        session: Option<ClientSession>,
        normalize_id_fields: bool,
    ) -> Self {
        Self {
            resolver: RwLock::new(Some(resolver)),
            session: Arc::new(Mutex::new(session)),
            in_transaction: Arc::new(AtomicBool::new(false)),
            normalize_id_fields,
        }
    }

    async fn resolver(&self) -> Result<QueryResolver> {
        self.resolver
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    async fn run_step(&self, step: TransactionStep, handle: &Handle) -> Result<()> {
        let session = Arc::clone(&self.session);
        let in_transaction = Arc::clone(&self.in_transaction);
        handle
            .spawn(transaction_step(session, in_transaction, step))
            .await?
    }
}

#[async_trait]
impl PersistenceController for MongoPersistenceController {
    async fn close(&self, handle: &Handle) -> Result<()> {
        if self.in_transaction.load(Ordering::SeqCst) {
            if let Err(e) = self.run_step(TransactionStep::Abort, handle).await {
                warn!("Failed to abort transaction on close: {}", e);
            }
        }

        let session = Arc::clone(&self.session);
        handle
            .spawn(async move {
                session.lock().await.take();
            })
            .await?;

        self.in_transaction.store(false, Ordering::SeqCst);
        if self.resolver.write().await.take().is_some() {
            info!("Persistence controller closed");
        }
        Ok(())
    }

    async fn init_transaction(&self, handle: &Handle) -> Result<()> {
        if self.in_transaction.load(Ordering::SeqCst) {
            debug!("Transaction already active");
            return Ok(());
        }
        self.run_step(TransactionStep::Start, handle).await
    }

    async fn commit_transaction(&self, handle: &Handle) -> Result<()> {
        if !self.in_transaction.load(Ordering::SeqCst) {
            debug!("No active transaction to commit");
            return Ok(());
        }
        self.run_step(TransactionStep::Commit, handle).await
    }

    async fn rollback_transaction(&self, handle: &Handle) -> Result<()> {
        if !self.in_transaction.load(Ordering::SeqCst) {
            debug!("No active transaction to roll back");
            return Ok(());
        }
        self.run_step(TransactionStep::Abort, handle).await
    }

    fn is_in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    async fn query(&self, query: &str, handle: &Handle) -> Result<Value> {
        let resolver = self.resolver().await?;
        handle
            .spawn(run_query(resolver, query.to_string(), self.normalize_id_fields))
            .await?
    }

    async fn update(&self, query: &str, handle: &Handle) -> Result<Option<OperationResult>> {
        let resolver = self.resolver().await?;
        handle
            .spawn(run_update(resolver, query.to_string(), self.normalize_id_fields))
            .await?
    }
}

async fn run_query(resolver: QueryResolver, query: String, normalize_ids: bool) -> Result<Value> {
    let value = resolver.resolve(&query).await?;
    Ok(if normalize_ids {
        normalize(value, NormalizeMode::IdOnly)
    } else {
        value
    })
}

async fn run_update(
    resolver: QueryResolver,
    query: String,
    normalize_ids: bool,
) -> Result<Option<OperationResult>> {
    let value = resolver.resolve(&query).await?;
    to_operation_result(value, normalize_ids)
}

/// Apply one transaction step to the shared session
///
/// The active flag is re-checked under the session lock so concurrent callers
/// cannot start or finish the same transaction twice.
async fn transaction_step(
    session: SharedSession,
    in_transaction: Arc<AtomicBool>,
    step: TransactionStep,
) -> Result<()> {
    let mut guard = session.lock().await;
    let Some(session) = guard.as_mut() else {
        debug!("No session, {:?} ignored", step);
        return Ok(());
    };

    let active = in_transaction.load(Ordering::SeqCst);
    let outcome = match step {
        TransactionStep::Start if !active => session.start_transaction().await,
        TransactionStep::Commit if active => session.commit_transaction().await,
        TransactionStep::Abort if active => session.abort_transaction().await,
        _ => return Ok(()),
    };

    match step {
        // A failed commit or abort still ends the transaction on the driver side.
        TransactionStep::Start => in_transaction.store(outcome.is_ok(), Ordering::SeqCst),
        TransactionStep::Commit | TransactionStep::Abort => {
            in_transaction.store(false, Ordering::SeqCst)
        }
    }

    outcome.map_err(|e| ConnectionError::TransactionFailed(e.to_string()))?;
    info!("Transaction step {:?} done", step);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::Client;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const OFFLINE_URI: &str = "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=100";

    async fn offline_controller() -> MongoPersistenceController {
        let client = Client::with_uri_str(OFFLINE_URI).await.unwrap();
        MongoPersistenceController::from_parts(QueryResolver::new(client, Some("test")), None, true)
    }

    #[tokio::test]
    async fn test_init_fails_without_backend() {
        let settings = Settings::from_value(json!({
            "persistence": { "url": OFFLINE_URI, "database": "test" }
        }))
        .unwrap();
        let provider = ConnectionProvider::new();

        assert_err!(MongoPersistenceController::init(&provider, &settings, &Handle::current()).await);
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn test_transactions_without_session_are_noops() {
        let controller = offline_controller().await;
        let handle = Handle::current();

        assert_ok!(controller.init_transaction(&handle).await);
        assert!(!controller.is_in_transaction());
        assert_ok!(controller.commit_transaction(&handle).await);
        assert_ok!(controller.rollback_transaction(&handle).await);
    }

    #[tokio::test]
    async fn test_errors_propagate_from_spawned_task() {
        let controller = offline_controller().await;
        let handle = Handle::current();

        let err = controller
            .query(r#"db.users.save({"a":1})"#, &handle)
            .await
            .unwrap_err();
        assert!(err.is_unsupported_operation());

        let err = controller.update("users.insert", &handle).await.unwrap_err();
        assert!(err.is_malformed_query());
    }

    #[tokio::test]
    async fn test_closed_controller_is_not_connected() {
        let controller = offline_controller().await;
        let handle = Handle::current();

        controller.close(&handle).await.unwrap();
        controller.close(&handle).await.unwrap();

        let err = controller.query("db.users.find()", &handle).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ResolverError::Connection(ConnectionError::NotConnected)
        ));
        assert!(controller.update("db.users.remove()", &handle).await.is_err());
    }
}
