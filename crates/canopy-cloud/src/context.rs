//! Reconcile context and client cache
//!
//! A [`Context`] is handed to every handler call. It carries the region, the
//! host's metadata bag, the cancellation token, the phase deadline and a
//! reconcile-scoped cache of service clients keyed by type.

use crate::classify::ErrorClassifier;
use crate::error::{CloudError, Result};
use crate::retry::RetryConfig;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A service client the context knows how to build on demand.
///
/// `connect` is the fallback constructor used when nothing was stashed for
/// this type in the current reconcile.
pub trait ServiceClient: Send + Sync + Sized + 'static {
    fn connect(ctx: &Context) -> Result<Self>;
}

type ClientCache = Arc<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>;

#[derive(Clone)]
pub struct Context {
    region: String,
    meta: Arc<dyn Any + Send + Sync>,
    cancel: CancellationToken,
    started: Instant,
    deadline: Option<Instant>,
    clients: ClientCache,
    classifier: ErrorClassifier,
    retry: RetryConfig,
}

impl Context {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            meta: Arc::new(()),
            cancel: CancellationToken::new(),
            started: Instant::now(),
            deadline: None,
            clients: Arc::default(),
            classifier: ErrorClassifier::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Attach the host's metadata bag (credentials, provider configuration).
    pub fn with_meta<M: Any + Send + Sync>(mut self, meta: M) -> Self {
        self.meta = Arc::new(meta);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Retry budget used by [`crate::retry::with_retry`].
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Child context whose deadline is at most `budget` from now. Clients
    /// stashed in either context stay shared.
    pub fn with_timeout(&self, budget: Duration) -> Self {
        let now = Instant::now();
        let candidate = now + budget;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            region: self.region.clone(),
            meta: Arc::clone(&self.meta),
            cancel: self.cancel.child_token(),
            started: now,
            deadline: Some(deadline),
            clients: Arc::clone(&self.clients),
            classifier: self.classifier.clone(),
            retry: self.retry.clone(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Typed view of the metadata bag.
    pub fn meta<M: Any>(&self) -> Option<&M> {
        self.meta.downcast_ref::<M>()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the context was cancelled or its deadline passed. Handlers
    /// call this before every upstream request.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(CloudError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(CloudError::Timeout {
                waiting_for: "operation".into(),
                elapsed: deadline.saturating_duration_since(self.started),
                last_state: "(none)".into(),
            });
        }
        Ok(())
    }

    /// Sleep, waking early with [`CloudError::Cancelled`] on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return if self.is_cancelled() {
                Err(CloudError::Cancelled)
            } else {
                Ok(())
            };
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CloudError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Client of type `C`: the stashed one, or one built by
    /// [`ServiceClient::connect`] and stashed for the rest of the reconcile.
    pub fn client<C: ServiceClient>(&self) -> Result<Arc<C>> {
        self.client_or_else(|| C::connect(self))
    }

    /// Like [`Context::client`] with an explicit fallback constructor.
    pub fn client_or_else<C, F>(&self, make: F) -> Result<Arc<C>>
    where
        C: Send + Sync + 'static,
        F: FnOnce() -> Result<C>,
    {
        if let Some(client) = self.stashed::<C>() {
            return Ok(client);
        }
        let client = Arc::new(make()?);
        tracing::debug!(client = std::any::type_name::<C>(), "Constructed service client");
        self.stash_arc(Arc::clone(&client));
        Ok(client)
    }

    /// Put a ready-made client into the cache.
    pub fn stash<C: Send + Sync + 'static>(&self, client: C) {
        self.stash_arc(Arc::new(client));
    }

    pub fn stash_arc<C: Send + Sync + 'static>(&self, client: Arc<C>) {
        let mut cache = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(TypeId::of::<C>(), client);
    }

    pub fn stashed<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        let cache = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(&TypeId::of::<C>())
            .cloned()
            .and_then(|any| any.downcast::<C>().ok())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("region", &self.region)
            .field("cancelled", &self.is_cancelled())
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static CONNECTS: AtomicU32 = AtomicU32::new(0);

    struct FakeClient {
        region: String,
    }

    impl ServiceClient for FakeClient {
        fn connect(ctx: &Context) -> Result<Self> {
            CONNECTS.fetch_add(1, Ordering::SeqCst);
            Ok(Self {
                region: ctx.region().to_string(),
            })
        }
    }

    #[test]
    fn test_client_is_built_once_per_context() {
        let ctx = Context::new("cn-north-4");
        let before = CONNECTS.load(Ordering::SeqCst);
        let a = ctx.client::<FakeClient>().unwrap();
        let b = ctx.with_timeout(Duration::from_secs(5)).client::<FakeClient>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.region, "cn-north-4");
        assert_eq!(CONNECTS.load(Ordering::SeqCst) - before, 1);

        // a fresh reconcile does not share the cache
        let other = Context::new("cn-north-4");
        let c = other.client::<FakeClient>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_stashed_client_wins() {
        let ctx = Context::new("r");
        ctx.stash(FakeClient {
            region: "stashed".into(),
        });
        let client = ctx
            .client_or_else(|| -> Result<FakeClient> { Err(CloudError::Internal("unused".into())) })
            .unwrap();
        assert_eq!(client.region, "stashed");
    }

    #[test]
    fn test_meta() {
        let ctx = Context::new("r").with_meta(String::from("token"));
        assert_eq!(ctx.meta::<String>().map(String::as_str), Some("token"));
        assert!(ctx.meta::<u32>().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ctx = Context::new("r").with_timeout(Duration::from_secs(10));
        assert!(ctx.check().is_ok());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(ctx.check(), Err(CloudError::Timeout { .. })));

        // a child cannot outlive its parent
        let child = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), ctx.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cancellable() {
        let ctx = Context::new("r");
        let child = ctx.with_timeout(Duration::from_secs(600));
        ctx.cancel();
        let result = child.sleep(Duration::from_secs(60)).await;
        assert!(matches!(result, Err(CloudError::Cancelled)));
        assert!(child.check().is_err());
    }
}
