//! Token caching layer.
//!
//! Each cached slot moves through `Empty -> Ready -> (expired) -> Refreshing ->
//! Ready | Empty`. Readers holding the shared lock return a valid token without
//! touching the source. The first caller to find the slot stale installs a
//! shared refresh future under the exclusive lock; every other caller that
//! arrives before it settles awaits the same future, so concurrent callers
//! cause exactly one source call and all observe the same token or error.
//! A failed refresh leaves the slot empty so the next call retries. A refresh
//! that settled while nobody was left to record it is promoted if its token is
//! still usable and replaced otherwise; an expired token or a stale error is
//! never handed out from it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{AccessToken, Authorizer};
use crate::{Error, Result};

type Fetched = std::result::Result<(AccessToken, Instant), Arc<Error>>;
type RefreshFuture = Shared<BoxFuture<'static, Fetched>>;

enum SlotState {
    Empty,
    Ready {
        token: AccessToken,
        fetched_at: Instant,
    },
    Refreshing {
        generation: u64,
        refresh: RefreshFuture,
    },
}

/// What a caller holding the exclusive lock should do next.
enum Step {
    Hit(AccessToken),
    Promote(AccessToken, Instant),
    Join(u64, RefreshFuture),
    Start,
}

struct TokenSlot {
    state: RwLock<SlotState>,
    generation: AtomicU64,
}

impl TokenSlot {
    fn new() -> Self {
        Self {
            state: RwLock::new(SlotState::Empty),
            generation: AtomicU64::new(0),
        }
    }

    async fn get<F>(&self, label: &str, max_age: Option<Duration>, fetch: F) -> Result<AccessToken>
    where
        F: Fn() -> BoxFuture<'static, Result<AccessToken>>,
    {
        // A joined refresh may settle on a token that is already stale; retry
        // once with a refresh of our own rather than hand it out.
        let mut may_retry = true;

        loop {
            {
                let state = self.state.read().await;
                if let SlotState::Ready { token, fetched_at } = &*state
                    && usable(token, *fetched_at, max_age)
                {
                    tracing::trace!(slot = label, "Token cache hit");
                    return Ok(token.clone());
                }
            }

            let (generation, refresh, joined) = {
                let mut state = self.state.write().await;

                // Another caller may have refreshed or started refreshing while we waited.
                let step = match &*state {
                    SlotState::Ready { token, fetched_at } if usable(token, *fetched_at, max_age) => {
                        Step::Hit(token.clone())
                    }
                    SlotState::Refreshing {
                        generation,
                        refresh,
                    } => match refresh.peek() {
                        None => Step::Join(*generation, refresh.clone()),
                        // Settled, but the caller that drove it never recorded the outcome.
                        Some(Ok((token, fetched_at))) if usable(token, *fetched_at, max_age) => {
                            Step::Promote(token.clone(), *fetched_at)
                        }
                        Some(_) => Step::Start,
                    },
                    _ => Step::Start,
                };

                match step {
                    Step::Hit(token) => return Ok(token),
                    Step::Promote(token, fetched_at) => {
                        *state = SlotState::Ready {
                            token: token.clone(),
                            fetched_at,
                        };
                        return Ok(token);
                    }
                    Step::Join(generation, refresh) => (generation, refresh, true),
                    Step::Start => {
                        tracing::debug!(slot = label, "Token cache miss, refreshing");
                        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                        let refresh = fetch()
                            .map(|r| r.map(|token| (token, Instant::now())).map_err(Arc::new))
                            .boxed()
                            .shared();
                        *state = SlotState::Refreshing {
                            generation,
                            refresh: refresh.clone(),
                        };
                        (generation, refresh, false)
                    }
                }
            };

            let outcome = refresh.await;
            self.record(label, generation, &outcome).await;

            match outcome {
                Ok((token, fetched_at)) => {
                    if joined && may_retry && !usable(&token, fetched_at, max_age) {
                        may_retry = false;
                        continue;
                    }
                    return Ok(token);
                }
                Err(e) => return Err(Error::Shared(e)),
            }
        }
    }

    /// Store a settled refresh unless a newer one has replaced it.
    async fn record(&self, label: &str, generation: u64, outcome: &Fetched) {
        let mut state = self.state.write().await;
        let current = matches!(
            &*state,
            SlotState::Refreshing { generation: g, .. } if *g == generation
        );
        if !current {
            return;
        }
        *state = match outcome {
            Ok((token, fetched_at)) => {
                tracing::debug!(slot = label, expires_at = ?token.expires_at(), "Token refreshed");
                SlotState::Ready {
                    token: token.clone(),
                    fetched_at: *fetched_at,
                }
            }
            Err(e) => {
                tracing::warn!(slot = label, error = %e, "Token refresh failed");
                SlotState::Empty
            }
        };
    }

    async fn clear(&self) {
        *self.state.write().await = SlotState::Empty;
    }
}

fn usable(token: &AccessToken, fetched_at: Instant, max_age: Option<Duration>) -> bool {
    token.is_valid() && max_age.is_none_or(|max| fetched_at.elapsed() < max)
}

/// Caching wrapper around any [`Authorizer`].
///
/// Tokens are refreshed lazily when a caller finds the cached one expired;
/// nothing is refreshed in the background. Auxiliary tenants are cached in
/// independent slots.
pub struct CachedAuthorizer {
    source: Arc<dyn Authorizer>,
    primary: TokenSlot,
    auxiliary: HashMap<String, TokenSlot>,
    auxiliary_tenant_ids: Vec<String>,
    max_age: Option<Duration>,
}

impl CachedAuthorizer {
    pub fn new<A: Authorizer + 'static>(source: A) -> Self {
        Self::from_arc(Arc::new(source))
    }

    /// Wrap an authorizer returned by [`select`](super::select).
    pub fn from_arc(source: Arc<dyn Authorizer>) -> Self {
        let auxiliary_tenant_ids = source.auxiliary_tenant_ids().to_vec();
        let auxiliary = auxiliary_tenant_ids
            .iter()
            .map(|id| (id.clone(), TokenSlot::new()))
            .collect();
        Self {
            source,
            primary: TokenSlot::new(),
            auxiliary,
            auxiliary_tenant_ids,
            max_age: None,
        }
    }

    /// Serve a cached token for at most `max_age`, even if it has no expiry.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// The wrapped authorizer.
    pub fn source(&self) -> &Arc<dyn Authorizer> {
        &self.source
    }

    /// Drop every cached token.
    pub async fn invalidate(&self) {
        self.primary.clear().await;
        for slot in self.auxiliary.values() {
            slot.clear().await;
        }
    }

    /// Like [`token`](Authorizer::token) but gives up waiting at `deadline`.
    ///
    /// An abandoned refresh keeps running for the next caller.
    pub async fn token_with_deadline(&self, deadline: tokio::time::Instant) -> Result<AccessToken> {
        let budget = deadline.saturating_duration_since(tokio::time::Instant::now());
        tokio::time::timeout_at(deadline, self.token())
            .await
            .map_err(|_| Error::Timeout(budget))?
    }

    /// Like [`token`](Authorizer::token) but stops waiting once `cancel` fires.
    pub async fn token_with_cancellation(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.token() => result,
        }
    }
}

#[async_trait]
impl Authorizer for CachedAuthorizer {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn token(&self) -> Result<AccessToken> {
        self.primary
            .get(self.source.name(), self.max_age, || {
                let source = Arc::clone(&self.source);
                async move { source.token().await }.boxed()
            })
            .await
    }

    fn auxiliary_tenant_ids(&self) -> &[String] {
        &self.auxiliary_tenant_ids
    }

    async fn auxiliary_token(&self, tenant_id: &str) -> Result<AccessToken> {
        let slot = self.auxiliary.get(tenant_id).ok_or_else(|| {
            Error::config(format!("auxiliary tenant '{}' is not configured", tenant_id))
        })?;

        slot.get(tenant_id, self.max_age, || {
            let source = Arc::clone(&self.source);
            let tenant = tenant_id.to_string();
            async move { source.auxiliary_token(&tenant).await }.boxed()
        })
        .await
    }
}
