//! Bounded in-flight request gate shared by every conversation.
//!
//! The gate wraps a tokio semaphore, which hands out permits in the order
//! they were requested. Conversations hold a cloned handle; the permit is
//! released when the submission finishes or its future is dropped.

use async_trait::async_trait;
use ragent_core::error::ProviderError;
use ragent_core::message::Conversation;
use ragent_core::provider::{Completion, GenerationConfig, GenerationProvider};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// A FIFO limit on concurrent provider submissions.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGate {
    /// A gate admitting at most `limit` submissions at once (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot. Waiters are served in arrival order.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ProviderError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::Unavailable("provider gate closed".into()))
    }

    /// Stop admitting submissions; pending and future waiters fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// A provider whose submissions pass through a [`ConcurrencyGate`].
pub struct GatedProvider<P> {
    inner: P,
    gate: ConcurrencyGate,
}

impl<P: GenerationProvider> GatedProvider<P> {
    pub fn new(inner: P, gate: ConcurrencyGate) -> Self {
        Self { inner, gate }
    }

    /// A handle to the shared gate.
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }
}

#[async_trait]
impl<P: GenerationProvider> GenerationProvider for GatedProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn submit(
        &self,
        conversation: &Conversation,
        config: &GenerationConfig,
    ) -> Result<Completion, ProviderError> {
        let _permit = self.gate.acquire().await?;
        trace!(
            provider = self.inner.name(),
            available = self.gate.available(),
            "Gate admitted submission"
        );
        self.inner.submit(conversation, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the peak number of concurrent submissions.
    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl SlowProvider {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn submit(
            &self,
            _conversation: &Conversation,
            config: &GenerationConfig,
        ) -> Result<Completion, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(config.model.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Completion::new("done", config.model.clone()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit() {
        let provider = Arc::new(GatedProvider::new(SlowProvider::new(), ConcurrencyGate::new(2)));
        let conv = Arc::new(Conversation::new());

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let provider = Arc::clone(&provider);
                let conv = Arc::clone(&conv);
                tokio::spawn(async move {
                    provider
                        .submit(&conv, &GenerationConfig::new(format!("m{i}")))
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(provider.inner.peak.load(Ordering::SeqCst), 2);
        assert_eq!(provider.gate().available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_served_in_arrival_order() {
        let gate = ConcurrencyGate::new(1);
        let provider = Arc::new(GatedProvider::new(SlowProvider::new(), gate.clone()));
        let conv = Arc::new(Conversation::new());

        // Hold the only permit so every submission queues.
        let held = gate.acquire().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let provider = Arc::clone(&provider);
            let conv = Arc::clone(&conv);
            handles.push(tokio::spawn(async move {
                provider
                    .submit(&conv, &GenerationConfig::new(format!("m{i}")))
                    .await
            }));
            // Let each task reach the semaphore queue before spawning the next.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let order = provider.inner.order.lock().unwrap().clone();
        assert_eq!(order, vec!["m0", "m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn closed_gate_is_unavailable() {
        let gate = ConcurrencyGate::new(1);
        gate.close();
        let provider = GatedProvider::new(SlowProvider::new(), gate);
        let err = provider
            .submit(&Conversation::new(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(ConcurrencyGate::new(0).limit(), 1);
    }
}
