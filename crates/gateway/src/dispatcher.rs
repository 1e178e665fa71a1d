//! Turns envelopes into records and hands them to consumers.
//!
//! Classification runs on the caller's task. Delivery does not: every
//! classified record becomes two independent jobs on the [`WorkPool`], one
//! for the observer and one for the plugin fan-out, and `ingest_async`
//! returns as soon as both are queued.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::sync::OnceCell,
    tracing::{debug, warn},
};

use {
    wxhook_config::DispatchConfig,
    wxhook_messages::{AttachmentResolver, ClassifierChain, Envelope, MessageRecord},
    wxhook_plugins::PluginRegistry,
};

use crate::pool::WorkPool;

/// The single external consumer that sees every classified record.
#[async_trait]
pub trait MessageObserver: Send + Sync {
    async fn on_message(&self, record: Arc<MessageRecord>) -> anyhow::Result<()>;
}

struct FnObserver<F>(F);

#[async_trait]
impl<F, Fut> MessageObserver for FnObserver<F>
where
    F: Fn(Arc<MessageRecord>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn on_message(&self, record: Arc<MessageRecord>) -> anyhow::Result<()> {
        (self.0)(record).await
    }
}

/// Wrap an async closure as an observer.
pub fn observer_fn<F, Fut>(f: F) -> Arc<dyn MessageObserver>
where
    F: Fn(Arc<MessageRecord>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnObserver(f))
}

struct Shared {
    chain: ClassifierChain,
    observer: RwLock<Option<Arc<dyn MessageObserver>>>,
    plugins: Arc<PluginRegistry>,
    resolver: Option<Arc<dyn AttachmentResolver>>,
    pool: WorkPool,
    invocation_timeout: Option<Duration>,
}

/// Cheap to clone; clones share the chain, the pool and the registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Shared>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Install the observer, replacing any previous one. Jobs already queued
    /// keep the observer they were created with.
    pub fn register_observer(&self, observer: Arc<dyn MessageObserver>) {
        *self
            .inner
            .observer
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    /// Classify without notifying anyone. Never performs I/O.
    pub fn ingest(&self, envelope: &Envelope) -> Option<MessageRecord> {
        self.inner.chain.classify(envelope)
    }

    /// Classify, then queue delivery to the observer and to the plugins.
    ///
    /// Returns the record as classified, before any attachment URL is
    /// resolved. Never waits on the pool: a burst beyond the queue capacity
    /// is held until workers free up. Delivery failures are logged and never
    /// reach the caller.
    pub fn ingest_async(&self, envelope: Envelope) -> Option<Arc<MessageRecord>> {
        let record = Arc::new(self.ingest(&envelope)?);
        let message_id = record.header.message_id.clone();
        let variant = record.variant();
        debug!(message_id = %message_id, %variant, "message classified");

        let pending = Arc::new(PendingRecord {
            record: Arc::clone(&record),
            resolved: OnceCell::new(),
            resolver: self.inner.resolver.clone(),
            timeout: self.inner.invocation_timeout,
        });

        let observer = self
            .inner
            .observer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(observer) = observer {
            let pending = Arc::clone(&pending);
            let timeout = self.inner.invocation_timeout;
            let label = format!("observer message_id={message_id} variant={variant}");
            let job = async move {
                let record = pending.get().await;
                let call = observer.on_message(record);
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {limit:?}"))),
                    None => call.await,
                }
            };
            if let Err(e) = self.inner.pool.submit(label, job) {
                warn!(message_id = %message_id, %variant, error = %e, "observer delivery dropped");
            }
        }

        let plugins = Arc::clone(&self.inner.plugins);
        let label = format!("plugins message_id={message_id} variant={variant}");
        let job = async move {
            let record = pending.get().await;
            let summary = plugins.dispatch(&record).await;
            debug!(
                message_id = %record.header.message_id,
                matched = summary.matched,
                failed = summary.failed,
                "plugin fan-out finished"
            );
            Ok(())
        };
        if let Err(e) = self.inner.pool.submit(label, job) {
            warn!(message_id = %message_id, %variant, error = %e, "plugin delivery dropped");
        }

        Some(record)
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.inner.plugins
    }

    pub fn chain(&self) -> &ClassifierChain {
        &self.inner.chain
    }

    pub fn pool(&self) -> &WorkPool {
        &self.inner.pool
    }

    /// Stop accepting work and wait for queued deliveries to finish.
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }
}

/// A classified record whose attachment URL is resolved at most once, by
/// whichever delivery job gets to it first.
struct PendingRecord {
    record: Arc<MessageRecord>,
    resolved: OnceCell<Arc<MessageRecord>>,
    resolver: Option<Arc<dyn AttachmentResolver>>,
    timeout: Option<Duration>,
}

impl PendingRecord {
    async fn get(&self) -> Arc<MessageRecord> {
        let (Some(resolver), Some(kind)) = (&self.resolver, self.record.media_kind()) else {
            return Arc::clone(&self.record);
        };
        let record = self
            .resolved
            .get_or_init(|| async {
                let message_id = self.record.header.message_id.as_str();
                let markup = self.record.markup().unwrap_or_default();
                let call = resolver.resolve(kind, markup, message_id);
                let outcome = match self.timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {limit:?}"))),
                    None => call.await,
                };
                match outcome {
                    Ok(url) => Arc::new(self.record.with_download_url(url)),
                    Err(e) => {
                        warn!(message_id, %kind, error = %e, "attachment resolution failed");
                        Arc::clone(&self.record)
                    },
                }
            })
            .await;
        Arc::clone(record)
    }
}

/// Assembles a [`Dispatcher`]. Must be built inside a Tokio runtime, since
/// building starts the pool's workers.
pub struct DispatcherBuilder {
    chain: ClassifierChain,
    plugins: Option<Arc<PluginRegistry>>,
    resolver: Option<Arc<dyn AttachmentResolver>>,
    workers: usize,
    queue_capacity: usize,
    invocation_timeout: Option<Duration>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl DispatcherBuilder {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            chain: ClassifierChain::builtin(),
            plugins: None,
            resolver: None,
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            invocation_timeout: config.invocation_timeout(),
        }
    }

    pub fn chain(mut self, chain: ClassifierChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn AttachmentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Upper bound for one observer call or one attachment resolution.
    /// Plugin handlers are bounded by the registry's own timeout.
    pub fn invocation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn build(self) -> Dispatcher {
        let plugins = self.plugins.unwrap_or_else(|| {
            Arc::new(PluginRegistry::new().with_invocation_timeout(self.invocation_timeout))
        });
        Dispatcher {
            inner: Arc::new(Shared {
                chain: self.chain,
                observer: RwLock::new(None),
                plugins,
                resolver: self.resolver,
                pool: WorkPool::new(self.workers, self.queue_capacity),
                invocation_timeout: self.invocation_timeout,
            }),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        serde_json::json,
        tokio::sync::{Semaphore, mpsc},
        wxhook_messages::{MediaKind, MessageVariant},
        wxhook_plugins::Plugin,
    };

    use super::*;

    fn text(content: &str) -> Envelope {
        Envelope::new(json!({
            "typename": "AddMsg",
            "wxid": "wxid_self",
            "payload": {
                "msg_id": 7,
                "sub_type": 1,
                "content": content,
                "from": "wxid_a",
                "to": "wxid_self"
            }
        }))
    }

    fn image() -> Envelope {
        Envelope::new(json!({
            "typename": "AddMsg",
            "payload": {
                "msg_id": 8,
                "sub_type": 3,
                "content": "<msg><img aeskey=\"k\" cdnmidimgurl=\"c\" md5=\"m\" length=\"10\"/></msg>",
                "from": "wxid_a",
                "to": "wxid_self"
            }
        }))
    }

    /// Forwards every record it is offered to a channel.
    struct Forward {
        name: &'static str,
        tx: mpsc::UnboundedSender<(String, Arc<MessageRecord>)>,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for Forward {
        fn name(&self) -> &str {
            self.name
        }

        fn matches(&self, _record: &MessageRecord) -> bool {
            true
        }

        async fn handle(&self, record: &MessageRecord) -> anyhow::Result<()> {
            self.tx
                .send((self.name.to_string(), Arc::new(record.clone())))
                .unwrap();
            if self.fail {
                anyhow::bail!("{} failed on purpose", self.name);
            }
            Ok(())
        }
    }

    struct StubResolver {
        calls: AtomicUsize,
        seen: Mutex<Vec<(MediaKind, String, String)>>,
        fail: bool,
    }

    impl StubResolver {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl AttachmentResolver for StubResolver {
        async fn resolve(
            &self,
            kind: MediaKind,
            markup: &str,
            message_id: &str,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((kind, markup.to_string(), message_id.to_string()));
            if self.fail {
                anyhow::bail!("gateway unavailable");
            }
            Ok(format!("https://cdn.example/{message_id}"))
        }
    }

    fn registry_with(plugins: Vec<Forward>) -> Arc<PluginRegistry> {
        let registry = Arc::new(PluginRegistry::new());
        for plugin in plugins {
            let name = plugin.name;
            registry.register(Arc::new(plugin)).unwrap();
            registry.enable(name).unwrap();
        }
        registry
    }

    fn channel_observer(tx: mpsc::UnboundedSender<Arc<MessageRecord>>) -> Arc<dyn MessageObserver> {
        observer_fn(move |record| {
            let tx = tx.clone();
            async move {
                tx.send(record).unwrap();
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn ingest_classifies_without_delivering() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder().build();
        dispatcher.register_observer(channel_observer(tx));

        let record = dispatcher.ingest(&text("hello")).unwrap();
        assert_eq!(record.variant(), MessageVariant::Text);
        assert_eq!(record.text(), Some("hello"));

        dispatcher.shutdown().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ingest_async_delivers_to_observer_and_plugins() {
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let (plug_tx, mut plug_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder()
            .plugins(registry_with(vec![Forward {
                name: "forward",
                tx: plug_tx,
                fail: false,
            }]))
            .build();
        dispatcher.register_observer(channel_observer(obs_tx));

        let returned = dispatcher.ingest_async(text("hello")).unwrap();
        assert_eq!(returned.variant(), MessageVariant::Text);

        let observed = obs_rx.recv().await.unwrap();
        let (name, fanned) = plug_rx.recv().await.unwrap();
        assert_eq!(*observed, *returned);
        assert_eq!(name, "forward");
        assert_eq!(*fanned, *returned);

        dispatcher.shutdown().await;
        assert!(obs_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unclassifiable_envelope_submits_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder().build();
        dispatcher.register_observer(channel_observer(tx));

        let heartbeat = Envelope::new(json!({"typename": "Heartbeat"}));
        assert!(dispatcher.ingest_async(heartbeat).is_none());

        dispatcher.shutdown().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn observer_registration_is_last_write_wins() {
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder().build();
        dispatcher.register_observer(channel_observer(first_tx));
        dispatcher.register_observer(channel_observer(second_tx));

        dispatcher.ingest_async(text("hi"));
        dispatcher.shutdown().await;

        assert!(second_rx.try_recv().is_ok());
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failing_observer_does_not_stop_plugins() {
        let (plug_tx, mut plug_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder()
            .workers(1)
            .plugins(registry_with(vec![
                Forward {
                    name: "broken",
                    tx: plug_tx.clone(),
                    fail: true,
                },
                Forward {
                    name: "healthy",
                    tx: plug_tx,
                    fail: false,
                },
            ]))
            .build();
        dispatcher.register_observer(observer_fn(|_| async { anyhow::bail!("observer down") }));

        dispatcher.ingest_async(text("one"));
        dispatcher.ingest_async(text("two"));
        dispatcher.shutdown().await;

        let mut names = Vec::new();
        while let Ok((name, _)) = plug_rx.try_recv() {
            names.push(name);
        }
        assert_eq!(names, ["broken", "healthy", "broken", "healthy"]);
    }

    #[tokio::test]
    async fn panicking_observer_is_contained() {
        let (plug_tx, mut plug_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder()
            .workers(1)
            .plugins(registry_with(vec![Forward {
                name: "forward",
                tx: plug_tx,
                fail: false,
            }]))
            .build();
        dispatcher.register_observer(observer_fn(|_| async { panic!("observer exploded") }));

        dispatcher.ingest_async(text("a"));
        dispatcher.ingest_async(text("b"));
        dispatcher.shutdown().await;

        assert_eq!(std::iter::from_fn(|| plug_rx.try_recv().ok()).count(), 2);
    }

    #[tokio::test]
    async fn attachment_is_resolved_once_for_both_consumers() {
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let (plug_tx, mut plug_rx) = mpsc::unbounded_channel();
        let resolver = StubResolver::new(false);
        let dispatcher = Dispatcher::builder()
            .resolver(resolver.clone())
            .plugins(registry_with(vec![Forward {
                name: "forward",
                tx: plug_tx,
                fail: false,
            }]))
            .build();
        dispatcher.register_observer(channel_observer(obs_tx));

        let returned = dispatcher.ingest_async(image()).unwrap();
        assert_eq!(returned.download_url(), None);
        dispatcher.shutdown().await;

        let observed = obs_rx.try_recv().unwrap();
        let (_, fanned) = plug_rx.try_recv().unwrap();
        assert_eq!(observed.download_url(), Some("https://cdn.example/8"));
        assert_eq!(fanned.download_url(), Some("https://cdn.example/8"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        let seen = resolver.seen.lock().unwrap();
        assert_eq!(seen[0].0, MediaKind::Image);
        assert!(seen[0].1.starts_with("<msg>"));
        assert_eq!(seen[0].2, "8");
    }

    #[tokio::test]
    async fn failed_resolution_leaves_url_empty() {
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder()
            .resolver(StubResolver::new(true))
            .build();
        dispatcher.register_observer(channel_observer(obs_tx));

        dispatcher.ingest_async(image());
        dispatcher.shutdown().await;

        let observed = obs_rx.try_recv().unwrap();
        assert_eq!(observed.variant(), MessageVariant::Image);
        assert_eq!(observed.download_url(), None);
    }

    #[tokio::test]
    async fn records_without_attachments_skip_the_resolver() {
        let resolver = StubResolver::new(false);
        let dispatcher = Dispatcher::builder().resolver(resolver.clone()).build();
        dispatcher.register_observer(observer_fn(|_| async { Ok(()) }));

        dispatcher.ingest_async(text("no media"));
        assert!(dispatcher.ingest(&image()).is_some());
        dispatcher.shutdown().await;

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_observer_times_out() {
        let (plug_tx, mut plug_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder()
            .workers(1)
            .invocation_timeout(Some(Duration::from_secs(1)))
            .plugins(registry_with(vec![Forward {
                name: "forward",
                tx: plug_tx,
                fail: false,
            }]))
            .build();
        dispatcher.register_observer(observer_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }));

        dispatcher.ingest_async(text("slow"));
        dispatcher.shutdown().await;

        assert!(plug_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn burst_larger_than_queue_is_fully_delivered() {
        let (plug_tx, mut plug_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder()
            .plugins(registry_with(vec![Forward {
                name: "forward",
                tx: plug_tx,
                fail: false,
            }]))
            .workers(1)
            .queue_capacity(2)
            .build();

        // Hold the only worker inside the first observer call while the
        // burst arrives.
        let gate = Arc::new(Semaphore::new(0));
        let observed = Arc::new(AtomicUsize::new(0));
        let (gate_ref, observed_ref) = (Arc::clone(&gate), Arc::clone(&observed));
        dispatcher.register_observer(observer_fn(move |_record| {
            let gate = Arc::clone(&gate_ref);
            let observed = Arc::clone(&observed_ref);
            async move {
                let _permit = gate.acquire().await?;
                observed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        for i in 0..5 {
            assert!(dispatcher.ingest_async(text(&format!("burst {i}"))).is_some());
        }
        assert!(dispatcher.pool().queued() > dispatcher.pool().queue_capacity());

        gate.add_permits(5);
        dispatcher.shutdown().await;

        assert_eq!(observed.load(Ordering::SeqCst), 5);
        let mut fanned = 0;
        while plug_rx.try_recv().is_ok() {
            fanned += 1;
        }
        assert_eq!(fanned, 5);
        assert_eq!(dispatcher.pool().queued(), 0);
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::builder().build();
        dispatcher.register_observer(channel_observer(tx));
        dispatcher.shutdown().await;

        assert!(dispatcher.ingest_async(text("late")).is_some());
        assert!(rx.try_recv().is_err());
    }
}
