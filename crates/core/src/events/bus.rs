use std::{
    any::Any,
    collections::{HashMap, HashSet},
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{EnrichedEvent, EventKind, ProgressEvent};

pub type Listener = Arc<dyn Fn(&EnrichedEvent) + Send + Sync>;

pub struct SubscriptionSpec {
    pub subscriber_id: &'static str,
    pub kinds: Vec<EventKind>,
}

impl SubscriptionSpec {
    pub fn all(subscriber_id: &'static str) -> Self {
        Self {
            subscriber_id,
            kinds: EventKind::ALL.to_vec(),
        }
    }

    pub fn only(subscriber_id: &'static str, kinds: &[EventKind]) -> Self {
        Self {
            subscriber_id,
            kinds: kinds.to_vec(),
        }
    }
}

#[derive(Default)]
pub struct BusMetrics {
    pub published_total: AtomicU64,
    pub unrouted_publish_total: AtomicU64,
    pub listener_faults_total: AtomicU64,
}

impl BusMetrics {
    pub fn record_unrouted(&self, _evt: &'static str) {
        self.unrouted_publish_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_fault(&self) {
        self.listener_faults_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listener_faults(&self) -> u64 {
        self.listener_faults_total.load(Ordering::Relaxed)
    }
}

struct Route {
    route_id: u64,
    subscriber_id: &'static str,
    listener: Listener,
}

type RouteTable = HashMap<EventKind, Vec<Arc<Route>>>;

/// Synchronous publish/subscribe channel for [`ProgressEvent`]s.
///
/// Listeners run inline on the publishing task. A panicking listener is
/// caught and counted in [`BusMetrics`]; the remaining listeners still run.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    session_id: Uuid,
    next_ingest_seq: AtomicU64,
    next_route_id: AtomicU64,
    routes: RwLock<RouteTable>,
    metrics: Arc<BusMetrics>,
}

fn validate(spec: &SubscriptionSpec, routes: &RouteTable) -> Result<()> {
    if spec.subscriber_id.trim().is_empty() {
        anyhow::bail!("empty subscriber_id");
    }
    if spec.kinds.is_empty() {
        anyhow::bail!("subscriber_id={} has no inputs", spec.subscriber_id);
    }

    let mut seen: HashSet<EventKind> = HashSet::new();
    for kind in &spec.kinds {
        if !seen.insert(*kind) {
            anyhow::bail!(
                "subscriber_id={} has duplicate input event_type={}",
                spec.subscriber_id,
                kind.event_type()
            );
        }
    }

    let taken = routes
        .values()
        .flatten()
        .any(|route| route.subscriber_id == spec.subscriber_id);
    if taken {
        anyhow::bail!("duplicate subscriber_id={}", spec.subscriber_id);
    }

    Ok(())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_session(Uuid::new_v4())
    }

    pub fn with_session(session_id: Uuid) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                session_id,
                next_ingest_seq: AtomicU64::new(0),
                next_route_id: AtomicU64::new(0),
                routes: RwLock::new(HashMap::new()),
                metrics: Arc::new(BusMetrics::default()),
            }),
        }
    }

    pub fn publish(&self, event: ProgressEvent) {
        self.dispatch(None, event);
    }

    /// Publishes `event` stamped with the creation run it belongs to.
    pub fn publish_for_run(&self, run_id: Uuid, event: ProgressEvent) {
        self.dispatch(Some(run_id), event);
    }

    fn dispatch(&self, run_id: Option<Uuid>, event: ProgressEvent) {
        let ingest_seq = self.inner.next_ingest_seq.fetch_add(1, Ordering::Relaxed);
        self.inner
            .metrics
            .published_total
            .fetch_add(1, Ordering::Relaxed);

        let kind = event.kind();
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let routes = self
            .inner
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        if routes.is_empty() {
            self.inner.metrics.record_unrouted(kind.event_type());
            return;
        }

        let enriched = EnrichedEvent {
            event_id: Uuid::new_v4(),
            session_id: self.inner.session_id,
            ingest_seq,
            timestamp: SystemTime::now(),
            run_id,
            event,
        };

        for route in routes {
            let delivered = catch_unwind(AssertUnwindSafe(|| (route.listener)(&enriched)));
            if let Err(payload) = delivered {
                self.inner.metrics.record_listener_fault();
                tracing::error!(
                    subscriber_id = route.subscriber_id,
                    event_type = kind.event_type(),
                    "listener panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    /// Registers `listener` for the kinds in `spec`. The registration lives
    /// as long as the returned [`Subscription`].
    pub fn subscribe<F>(&self, spec: SubscriptionSpec, listener: F) -> Result<Subscription>
    where
        F: Fn(&EnrichedEvent) + Send + Sync + 'static,
    {
        let mut routes = self
            .inner
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        validate(&spec, &routes)?;

        let route = Arc::new(Route {
            route_id: self.inner.next_route_id.fetch_add(1, Ordering::Relaxed),
            subscriber_id: spec.subscriber_id,
            listener: Arc::new(listener),
        });
        for kind in &spec.kinds {
            routes.entry(*kind).or_default().push(Arc::clone(&route));
        }

        Ok(Subscription {
            bus: Arc::downgrade(&self.inner),
            route_id: route.route_id,
            subscriber_id: spec.subscriber_id,
        })
    }

    /// Subscribes a listener that forwards every event into an unbounded
    /// channel, for consumers living on another task.
    pub fn subscribe_channel(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<EnrichedEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(spec, move |event| {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(event.clone());
        })?;
        Ok((subscription, rx))
    }

    pub fn subscriber_count(&self) -> usize {
        let routes = self
            .inner
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        routes
            .values()
            .flatten()
            .map(|route| route.route_id)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn metrics(&self) -> Arc<BusMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped listener registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    bus: Weak<EventBusInner>,
    route_id: u64,
    subscriber_id: &'static str,
}

impl Subscription {
    pub fn subscriber_id(&self) -> &'static str {
        self.subscriber_id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut routes = bus.routes.write().unwrap_or_else(PoisonError::into_inner);
        for list in routes.values_mut() {
            list.retain(|route| route.route_id != self.route_id);
        }
        routes.retain(|_, list| !list.is_empty());
    }
}
