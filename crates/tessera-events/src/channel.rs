//! Channel with per-event subscriber lists and a last-value cache.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{ChannelError, ChannelResult};

/// Future returned by an async responder.
///
/// `Ok(Some(_))` is a reply, `Ok(None)` means "nothing to say", and `Err`
/// rejects the emission that awaited it.
pub type AsyncReply = BoxFuture<'static, Result<Option<Value>, String>>;

type Listener = dyn Fn(&Value) + Send + Sync;
type Responder = dyn Fn(&Value) -> Option<Value> + Send + Sync;
type AsyncResponder = dyn Fn(Value) -> AsyncReply + Send + Sync;
type WildcardListener = dyn Fn(&str, &Value) + Send + Sync;

/// Registration handle for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone)]
enum Handler {
    Listen(Arc<Listener>),
    Respond(Arc<Responder>),
    Async(Arc<AsyncResponder>),
}

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct Slot {
    current: Option<Value>,
    subscribers: Vec<Subscription>,
}

struct Inner {
    label: String,
    slots: RwLock<HashMap<String, Slot>>,
    wildcard: RwLock<Vec<(SubscriptionId, Arc<WildcardListener>)>>,
}

/// Publish/subscribe bus owned by one tool (or by the host).
///
/// Cloning a `Channel` yields another handle to the same bus.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.read_slots().len();
        f.debug_struct("Channel")
            .field("label", &self.inner.label)
            .field("events", &events)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create an empty channel. `label` only appears in logs.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                slots: RwLock::new(HashMap::new()),
                wildcard: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Label given at construction.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether two handles point at the same bus.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------

    /// Subscribe a listener to `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(event, Handler::Listen(Arc::new(handler)))
    }

    /// Subscribe a synchronous responder to `event`.
    ///
    /// The first non-null reply becomes the result of [`emit`](Self::emit)
    /// and [`emit_async`](Self::emit_async).
    pub fn on_request<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.subscribe(event, Handler::Respond(Arc::new(handler)))
    }

    /// Subscribe an async responder to `event`.
    ///
    /// [`emit_async`](Self::emit_async) awaits the returned future; a plain
    /// [`emit`](Self::emit) spawns it on the ambient tokio runtime instead.
    pub fn on_async<F, Fut>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, String>> + Send + 'static,
    {
        self.subscribe(
            event,
            Handler::Async(Arc::new(move |payload| handler(payload).boxed())),
        )
    }

    /// Subscribe to every event on this channel.
    ///
    /// Wildcard listeners run after the named subscribers of each emission.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.write_wildcard().push((id, Arc::new(handler)));
        debug!(channel = %self.inner.label, "Wildcard subscriber registered");
        id
    }

    /// Remove a subscriber from `event`.
    ///
    /// Returns `true` if the subscriber was found and removed.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let mut slots = self.write_slots();
        let Some(slot) = slots.get_mut(event) else {
            return false;
        };
        let before = slot.subscribers.len();
        slot.subscribers.retain(|s| s.id != id);
        let removed = slot.subscribers.len() != before;
        if removed {
            debug!(channel = %self.inner.label, event, "Subscriber removed");
        }
        removed
    }

    /// Remove a wildcard subscriber.
    pub fn off_any(&self, id: SubscriptionId) -> bool {
        let mut wildcard = self.write_wildcard();
        let before = wildcard.len();
        wildcard.retain(|(sid, _)| *sid != id);
        wildcard.len() != before
    }

    /// Drop every subscriber and the cached value of `event`.
    pub fn clear(&self, event: &str) {
        if self.write_slots().remove(event).is_some() {
            debug!(channel = %self.inner.label, event, "Event cleared");
        }
    }

    /// Number of named subscribers on `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.read_slots()
            .get(event)
            .map_or(0, |slot| slot.subscribers.len())
    }

    // -----------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------

    /// Cache `payload` for `event` and invoke every subscriber in order.
    ///
    /// A panicking subscriber is logged and skipped. Returns the first
    /// non-null reply from a synchronous responder.
    pub fn emit(&self, event: &str, payload: Value) -> Option<Value> {
        let handlers = self.cache_and_snapshot(event, &payload);
        trace!(channel = %self.inner.label, event, subscribers = handlers.len(), "Emit");

        let mut reply = None;
        for (id, handler) in handlers {
            match handler {
                Handler::Listen(f) => {
                    self.guarded(event, id, || {
                        f(&payload);
                        Some(())
                    });
                },
                Handler::Respond(f) => {
                    let value = self.guarded(event, id, || f(&payload));
                    keep_first(&mut reply, value);
                },
                Handler::Async(f) => {
                    if let Some(fut) = self.guarded(event, id, || Some(f(payload.clone()))) {
                        self.detach(event, fut);
                    }
                },
            }
        }

        self.notify_wildcard(event, &payload);
        reply
    }

    /// Like [`emit`](Self::emit), but awaits every async subscriber.
    ///
    /// All subscribers are started in registration order and then awaited
    /// together. The first non-null reply wins.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SubscriberFailed`] if any async subscriber
    /// rejects or panics. The remaining subscribers still run.
    pub async fn emit_async(&self, event: &str, payload: Value) -> ChannelResult<Option<Value>> {
        let handlers = self.cache_and_snapshot(event, &payload);
        trace!(channel = %self.inner.label, event, subscribers = handlers.len(), "Emit async");

        let mut pending: Vec<AsyncReply> = Vec::with_capacity(handlers.len());
        for (id, handler) in handlers {
            let reply: AsyncReply = match handler {
                Handler::Listen(f) => {
                    self.guarded(event, id, || {
                        f(&payload);
                        Some(())
                    });
                    futures::future::ready(Ok(None)).boxed()
                },
                Handler::Respond(f) => {
                    let value = self.guarded(event, id, || f(&payload));
                    futures::future::ready(Ok(value)).boxed()
                },
                Handler::Async(f) => match self.guarded(event, id, || Some(f(payload.clone()))) {
                    Some(fut) => AssertUnwindSafe(fut)
                        .catch_unwind()
                        .map(|res| res.unwrap_or_else(|_| Err("subscriber panicked".to_string())))
                        .boxed(),
                    None => futures::future::ready(Ok(None)).boxed(),
                },
            };
            pending.push(reply);
        }

        let mut reply = None;
        let mut failure = None;
        for outcome in join_all(pending).await {
            match outcome {
                Ok(value) => keep_first(&mut reply, value),
                Err(message) => {
                    warn!(channel = %self.inner.label, event, error = %message, "Async subscriber rejected");
                    failure.get_or_insert(message);
                },
            }
        }

        self.notify_wildcard(event, &payload);

        match failure {
            Some(message) => Err(ChannelError::SubscriberFailed {
                event: event.to_string(),
                message,
            }),
            None => Ok(reply),
        }
    }

    /// Emit the negation of the cached boolean for `event`.
    ///
    /// Anything other than a cached `true` flips to `true`. Returns the
    /// emitted value.
    pub fn toggle(&self, event: &str) -> bool {
        let next = !matches!(self.get_data(event), Some(Value::Bool(true)));
        self.emit(event, Value::Bool(next));
        next
    }

    /// Cached payload for `event`, without emitting.
    #[must_use]
    pub fn get_data(&self, event: &str) -> Option<Value> {
        self.read_slots()
            .get(event)
            .and_then(|slot| slot.current.clone())
    }

    /// Alias of [`get_data`](Self::get_data).
    #[must_use]
    pub fn get_current_data(&self, event: &str) -> Option<Value> {
        self.get_data(event)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn subscribe(&self, event: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.write_slots()
            .entry(event.to_string())
            .or_default()
            .subscribers
            .push(Subscription { id, handler });
        debug!(channel = %self.inner.label, event, "Subscriber registered");
        id
    }

    /// Store the payload and copy the handler list so that callbacks may
    /// subscribe or unsubscribe without deadlocking.
    fn cache_and_snapshot(&self, event: &str, payload: &Value) -> Vec<(SubscriptionId, Handler)> {
        let mut slots = self.write_slots();
        let slot = slots.entry(event.to_string()).or_default();
        slot.current = Some(payload.clone());
        slot.subscribers
            .iter()
            .map(|s| (s.id, s.handler.clone()))
            .collect()
    }

    fn guarded<T>(
        &self,
        event: &str,
        id: SubscriptionId,
        f: impl FnOnce() -> Option<T>,
    ) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    channel = %self.inner.label,
                    event,
                    subscriber_id = ?id,
                    error = ?e,
                    "Subscriber panicked"
                );
                None
            },
        }
    }

    fn detach(&self, event: &str, fut: AsyncReply) {
        let label = self.inner.label.clone();
        let event = event.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(message) = fut.await {
                        warn!(channel = %label, event = %event, error = %message, "Detached subscriber failed");
                    }
                });
            },
            Err(_) => {
                warn!(channel = %label, event = %event, "No runtime available, async subscriber dropped");
            },
        }
    }

    fn notify_wildcard(&self, event: &str, payload: &Value) {
        let listeners: Vec<_> = self
            .read_wildcard()
            .iter()
            .map(|(id, f)| (*id, Arc::clone(f)))
            .collect();
        for (id, f) in listeners {
            self.guarded(event, id, || {
                f(event, payload);
                Some(())
            });
        }
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.inner.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_wildcard(&self) -> RwLockReadGuard<'_, Vec<(SubscriptionId, Arc<WildcardListener>)>> {
        self.inner
            .wildcard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_wildcard(&self) -> RwLockWriteGuard<'_, Vec<(SubscriptionId, Arc<WildcardListener>)>> {
        self.inner
            .wildcard
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn keep_first(reply: &mut Option<Value>, value: Option<Value>) {
    if reply.is_none() {
        *reply = value.filter(|v| !v.is_null());
    }
}
