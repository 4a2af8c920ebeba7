//! Typed system-event handlers.
//!
//! Handlers are keyed by [`EventType`]. Posting a [`SystemEvent`] narrows it to
//! its concrete body and spawns every handler registered for that type; an
//! unknown discriminator posts nothing.
//!
//! ```rust,ignore
//! events.on(|reaction: AddedReaction| async move {
//!     tracing::info!(user = %reaction.user_id, emoji = %reaction.emoji.name, "reaction");
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use bronze_core::{EventType, SystemEvent, TypedEvent};

use crate::error::EventRegisterError;
use crate::handler::{HandlerFuture, HandlerReturn};
use crate::task::{TaskLabel, spawn_supervised};

type EventHandler = Arc<dyn Fn(SystemEvent) -> HandlerFuture + Send + Sync>;

/// Event type → ordered handler list.
#[derive(Default)]
pub struct EventManager {
    handlers: RwLock<HashMap<EventType, Vec<EventHandler>>>,
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_map()
            .entries(handlers.iter().map(|(ty, list)| (ty.as_str(), list.len())))
            .finish()
    }
}

impl EventManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the event body type `E`.
    ///
    /// The handler only ever sees events of `E`'s discriminator.
    pub fn on<E, F, Fut, R>(&self, f: F)
    where
        E: TypedEvent,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        let handler: EventHandler = Arc::new(move |event: SystemEvent| match event.get::<E>() {
            Some(body) => f(body.clone()).map(HandlerReturn::into_result).boxed(),
            None => future::ready(Ok(())).boxed(),
        });
        self.insert(E::EVENT_TYPE, handler);
    }

    /// Registers a handler for the wire name `name`, receiving the whole event.
    ///
    /// An unknown name is logged and the handler is not registered.
    pub fn on_type<F, Fut, R>(&self, name: &str, f: F) -> Result<(), EventRegisterError>
    where
        F: Fn(SystemEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        let Ok(ty) = name.parse::<EventType>() else {
            warn!(event = name, "Rejected handler for unknown system event type");
            return Err(EventRegisterError::UnknownEventType(name.to_string()));
        };
        let handler: EventHandler =
            Arc::new(move |event| f(event).map(HandlerReturn::into_result).boxed());
        self.insert(ty, handler);
        Ok(())
    }

    fn insert(&self, ty: EventType, handler: EventHandler) {
        debug!(event = %ty, "Registered event handler");
        self.handlers.write().entry(ty).or_default().push(handler);
    }

    /// Number of handlers registered for `ty`.
    pub fn handler_count(&self, ty: EventType) -> usize {
        self.handlers.read().get(&ty).map_or(0, Vec::len)
    }

    /// Spawns every handler registered for the event's type.
    ///
    /// Each handler runs in its own supervised task; failures are logged and
    /// never reach the caller or sibling handlers.
    pub fn post(&self, event: &SystemEvent) -> Vec<JoinHandle<()>> {
        let Some(ty) = event.event_type() else {
            trace!(event = %event.name, "No handlers for unknown system event");
            return Vec::new();
        };
        let handlers = self.handlers.read().get(&ty).cloned().unwrap_or_default();

        handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                spawn_supervised(TaskLabel::new("event", ty.as_str()), async move {
                    handler(event).await
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_core::event::{AddedReaction, DeletedReaction};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reaction_event() -> SystemEvent {
        SystemEvent::from_extra(json!({
            "type": "added_reaction",
            "body": {
                "channel_id": "c1",
                "emoji": {"id": "e1", "name": "thumbsup"},
                "user_id": "u1",
                "msg_id": "m1"
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn typed_handlers_only_see_their_type() {
        let events = EventManager::new();
        let added = Arc::new(AtomicUsize::new(0));
        let deleted = Arc::new(AtomicUsize::new(0));

        let counter = added.clone();
        events.on(move |reaction: AddedReaction| {
            let counter = counter.clone();
            async move {
                assert_eq!(reaction.user_id, "u1");
                assert_eq!(reaction.emoji.name, "thumbsup");
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let counter = deleted.clone();
        events.on(move |_: DeletedReaction| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for handle in events.post(&reaction_event()) {
            handle.await.unwrap();
        }
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_handler_does_not_affect_siblings() {
        let events = EventManager::new();
        let calls = Arc::new(AtomicUsize::new(0));

        events.on(|_: AddedReaction| async { Err::<(), _>("broken") });
        let counter = calls.clone();
        events.on(move |_: AddedReaction| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for handle in events.post(&reaction_event()) {
            handle.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let events = EventManager::new();
        let err = events
            .on_type("no_such_event", |_| async {})
            .unwrap_err();
        assert_eq!(err, EventRegisterError::UnknownEventType("no_such_event".into()));
        assert!(events.on_type("added_reaction", |_| async {}).is_ok());
        assert_eq!(events.handler_count(EventType::AddedReaction), 1);
    }

    #[tokio::test]
    async fn unknown_events_post_nothing() {
        let events = EventManager::new();
        events.on(|_: AddedReaction| async {});
        let unknown = SystemEvent::from_extra(json!({"type": "mystery", "body": {}})).unwrap();
        assert!(events.post(&unknown).is_empty());
    }

    #[tokio::test]
    async fn handler_panicking_before_its_future_is_contained() {
        let events = EventManager::new();
        let calls = Arc::new(AtomicUsize::new(0));

        events.on(|reaction: AddedReaction| {
            if reaction.user_id == "u1" {
                panic!("handler exploded");
            }
            async {}
        });
        let counter = calls.clone();
        events.on(move |_: AddedReaction| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let handles = events.post(&reaction_event());
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
