//! Client dispatch: the single consumer of the raw event queue.
//!
//! Each payload is classified into a [`Message`] and fanned out:
//!
//! 1. raw listeners receive the untyped payload,
//! 2. system messages go to system listeners and the [`EventManager`],
//! 3. text, markup and card messages go to text listeners and the
//!    [`CommandManager`].
//!
//! Every handler runs in its own supervised task; the loop never awaits one.
//! Payloads whose `type` maps to no message variant are dropped before any
//! listener sees them.

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, trace, warn};

use bronze_core::{EventReceiver, Gateway, Message, RawEvent};

use crate::command::CommandManager;
use crate::event_manager::EventManager;
use crate::handler::{
    HandlerReturn, MessageListener, RawListener, message_listener, raw_listener,
};
use crate::task::{TaskLabel, spawn_supervised};

/// Routes queued payloads to listeners, commands and event handlers.
pub struct Client {
    gateway: Weak<Gateway>,
    raw_listeners: RwLock<Vec<RawListener>>,
    text_listeners: RwLock<Vec<MessageListener>>,
    system_listeners: RwLock<Vec<MessageListener>>,
    commands: Arc<CommandManager>,
    events: Arc<EventManager>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("raw_listeners", &self.raw_listeners.read().len())
            .field("text_listeners", &self.text_listeners.read().len())
            .field("system_listeners", &self.system_listeners.read().len())
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client bound to `gateway`.
    ///
    /// Messages it builds carry contexts pointing at that gateway.
    pub fn new(
        gateway: Weak<Gateway>,
        commands: Arc<CommandManager>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            gateway,
            raw_listeners: RwLock::new(Vec::new()),
            text_listeners: RwLock::new(Vec::new()),
            system_listeners: RwLock::new(Vec::new()),
            commands,
            events,
        }
    }

    /// The command manager.
    pub fn commands(&self) -> &Arc<CommandManager> {
        &self.commands
    }

    /// The event manager.
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// Adds a listener for every classified payload, untyped.
    pub fn on_raw<F, Fut, R>(&self, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.raw_listeners.write().push(raw_listener(f));
    }

    /// Adds a listener for text, markup and card messages.
    pub fn on_text<F, Fut, R>(&self, f: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.text_listeners.write().push(message_listener(f));
    }

    /// Adds a listener for system messages.
    pub fn on_system<F, Fut, R>(&self, f: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.system_listeners.write().push(message_listener(f));
    }

    /// Classifies one payload and spawns its handlers.
    ///
    /// Returns the supervisor handles of everything spawned. Decode failures
    /// are logged and yield no handles.
    pub fn dispatch(&self, payload: Value) -> Vec<JoinHandle<()>> {
        let raw = match RawEvent::from_value(payload.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable event");
                return Vec::new();
            }
        };
        let kind = raw.kind;
        let msg = match Message::from_raw(raw, self.gateway.clone()) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                trace!(kind, "Dropping event of unmapped type");
                return Vec::new();
            }
            Err(e) => {
                warn!(kind, error = %e, "Dropping event with malformed extra");
                return Vec::new();
            }
        };

        let mut spawned = Vec::new();

        let raw_listeners = self.raw_listeners.read().clone();
        for (index, listener) in raw_listeners.into_iter().enumerate() {
            let payload = payload.clone();
            spawned.push(spawn_supervised(
                TaskLabel::new("raw", index.to_string()),
                async move { listener(payload).await },
            ));
        }

        if let Some(event) = msg.system_event() {
            let system_listeners = self.system_listeners.read().clone();
            for (index, listener) in system_listeners.into_iter().enumerate() {
                let label = TaskLabel::new("system", index.to_string()).with_content(&event.name);
                let msg = msg.clone();
                spawned.push(spawn_supervised(label, async move { listener(msg).await }));
            }
            spawned.extend(self.events.post(event));
        } else if msg.is_text_like() {
            let text_listeners = self.text_listeners.read().clone();
            for (index, listener) in text_listeners.into_iter().enumerate() {
                let label = TaskLabel::new("text", index.to_string()).with_content(msg.plain_text());
                let msg = msg.clone();
                spawned.push(spawn_supervised(label, async move { listener(msg).await }));
            }

            if !self.commands.is_empty() {
                let commands = self.commands.clone();
                let label = TaskLabel::new("command", "engine").with_content(msg.plain_text());
                spawned.push(spawn_supervised(label, async move {
                    commands.handle(&msg).await;
                    Ok::<_, String>(())
                }));
            }
        }

        spawned
    }

    /// Drains `queue` until it closes or `cancel` fires.
    pub async fn run(self: Arc<Self>, mut queue: EventReceiver, cancel: CancellationToken) {
        async move {
            info!("Dispatch loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = queue.recv() => match next {
                        Some(payload) => {
                            self.dispatch(payload);
                        }
                        None => break,
                    },
                }
            }
            info!("Dispatch loop stopped");
        }
        .instrument(info_span!("client_dispatch"))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Args, Command};
    use bronze_core::event::{AddedReaction, DeletedReaction};
    use bronze_core::event_channel;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn text_payload(content: &str) -> Value {
        json!({
            "type": 1,
            "channel_type": "GROUP",
            "target_id": "chan",
            "author_id": "user",
            "content": content,
            "msg_id": "m1",
            "msg_timestamp": 1_700_000_000_000i64,
            "nonce": "",
            "extra": {"guild_id": "g1", "mention": [], "author": {"id": "user", "username": "u"}}
        })
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (c.clone(), c)
    }

    struct Fixture {
        client: Client,
        rolls: Arc<Mutex<Vec<(i64, i64)>>>,
        raw: Arc<AtomicUsize>,
        text: Arc<AtomicUsize>,
        system: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let commands = Arc::new(CommandManager::new(vec!["!".into()]));
        let rolls = Arc::new(Mutex::new(Vec::new()));
        let sink = rolls.clone();
        assert_ok!(commands.register(
            Command::builder("roll")
                .param::<i64>("min")
                .param::<i64>("max")
                .handler(move |_, args: Args| {
                    let sink = sink.clone();
                    async move {
                        sink.lock()
                            .push((args.cloned::<i64>(0).unwrap_or(-1), args.cloned::<i64>(1).unwrap_or(-1)));
                    }
                }),
        ));

        let client = Client::new(Weak::new(), commands, Arc::new(EventManager::new()));

        let (raw, c) = counter();
        client.on_raw(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        let (text, c) = counter();
        client.on_text(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        let (system, c) = counter();
        client.on_system(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        Fixture {
            client,
            rolls,
            raw,
            text,
            system,
        }
    }

    async fn join(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn roll_command_runs_once() {
        let f = fixture();
        join(f.client.dispatch(text_payload("!roll 1 6"))).await;
        assert_eq!(*f.rolls.lock(), [(1, 6)]);
        assert_eq!(f.raw.load(Ordering::SeqCst), 1);
        assert_eq!(f.text.load(Ordering::SeqCst), 1);
        assert_eq!(f.system.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plain_text_reaches_listeners_only() {
        let f = fixture();
        join(f.client.dispatch(text_payload("hello"))).await;
        assert!(f.rolls.lock().is_empty());
        assert_eq!(f.raw.load(Ordering::SeqCst), 1);
        assert_eq!(f.text.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_type_invokes_nothing() {
        let f = fixture();
        let mut payload = text_payload("!roll 1 6");
        payload["type"] = json!(42);
        assert!(f.client.dispatch(payload).is_empty());

        assert!(f.client.dispatch(json!("not an object")).is_empty());
        assert_eq!(f.raw.load(Ordering::SeqCst), 0);
        assert_eq!(f.text.load(Ordering::SeqCst), 0);
        assert!(f.rolls.lock().is_empty());
    }

    #[tokio::test]
    async fn added_reaction_reaches_typed_handler_only() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.client.events().on(move |r: AddedReaction| {
            let sink = sink.clone();
            async move {
                sink.lock().push((r.emoji.name, r.user_id, r.channel_id));
            }
        });
        let (deleted, c) = counter();
        f.client.events().on(move |_: DeletedReaction| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        let payload = json!({
            "type": 255,
            "channel_type": "GROUP",
            "target_id": "chan",
            "author_id": "1",
            "content": "[system]",
            "msg_id": "m2",
            "extra": {
                "type": "added_reaction",
                "body": {
                    "channel_id": "chan",
                    "emoji": {"id": "e", "name": "fire"},
                    "user_id": "u7",
                    "msg_id": "m1"
                }
            }
        });
        join(f.client.dispatch(payload)).await;

        assert_eq!(
            *seen.lock(),
            [("fire".to_string(), "u7".to_string(), "chan".to_string())]
        );
        assert_eq!(deleted.load(Ordering::SeqCst), 0);
        assert_eq!(f.system.load(Ordering::SeqCst), 1);
        assert_eq!(f.text.load(Ordering::SeqCst), 0);
        assert!(f.rolls.lock().is_empty());
    }

    #[tokio::test]
    async fn run_drains_queue_and_stops_on_cancel() {
        let f = fixture();
        let raw = f.raw.clone();
        let client = Arc::new(f.client);
        let (tx, rx) = event_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(client.run(rx, cancel.clone()));

        tx.send(text_payload("one")).unwrap();
        tx.send(json!({"type": 99})).unwrap();
        tx.send(text_payload("two")).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while raw.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn listener_panicking_before_its_future_keeps_the_loop_alive() {
        let f = fixture();
        f.client.on_text(|msg: Message| {
            if msg.plain_text() == "boom" {
                panic!("listener exploded");
            }
            async {}
        });
        let text = f.text.clone();
        let client = Arc::new(f.client);
        let (tx, rx) = event_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(client.run(rx, cancel.clone()));

        tx.send(text_payload("boom")).unwrap();
        tx.send(text_payload("after")).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while text.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap();
    }
}
