//! The bot facade.
//!
//! A [`Bot`] owns the gateway and the client dispatch loop, and is the one
//! object user code configures:
//!
//! ```rust,ignore
//! use bronze_runtime::Bot;
//! use bronze_framework::Command;
//!
//! let bot = Bot::load()?;
//! bot.command(Command::builder("ping").handler(|msg, _| async move {
//!     msg.reply("pong").await
//! }))?;
//! bot.run().await?;
//! ```
//!
//! [`Bot::run`] starts the receiver and the dispatch loop as two tasks joined
//! only by the event queue, then waits for Ctrl+C, SIGTERM or
//! [`Bot::shutdown_token`] cancellation.

use std::any::Any;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bronze_core::{
    Gateway, Message, Method, Receiver, Requester, SystemEvent, TypedEvent, User, event_channel,
};
use bronze_framework::{
    Client, CommandBuilder, CommandManager, EventManager, HandlerReturn, TaskLabel,
    spawn_supervised,
};

use crate::config::{BotConfig, BronzeConfig, ConfigLoader, TransportConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Lifecycle hook; receives the gateway so it can call the API.
pub type Hook = Arc<dyn Fn(Arc<Gateway>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// A configured bot: gateway, dispatch client and lifecycle hooks.
pub struct Bot {
    config: BronzeConfig,
    gateway: Arc<Gateway>,
    client: Arc<Client>,
    startup_hooks: Mutex<Vec<Hook>>,
    shutdown_hooks: Mutex<Vec<Hook>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("gateway", &self.gateway)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Loads configuration from the working directory, the user config
    /// directory and the environment, then builds the bot.
    pub fn load() -> RuntimeResult<Self> {
        let config = ConfigLoader::new()
            .with_current_dir()
            .with_user_config_dir()
            .load()?;
        Self::from_config(&config)
    }

    /// Validates `config`, installs logging and wires every component.
    pub fn from_config(config: &BronzeConfig) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        let gateway = build_gateway(&config.bot)?;
        info!(
            transport = config.bot.transport.kind(),
            api = %config.bot.api.base_url,
            "Bot initialized from configuration"
        );

        Ok(Self::assemble(config.clone(), gateway))
    }

    /// Builds a bot around an existing gateway.
    ///
    /// Logging is left untouched; `prefixes` become the default command
    /// prefix set.
    pub fn with_gateway(gateway: Arc<Gateway>, prefixes: Vec<String>) -> Self {
        let mut config = BronzeConfig::default();
        config.bot.command.prefixes = prefixes;
        Self::assemble(config, gateway)
    }

    fn assemble(config: BronzeConfig, gateway: Arc<Gateway>) -> Self {
        let commands = Arc::new(CommandManager::new(config.bot.command.prefixes.clone()));
        let events = Arc::new(EventManager::new());
        let client = Arc::new(Client::new(Arc::downgrade(&gateway), commands, events));
        Self {
            config,
            gateway,
            client,
            startup_hooks: Mutex::new(Vec::new()),
            shutdown_hooks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a command; trigger conflicts fail here, before any message
    /// is processed.
    pub fn command(&self, builder: CommandBuilder) -> RuntimeResult<()> {
        self.client.commands().register(builder)?;
        Ok(())
    }

    /// Registers a converter for command parameters of type `T`.
    pub fn register_converter<T, F, E>(&self, convert: F)
    where
        T: Any + Send + Sync,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.client.commands().register_converter::<T, F, E>(convert);
    }

    /// Registers `T::from_str` as the converter for `T`.
    pub fn register_from_str<T>(&self)
    where
        T: FromStr + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.client.commands().register_from_str::<T>();
    }

    /// Registers a handler for the system event body `E`.
    pub fn on_event<E, F, Fut, R>(&self, f: F)
    where
        E: TypedEvent,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.client.events().on(f);
    }

    /// Registers a handler for a system event by wire name.
    pub fn on_event_type<F, Fut, R>(&self, name: &str, f: F) -> RuntimeResult<()>
    where
        F: Fn(SystemEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.client.events().on_type(name, f)?;
        Ok(())
    }

    /// Adds a listener for every classified payload.
    pub fn on_raw<F, Fut, R>(&self, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.client.on_raw(f);
    }

    /// Adds a listener for text, markup and card messages.
    pub fn on_text<F, Fut, R>(&self, f: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.client.on_text(f);
    }

    /// Adds a listener for system messages.
    pub fn on_system<F, Fut, R>(&self, f: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.client.on_system(f);
    }

    /// Adds a hook run before the receiver starts.
    pub fn on_startup<F, Fut, R>(&self, f: F)
    where
        F: Fn(Arc<Gateway>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.startup_hooks.lock().push(hook(f));
    }

    /// Adds a hook run after the receiver and dispatch loop have stopped.
    pub fn on_shutdown<F, Fut, R>(&self, f: F)
    where
        F: Fn(Arc<Gateway>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.shutdown_hooks.lock().push(hook(f));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration this bot was built from.
    pub fn config(&self) -> &BronzeConfig {
        &self.config
    }

    /// The gateway holding the receiver and requester.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// The dispatch client.
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Registered commands.
    pub fn commands(&self) -> &Arc<CommandManager> {
        self.client.commands()
    }

    /// Typed system-event handlers.
    pub fn events(&self) -> &Arc<EventManager> {
        self.client.events()
    }

    /// Cancelling this token stops [`Bot::run`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Fetches the bot's own account (`user/me`).
    pub async fn fetch_me(&self) -> RuntimeResult<User> {
        let data = self.gateway.request(Method::Get, "user/me", Value::Null).await?;
        serde_json::from_value(data).map_err(|e| RuntimeError::Api(e.into()))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Runs until a shutdown signal, token cancellation or receiver exit.
    ///
    /// Returns the receiver's error if it stopped on its own with one.
    pub async fn run(&self) -> RuntimeResult<()> {
        let token = self.shutdown.clone();
        self.run_hooks(&self.startup_hooks, "startup").await;

        let (tx, rx) = event_channel();
        let dispatch = tokio::spawn(self.client.clone().run(rx, token.clone()));
        let gateway = self.gateway.clone();
        let cancel = token.clone();
        let mut receiver = tokio::spawn(async move { gateway.run(tx, cancel).await });

        info!(
            receiver = self.gateway.receiver_name(),
            commands = self.commands().len(),
            "Bot is running, press Ctrl+C to stop"
        );

        let finished = tokio::select! {
            _ = wait_for_signal() => None,
            _ = token.cancelled() => {
                info!("Shutdown requested");
                None
            }
            result = &mut receiver => Some(result),
        };
        token.cancel();

        let receiver_result = match finished {
            Some(result) => result,
            None => receiver.await,
        };
        if let Err(e) = dispatch.await {
            warn!(error = %e, "Dispatch loop ended abnormally");
        }

        self.run_hooks(&self.shutdown_hooks, "shutdown").await;

        match receiver_result {
            Ok(Ok(())) => {
                info!("Bot stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Receiver stopped with an error");
                Err(e.into())
            }
            Err(e) => Err(RuntimeError::Task(e.to_string())),
        }
    }

    async fn run_hooks(&self, hooks: &Mutex<Vec<Hook>>, kind: &'static str) {
        let hooks = hooks.lock().clone();
        debug!(kind, count = hooks.len(), "Running lifecycle hooks");
        for (index, hook) in hooks.into_iter().enumerate() {
            let gateway = self.gateway.clone();
            let handle = spawn_supervised(TaskLabel::new(kind, index.to_string()), async move {
                hook(gateway).await
            });
            let _ = handle.await;
        }
    }
}

fn hook<F, Fut, R>(f: F) -> Hook
where
    F: Fn(Arc<Gateway>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerReturn + 'static,
{
    Arc::new(move |gateway| f(gateway).map(HandlerReturn::into_result).boxed())
}

// =============================================================================
// Wiring
// =============================================================================

fn build_gateway(config: &BotConfig) -> RuntimeResult<Arc<Gateway>> {
    let requester = build_requester(config)?;
    let receiver = build_receiver(config, requester.clone())?;
    Ok(Gateway::new(receiver, requester))
}

#[cfg(feature = "http-client")]
fn build_requester(config: &BotConfig) -> RuntimeResult<Arc<dyn Requester>> {
    let requester_config = config.api.to_requester_config(&config.token);
    Ok(Arc::new(bronze_transport::HttpRequester::new(requester_config)))
}

#[cfg(not(feature = "http-client"))]
fn build_requester(_config: &BotConfig) -> RuntimeResult<Arc<dyn Requester>> {
    Err(RuntimeError::MissingCapability("http-client"))
}

#[allow(unused_variables)]
fn build_receiver(
    config: &BotConfig,
    requester: Arc<dyn Requester>,
) -> RuntimeResult<Arc<dyn Receiver>> {
    match &config.transport {
        #[cfg(feature = "ws-client")]
        TransportConfig::Websocket(ws) => Ok(Arc::new(bronze_transport::SocketReceiver::new(
            ws.to_socket_config(),
            requester,
        ))),
        #[cfg(not(feature = "ws-client"))]
        TransportConfig::Websocket(_) => Err(RuntimeError::MissingCapability("ws-client")),
        #[cfg(feature = "http-server")]
        TransportConfig::Webhook(hook) => Ok(Arc::new(bronze_transport::PushReceiver::new(
            hook.to_push_config(),
        ))),
        #[cfg(not(feature = "http-server"))]
        TransportConfig::Webhook(_) => Err(RuntimeError::MissingCapability("http-server")),
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            futures::future::pending::<()>().await;
        }
    }
}
