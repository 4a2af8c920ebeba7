//! Command registration and per-message evaluation.

use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use bronze_core::Message;

use super::{Command, CommandBuilder, CommandInfo, CommandOutcome, ConverterRegistry};
use crate::error::{CommandError, LexError, RegisterError, RegisterResult};

/// Prefixes used when a command does not declare its own: ASCII and
/// full-width exclamation marks.
pub const DEFAULT_PREFIXES: [&str; 2] = ["!", "！"];

/// Owns the registered commands and the converter registry.
///
/// Registration goes through `&self` so the manager can be shared with the
/// dispatch loop before every command is known.
pub struct CommandManager {
    commands: RwLock<Vec<Arc<Command>>>,
    registry: RwLock<ConverterRegistry>,
    default_prefixes: Vec<String>,
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("commands", &self.commands.read().len())
            .field("default_prefixes", &self.default_prefixes)
            .finish()
    }
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect())
    }
}

impl CommandManager {
    /// Creates a manager with the given default prefix set.
    pub fn new(default_prefixes: Vec<String>) -> Self {
        Self {
            commands: RwLock::new(Vec::new()),
            registry: RwLock::new(ConverterRegistry::default()),
            default_prefixes,
        }
    }

    /// The prefix set applied to commands that declare none.
    pub fn default_prefixes(&self) -> &[String] {
        &self.default_prefixes
    }

    /// Builds and registers a command.
    ///
    /// Fails if any of its triggers (or its name) is already claimed.
    pub fn register(&self, builder: CommandBuilder) -> RegisterResult<()> {
        let command = builder.build(&self.default_prefixes)?;
        let mut commands = self.commands.write();

        for existing in commands.iter() {
            if existing.name() == command.name() {
                return Err(RegisterError::TriggerConflict {
                    trigger: command.name().to_string(),
                    command: command.name().to_string(),
                    existing: existing.name().to_string(),
                });
            }
            let ignore_case = existing.case_insensitive() || command.case_insensitive();
            for trigger in command.triggers() {
                let clash = existing.triggers().iter().any(|claimed| {
                    if ignore_case {
                        claimed.eq_ignore_ascii_case(trigger)
                    } else {
                        claimed == trigger
                    }
                });
                if clash {
                    return Err(RegisterError::TriggerConflict {
                        trigger: trigger.clone(),
                        command: command.name().to_string(),
                        existing: existing.name().to_string(),
                    });
                }
            }
        }

        info!(command = command.name(), triggers = ?command.triggers(), "Registered command");
        commands.push(Arc::new(command));
        Ok(())
    }

    /// Removes the command named `name`, releasing its triggers.
    pub fn remove(&self, name: &str) -> bool {
        let mut commands = self.commands.write();
        let before = commands.len();
        commands.retain(|c| c.name() != name);
        before != commands.len()
    }

    /// Looks up a command by name.
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.read().iter().find(|c| c.name() == name).cloned()
    }

    /// Registrations in order, for help output.
    pub fn commands(&self) -> Vec<CommandInfo> {
        self.commands.read().iter().map(|c| c.info()).collect()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    /// Returns `true` if no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Registers (or replaces) the converter for `T`.
    pub fn register_converter<T, F, E>(&self, convert: F)
    where
        T: Any + Send + Sync,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.registry.write().register::<T, F, E>(convert);
    }

    /// Registers `T::from_str` as the converter for `T`.
    pub fn register_from_str<T>(&self)
    where
        T: FromStr + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.registry.write().register_from_str::<T>();
    }

    /// Runs every command against `msg`.
    ///
    /// Commands that do not match are left out of the result; every other
    /// command reports how far it got.
    pub async fn handle(&self, msg: &Message) -> Vec<CommandOutcome> {
        let commands = self.commands.read().clone();
        let mut outcomes = Vec::new();

        for command in commands {
            let prepared = {
                let registry = self.registry.read();
                command.prepare(msg, &registry)
            };
            match prepared {
                Ok(args) => {
                    debug!(command = command.name(), "Command matched");
                    outcomes.push(command.execute(msg, args).await);
                }
                Err(CommandError::Lex(LexError::NotMatched)) => {}
                Err(reason) => outcomes.push(command.skipped(reason)),
            }
        }

        outcomes
    }
}
