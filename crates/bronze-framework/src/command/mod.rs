//! Command engine.
//!
//! Each inbound text-like message walks every registered [`Command`] through
//! four stages, stopping at the first that fails:
//!
//! ```text
//! Unmatched ──lex──▶ Lexed ──parse──▶ Parsed ──rules──▶ RuleChecked ──▶ Executed
//! ```
//!
//! Commands are declared with [`CommandBuilder`] and registered on a
//! [`CommandManager`]:
//!
//! ```rust,ignore
//! manager.register(
//!     Command::builder("roll")
//!         .alias("r")
//!         .param::<i64>("min")
//!         .param::<i64>("max")
//!         .rule(rules::in_guilds(["1234"]))
//!         .handler(|msg: Message, args: Args| async move {
//!             let (min, max) = (args.get::<i64>(0), args.get::<i64>(1));
//!             msg.reply(format!("{min:?}..{max:?}")).await?;
//!             Ok::<_, ApiError>(())
//!         }),
//! )?;
//! ```

pub mod lexer;
pub mod manager;
pub mod parser;
pub mod rule;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use bronze_core::Message;

use crate::error::{CommandError, LexError, ParseError, RegisterError, RegisterResult};
use crate::handler::{HandlerFuture, HandlerReturn};

pub use lexer::{Lexer, RegexLexer, ShlexLexer, shell_split};
pub use manager::{CommandManager, DEFAULT_PREFIXES};
pub use parser::{Args, ConvertError, ConverterRegistry, Mention, Param};
pub use rule::{BoxedRule, Rule};

/// Built-in rules and rule constructors.
pub mod rules {
    pub use super::rule::{
        fallible, from_async, from_users, in_channels, in_guilds, mentions_all, mentions_user,
        predicate,
    };
}

/// Erased command handler.
pub type CommandHandler = Arc<dyn Fn(Message, Args) -> HandlerFuture + Send + Sync>;

// ============================================================================
// Command
// ============================================================================

/// A registered command: lexer, declared parameters, rules and handler.
pub struct Command {
    name: String,
    aliases: Vec<String>,
    help: String,
    desc: String,
    lexer: Box<dyn Lexer>,
    params: Vec<Param>,
    rules: Vec<BoxedRule>,
    handler: CommandHandler,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("params", &self.params)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Listing entry returned by [`CommandManager::commands`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    /// Command name.
    pub name: String,
    /// Alternative triggers.
    pub aliases: Vec<String>,
    /// Short usage text.
    pub help: String,
    /// Longer description.
    pub desc: String,
}

/// What happened to a command that lexed successfully (or failed to lex for a
/// reason other than not matching).
#[derive(Debug)]
pub enum CommandOutcome {
    /// The handler ran to completion.
    Executed {
        /// Command name.
        command: String,
    },
    /// The handler returned an error or panicked.
    Failed {
        /// Command name.
        command: String,
        /// Rendered failure.
        error: String,
    },
    /// A stage before execution rejected the message.
    Skipped {
        /// Command name.
        command: String,
        /// The rejecting stage.
        reason: CommandError,
    },
}

impl CommandOutcome {
    /// Command name.
    pub fn command(&self) -> &str {
        match self {
            Self::Executed { command } | Self::Failed { command, .. } | Self::Skipped { command, .. } => {
                command
            }
        }
    }

    /// Returns `true` if the handler ran successfully.
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

impl Command {
    /// Starts declaring a command named `name`.
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alternative triggers.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Trigger tokens claimed by this command's lexer.
    pub fn triggers(&self) -> &[String] {
        self.lexer.triggers()
    }

    /// Whether the command matches triggers ignoring ASCII case.
    pub fn case_insensitive(&self) -> bool {
        self.lexer.case_insensitive()
    }

    /// Declared parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Listing entry.
    pub fn info(&self) -> CommandInfo {
        CommandInfo {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            help: self.help.clone(),
            desc: self.desc.clone(),
        }
    }

    /// Lex and parse stages.
    pub(crate) fn prepare(
        &self,
        msg: &Message,
        registry: &ConverterRegistry,
    ) -> Result<Args, CommandError> {
        let tokens = self.lexer.lex(msg)?;
        Ok(parser::parse(&self.params, &tokens, registry)?)
    }

    /// Rule and execute stages.
    pub(crate) async fn execute(&self, msg: &Message, args: Args) -> CommandOutcome {
        if !rule::check_all(&self.rules, msg, &args).await {
            trace!(command = %self.name, "Command rules not satisfied");
            return CommandOutcome::Skipped {
                command: self.name.clone(),
                reason: CommandError::RuleRejected,
            };
        }

        let result = AssertUnwindSafe((self.handler)(msg.clone(), args))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => CommandOutcome::Executed {
                command: self.name.clone(),
            },
            Ok(Err(e)) => {
                warn!(
                    command = %self.name,
                    content = msg.plain_text(),
                    error = %e,
                    "Command handler returned an error"
                );
                CommandOutcome::Failed {
                    command: self.name.clone(),
                    error: e,
                }
            }
            Err(panic) => {
                let error = panic_message(panic.as_ref());
                error!(
                    command = %self.name,
                    content = msg.plain_text(),
                    panic = %error,
                    "Command handler panicked"
                );
                CommandOutcome::Failed {
                    command: self.name.clone(),
                    error,
                }
            }
        }
    }

    pub(crate) fn skipped(&self, reason: CommandError) -> CommandOutcome {
        match &reason {
            CommandError::Lex(LexError::MalformedContent(detail)) => {
                debug!(command = %self.name, detail = %detail, "Malformed command content");
            }
            CommandError::Parse(e @ ParseError::NoParseFunction { .. }) => {
                debug!(command = %self.name, error = %e, "Missing parse function");
            }
            other => trace!(command = %self.name, reason = %other, "Command skipped"),
        }
        CommandOutcome::Skipped {
            command: self.name.clone(),
            reason,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Declares a command.
pub struct CommandBuilder {
    name: String,
    aliases: Vec<String>,
    prefixes: Option<Vec<String>>,
    regex: Option<String>,
    case_insensitive: bool,
    params: Vec<Param>,
    rules: Vec<BoxedRule>,
    help: String,
    desc: String,
    handler: Option<CommandHandler>,
}

impl fmt::Debug for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuilder")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("prefixes", &self.prefixes)
            .field("regex", &self.regex)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl CommandBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            prefixes: None,
            regex: None,
            case_insensitive: false,
            params: Vec::new(),
            rules: Vec::new(),
            help: String::new(),
            desc: String::new(),
            handler: None,
        }
    }

    /// Adds an alternative trigger.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Overrides the manager's default prefix set.
    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }

    /// Matches the whole content against `pattern` instead of prefix + trigger.
    ///
    /// Capture groups become the argument tokens.
    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    /// Matches triggers ignoring ASCII case.
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    /// Declares the next required parameter.
    pub fn param<T: Any>(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param::new::<T>(name));
        self
    }

    /// Declares the next optional parameter.
    pub fn optional_param<T: Any>(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param::optional::<T>(name));
        self
    }

    /// Attaches a rule. All rules must pass.
    pub fn rule(mut self, rule: BoxedRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Short usage text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Longer description.
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Sets the handler.
    pub fn handler<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(Message, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerReturn + 'static,
    {
        self.handler = Some(Arc::new(move |msg, args| {
            f(msg, args).map(HandlerReturn::into_result).boxed()
        }));
        self
    }

    /// Name of the command being declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the declaration and builds the command.
    pub fn build(self, default_prefixes: &[String]) -> RegisterResult<Command> {
        let Some(handler) = self.handler else {
            return Err(RegisterError::MissingHandler { command: self.name });
        };

        let lexer: Box<dyn Lexer> = match &self.regex {
            Some(pattern) => {
                let lexer = RegexLexer::new(pattern).map_err(|e| RegisterError::InvalidRegex {
                    command: self.name.clone(),
                    reason: e.to_string(),
                })?;
                Box::new(lexer)
            }
            None => {
                let triggers: Vec<String> = std::iter::once(self.name.clone())
                    .chain(self.aliases.iter().cloned())
                    .collect();
                if triggers
                    .iter()
                    .any(|t| t.is_empty() || t.chars().any(char::is_whitespace))
                {
                    return Err(RegisterError::EmptyTrigger { command: self.name });
                }

                let prefixes = self
                    .prefixes
                    .unwrap_or_else(|| default_prefixes.to_vec());
                if prefixes.is_empty() || prefixes.iter().any(String::is_empty) {
                    return Err(RegisterError::NoPrefixes { command: self.name });
                }
                Box::new(ShlexLexer::new(prefixes, triggers, self.case_insensitive))
            }
        };

        Ok(Command {
            name: self.name,
            aliases: self.aliases,
            help: self.help,
            desc: self.desc,
            lexer,
            params: self.params,
            rules: self.rules,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::lexer::tests::text;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn prefixes() -> Vec<String> {
        vec!["!".into()]
    }

    #[test]
    fn build_validates_declaration() {
        let err = Command::builder("x").build(&prefixes()).unwrap_err();
        assert_eq!(err, RegisterError::MissingHandler { command: "x".into() });

        let err = Command::builder("two words")
            .handler(|_, _| async {})
            .build(&prefixes())
            .unwrap_err();
        assert!(matches!(err, RegisterError::EmptyTrigger { .. }));

        let err = Command::builder("x")
            .handler(|_, _| async {})
            .build(&[])
            .unwrap_err();
        assert!(matches!(err, RegisterError::NoPrefixes { .. }));

        let err = Command::builder("x")
            .regex("(")
            .handler(|_, _| async {})
            .build(&prefixes())
            .unwrap_err();
        assert!(matches!(err, RegisterError::InvalidRegex { .. }));
    }

    #[test]
    fn triggers_are_name_and_aliases() {
        let command = Command::builder("roll")
            .alias("r")
            .handler(|_, _| async {})
            .build(&prefixes())
            .unwrap();
        assert_eq!(command.triggers(), ["roll", "r"]);
    }

    #[tokio::test]
    async fn handler_failure_is_contained() {
        let command = Command::builder("boom")
            .handler(|_, _| async { Err::<(), _>("exploded") })
            .build(&prefixes())
            .unwrap();
        let msg = text("!boom");
        let args = command.prepare(&msg, &ConverterRegistry::default()).unwrap();
        match command.execute(&msg, args).await {
            CommandOutcome::Failed { command, error } => {
                assert_eq!(command, "boom");
                assert_eq!(error, "exploded");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let explode = true;
        let command = Command::builder("boom")
            .handler(move |_, _| async move {
                if explode {
                    panic!("kaboom");
                }
            })
            .build(&prefixes())
            .unwrap();
        let msg = text("!boom");
        let args = command.prepare(&msg, &ConverterRegistry::default()).unwrap();
        let outcome = command.execute(&msg, args).await;
        assert!(matches!(outcome, CommandOutcome::Failed { ref error, .. } if error == "kaboom"));
    }

    #[tokio::test]
    async fn rejected_rule_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let command = Command::builder("admin")
            .rule(rules::from_users(["someone-else"]))
            .handler(move |_, _| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build(&prefixes())
            .unwrap();
        let msg = text("!admin");
        let args = command.prepare(&msg, &ConverterRegistry::default()).unwrap();
        let outcome = command.execute(&msg, args).await;
        assert!(matches!(
            outcome,
            CommandOutcome::Skipped {
                reason: CommandError::RuleRejected,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
