//! Rules: predicates gating whether a matched command executes.
//!
//! All rules of a command must pass. A rule that errors or panics counts as
//! not satisfied.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use bronze_core::Message;

use super::parser::Args;
use crate::error::BoxError;

/// A gating predicate.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Returns whether the command may run for this message.
    async fn check(&self, msg: &Message, args: &Args) -> Result<bool, BoxError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "rule"
    }
}

/// A shared rule.
pub type BoxedRule = Arc<dyn Rule>;

/// Evaluates rules in order; stops at the first that does not pass.
pub async fn check_all(rules: &[BoxedRule], msg: &Message, args: &Args) -> bool {
    for rule in rules {
        let verdict = AssertUnwindSafe(rule.check(msg, args))
            .catch_unwind()
            .await;
        match verdict {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return false,
            Ok(Err(e)) => {
                warn!(rule = rule.name(), error = %e, "Rule failed, treated as unsatisfied");
                return false;
            }
            Err(_) => {
                warn!(rule = rule.name(), "Rule panicked, treated as unsatisfied");
                return false;
            }
        }
    }
    true
}

// ============================================================================
// Closure adapters
// ============================================================================

struct SyncRule<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Rule for SyncRule<F>
where
    F: Fn(&Message, &Args) -> bool + Send + Sync,
{
    async fn check(&self, msg: &Message, args: &Args) -> Result<bool, BoxError> {
        Ok((self.f)(msg, args))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FallibleRule<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, E> Rule for FallibleRule<F>
where
    F: Fn(&Message, &Args) -> Result<bool, E> + Send + Sync,
    E: std::error::Error + Send + Sync + 'static,
{
    async fn check(&self, msg: &Message, args: &Args) -> Result<bool, BoxError> {
        (self.f)(msg, args).map_err(|e| Arc::new(e) as BoxError)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct AsyncRule<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Rule for AsyncRule<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn check(&self, msg: &Message, _args: &Args) -> Result<bool, BoxError> {
        Ok((self.f)(msg.clone()).await)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A synchronous predicate over the message and parsed arguments.
pub fn predicate<F>(name: impl Into<String>, f: F) -> BoxedRule
where
    F: Fn(&Message, &Args) -> bool + Send + Sync + 'static,
{
    Arc::new(SyncRule {
        name: name.into(),
        f,
    })
}

/// A synchronous predicate that may fail; failure counts as unsatisfied.
pub fn fallible<F, E>(name: impl Into<String>, f: F) -> BoxedRule
where
    F: Fn(&Message, &Args) -> Result<bool, E> + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(FallibleRule {
        name: name.into(),
        f,
    })
}

/// An asynchronous predicate receiving an owned copy of the message.
pub fn from_async<F, Fut>(name: impl Into<String>, f: F) -> BoxedRule
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(AsyncRule {
        name: name.into(),
        f,
    })
}

// ============================================================================
// Built-in rules
// ============================================================================

/// Passes when the author is one of `users`.
pub fn from_users<I, S>(users: I) -> BoxedRule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let users: Vec<String> = users.into_iter().map(Into::into).collect();
    predicate("from_users", move |msg, _| {
        users.iter().any(|u| *u == msg.author_id)
    })
}

/// Passes when the message was posted in one of `channels`.
pub fn in_channels<I, S>(channels: I) -> BoxedRule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let channels: Vec<String> = channels.into_iter().map(Into::into).collect();
    predicate("in_channels", move |msg, _| {
        channels.iter().any(|c| *c == msg.target_id)
    })
}

/// Passes when the message was posted in one of `guilds`.
pub fn in_guilds<I, S>(guilds: I) -> BoxedRule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let guilds: Vec<String> = guilds.into_iter().map(Into::into).collect();
    predicate("in_guilds", move |msg, _| {
        msg.guild_id()
            .is_some_and(|g| guilds.iter().any(|candidate| candidate == g))
    })
}

/// Passes when the message mentions `@all`.
pub fn mentions_all() -> BoxedRule {
    predicate("mentions_all", |msg, _| msg.mentions_all())
}

/// Passes when the message mentions `user_id`.
pub fn mentions_user(user_id: impl Into<String>) -> BoxedRule {
    let user_id = user_id.into();
    predicate("mentions_user", move |msg, _| {
        msg.mentions().iter().any(|m| *m == user_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::lexer::tests::text;
    use crate::command::parser::ConvertError;

    #[tokio::test]
    async fn builtins() {
        let msg = text("!x");
        let args = Args::default();
        assert!(check_all(&[from_users(["user"])], &msg, &args).await);
        assert!(!check_all(&[from_users(["other"])], &msg, &args).await);
        assert!(check_all(&[in_channels(["chan"]), in_guilds(["guild"])], &msg, &args).await);
        assert!(!check_all(&[mentions_all()], &msg, &args).await);
        assert!(!check_all(&[mentions_user("u9")], &msg, &args).await);
    }

    #[tokio::test]
    async fn failures_are_fail_closed() {
        let msg = text("!x");
        let args = Args::default();

        let erroring = fallible("db", |_, _| Err(ConvertError("down".into())));
        assert!(!check_all(&[erroring], &msg, &args).await);

        let panicking = predicate("bug", |_, _| panic!("rule bug"));
        assert!(!check_all(&[panicking], &msg, &args).await);
    }

    #[tokio::test]
    async fn async_rule_runs() {
        let msg = text("!x");
        let args = Args::default();
        let rule = from_async("slow", |msg: Message| async move {
            tokio::task::yield_now().await;
            msg.author_id == "user"
        });
        assert!(check_all(&[rule], &msg, &args).await);
    }
}
