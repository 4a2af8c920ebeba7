//! Handler return values and type-erased handler closures.
//!
//! Handlers are plain async closures. Their return value only matters for
//! logging: `()` means success, `Err(e)` is logged by the supervisor with
//! the handler's label.
//!
//! ```rust,ignore
//! // No return value
//! bot.on_text(|msg: Message| async move {
//!     println!("{}", msg.plain_text());
//! });
//!
//! // Fallible
//! bot.on_text(|msg: Message| async move {
//!     msg.reply("pong").await?;
//!     Ok::<_, ApiError>(())
//! });
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use bronze_core::Message;

// ============================================================================
// HandlerReturn
// ============================================================================

/// Values a handler may return.
pub trait HandlerReturn: Send {
    /// Collapses the value into success or a printable failure.
    fn into_result(self) -> Result<(), String>;
}

impl HandlerReturn for () {
    fn into_result(self) -> Result<(), String> {
        Ok(())
    }
}

impl<T: HandlerReturn> HandlerReturn for Option<T> {
    fn into_result(self) -> Result<(), String> {
        self.map_or(Ok(()), HandlerReturn::into_result)
    }
}

impl<T: HandlerReturn, E: Display + Send> HandlerReturn for Result<T, E> {
    fn into_result(self) -> Result<(), String> {
        match self {
            Ok(value) => value.into_result(),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Future returned by every erased handler.
pub type HandlerFuture = BoxFuture<'static, Result<(), String>>;

// ============================================================================
// Erased listeners
// ============================================================================

/// Listener receiving the untyped payload.
pub type RawListener = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Listener receiving a classified message.
pub type MessageListener = Arc<dyn Fn(Message) -> HandlerFuture + Send + Sync>;

/// Erases a raw-payload closure.
pub fn raw_listener<F, Fut, R>(f: F) -> RawListener
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerReturn + 'static,
{
    Arc::new(move |value| f(value).map(HandlerReturn::into_result).boxed())
}

/// Erases a message closure.
pub fn message_listener<F, Fut, R>(f: F) -> MessageListener
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerReturn + 'static,
{
    Arc::new(move |msg| f(msg).map(HandlerReturn::into_result).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_values_collapse() {
        assert!(().into_result().is_ok());
        assert!(Some(()).into_result().is_ok());
        assert!(None::<()>.into_result().is_ok());
        assert!(Ok::<(), String>(()).into_result().is_ok());
        assert_eq!(
            Err::<(), _>("boom").into_result().unwrap_err(),
            "boom".to_string()
        );
    }
}
