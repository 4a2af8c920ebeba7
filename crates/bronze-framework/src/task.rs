//! Supervised fire-and-forget task spawning.
//!
//! Every handler invocation runs in its own task. A second, tiny supervisor
//! task awaits it and turns an `Err` return or a panic into a log line, so a
//! failing handler never reaches the dispatch loop.

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, warn};

/// Identifies a spawned handler in logs.
#[derive(Debug, Clone)]
pub struct TaskLabel {
    /// Handler family (`command`, `event`, `raw`, `text`, `system`).
    pub kind: &'static str,
    /// Handler name (command name, event type, listener index).
    pub name: String,
    /// Triggering content, if any.
    pub content: Option<String>,
}

impl TaskLabel {
    /// Creates a label.
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            content: None,
        }
    }

    /// Attaches the triggering content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Spawns `fut` and a supervisor that logs its failure or panic.
///
/// The returned handle belongs to the supervisor; it completes once the
/// handler has finished, however it finished.
pub fn spawn_supervised<F>(label: TaskLabel, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), String>> + Send + 'static,
{
    let inner = tokio::spawn(fut.in_current_span());
    tokio::spawn(
        async move {
            match inner.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    handler = %label,
                    content = label.content.as_deref().unwrap_or(""),
                    error = %e,
                    "Handler returned an error"
                ),
                Err(e) if e.is_panic() => error!(
                    handler = %label,
                    content = label.content.as_deref().unwrap_or(""),
                    "Handler panicked"
                ),
                Err(_) => debug!(handler = %label, "Handler cancelled"),
            }
        }
        .in_current_span(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panics_are_contained() {
        let explode = true;
        let handle = spawn_supervised(TaskLabel::new("test", "boom"), async move {
            if explode {
                panic!("handler exploded");
            }
            Ok(())
        });
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn errors_are_contained() {
        let handle = spawn_supervised(
            TaskLabel::new("test", "err").with_content("!x"),
            async { Err("nope".to_string()) },
        );
        assert!(handle.await.is_ok());
    }
}
