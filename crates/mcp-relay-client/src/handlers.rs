//! Push-style dispatch: one handler slot per message kind.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use mcp_relay_protocol::{Message, MessageKind};

use crate::HandlerError;

type Handler = Arc<dyn Fn(Message) -> Result<(), HandlerError> + Send + Sync>;

/// Maps each [`MessageKind`] to at most one handler.
///
/// Registering a second handler for a kind replaces the first.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    chat: RwLock<Option<Handler>>,
    system: RwLock<Option<Handler>>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: MessageKind) -> &RwLock<Option<Handler>> {
        match kind {
            MessageKind::Chat => &self.chat,
            MessageKind::System => &self.system,
        }
    }

    /// Installs `handler` for `kind`, returning whether one was replaced.
    pub(crate) fn register<F>(&self, kind: MessageKind, handler: F) -> bool
    where
        F: Fn(Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut slot = self.slot(kind).write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(Arc::new(handler)).is_some()
    }

    /// Clears the slot for `kind`, returning whether it was occupied.
    pub(crate) fn unregister(&self, kind: MessageKind) -> bool {
        let mut slot = self.slot(kind).write().unwrap_or_else(PoisonError::into_inner);
        slot.take().is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, kind: MessageKind) -> bool {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs the handler for the message's kind on the calling task.
    ///
    /// Gives the message back when no handler is registered, so the
    /// caller can queue it instead. A handler that errors or panics is
    /// logged and the message is consumed.
    pub(crate) fn dispatch(&self, message: Message) -> Option<Message> {
        let Some(kind) = message.kind() else {
            return Some(message);
        };
        // Clone the handler out so the lock is not held while it runs; a
        // handler may register or unregister handlers itself.
        let handler = self
            .slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            return Some(message);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(%kind, error = %e, "message handler failed");
            }
            Err(_) => {
                tracing::error!(%kind, "message handler panicked");
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(Message) -> Result<(), HandlerError> + use<> {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_second_registration_replaces_first() {
        let registry = HandlerRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        assert!(!registry.register(MessageKind::Chat, counting(&first)));
        assert!(registry.register(MessageKind::Chat, counting(&second)));

        assert!(registry.dispatch(Message::chat("hi", true)).is_none());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unhandled_kind_is_returned() {
        let registry = HandlerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(MessageKind::Chat, counting(&count));

        let back = registry.dispatch(Message::system("status", None));
        assert_eq!(back.map(|m| m.content), Some("status".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_kind_is_returned() {
        let registry = HandlerRegistry::new();
        let unknown = Message::new(mcp_relay_protocol::MessageBody::Unknown, "x");
        assert!(registry.dispatch(unknown).is_some());
    }

    #[test]
    fn test_unregister_clears_slot() {
        let registry = HandlerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(MessageKind::System, counting(&count));
        assert!(registry.is_registered(MessageKind::System));

        assert!(registry.unregister(MessageKind::System));
        assert!(!registry.unregister(MessageKind::System));
        assert!(registry.dispatch(Message::system("s", None)).is_some());
    }

    #[test]
    fn test_handler_error_consumes_message() {
        let registry = HandlerRegistry::new();
        registry.register(MessageKind::Chat, |_| Err("nope".into()));
        assert!(registry.dispatch(Message::chat("hi", true)).is_none());
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let registry = HandlerRegistry::new();
        registry.register(MessageKind::Chat, |_| panic!("handler bug"));
        assert!(registry.dispatch(Message::chat("hi", true)).is_none());

        // The registry is still usable afterwards.
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(MessageKind::Chat, counting(&count));
        registry.dispatch(Message::chat("again", true));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
