use crate::core::message::InboundMessage;
use crate::error::Result;

/// Subscriber invoked once per inbound message
///
/// Handlers run on the connection manager's driver task, sequentially and in
/// registration order. They should return quickly: a slow handler delays
/// delivery to every handler registered after it.
///
/// # Errors
/// A returned error (or a panic) is logged and isolated. Remaining handlers
/// still receive the message and the connection is unaffected.
///
/// # Example
///
/// ```ignore
/// struct TicketWatcher;
///
/// impl MessageHandler for TicketWatcher {
///     fn handle(&self, message: &InboundMessage) -> Result<()> {
///         if message.kind == "ticket.updated" {
///             refresh_ticket_list();
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: &InboundMessage) -> Result<()>;
}

/// Adapter that turns a closure into a [`MessageHandler`]
pub struct FnHandler<F>(pub F);

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&InboundMessage) + Send + Sync + 'static,
{
    fn handle(&self, message: &InboundMessage) -> Result<()> {
        (self.0)(message);
        Ok(())
    }
}
