//! Routes incoming requests to the handler registered for their type.

use std::collections::HashMap;
use std::sync::Arc;

use relay_core::message::SystemNotice;
use relay_core::{MessageType, Packet};
use relay_services::handlers::{
    ClientListHandler, DisconnectHandler, NameHandler, SendFileHandler, SendMessageHandler,
    TimeHandler,
};
use relay_services::{Action, RequestContext, RequestHandler};

/// Text of the notice sent for request types nothing handles.
pub const UNHANDLED_NOTICE: &str = "unhandled command";

/// Maps message types to handlers and turns every request into an [`Action`].
pub struct Dispatcher {
    handlers: HashMap<MessageType, Arc<dyn RequestHandler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// An empty dispatcher. Every request gets the unhandled notice.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The full request set, answering name queries with `server_name`.
    pub fn with_defaults(server_name: &str) -> Self {
        let mut d = Self::new();
        d.register(Arc::new(TimeHandler));
        d.register(Arc::new(NameHandler::new(server_name)));
        d.register(Arc::new(ClientListHandler));
        d.register(Arc::new(SendMessageHandler));
        d.register(Arc::new(SendFileHandler));
        d.register(Arc::new(DisconnectHandler));
        d
    }

    /// Register a handler under its own message type, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn RequestHandler>) {
        self.handlers.insert(handler.message_type(), handler);
    }

    /// Decide what to do with one request. Never drops a request silently:
    /// failures and unknown types still produce a reply.
    pub fn dispatch(&self, ctx: &RequestContext<'_>, request: &Packet) -> Action {
        let Some(handler) = self.handlers.get(&request.msg_type) else {
            tracing::warn!(
                client_id = ctx.client_id,
                msg_type = %request.msg_type,
                "unhandled command"
            );
            return Action::Reply(Packet::json(
                MessageType::SystemNoticeIndication,
                &SystemNotice::text(UNHANDLED_NOTICE),
            ));
        };

        match handler.handle(ctx, request) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(
                    client_id = ctx.client_id,
                    msg_type = %request.msg_type,
                    error = %e,
                    "request rejected"
                );
                Action::Reply(handler.reject(&e))
            }
        }
    }
}
