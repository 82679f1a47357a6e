//! Per-session push channel between the portal and the rendered page.
//!
//! Delivery is best effort: updates for a session without a live
//! connection are dropped, never buffered.

use std::sync::atomic::Ordering;

use serde_json::{Map, Value};
use shared::{
    domain::{ConnectionId, SessionId},
    protocol::{ClientEventMessage, PushUpdate, PORTAL_SOURCE},
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    error::EventError,
    facade::SessionFacade,
    routing::create_event,
    session::{lock, ClientConnection, SharedSession},
    urls::PortalUrls,
    Portal,
};

#[derive(Debug, Clone)]
pub enum ClientNotice {
    Connected(SessionFacade),
    Disconnected {
        portal: SessionFacade,
        connection: ConnectionId,
    },
}

/// What a portlet gets to keep when it is added to the portal.
#[derive(Clone)]
pub struct PortalLink {
    clients: broadcast::Sender<ClientNotice>,
    urls: PortalUrls,
}

impl PortalLink {
    pub(crate) fn new(clients: broadcast::Sender<ClientNotice>, urls: PortalUrls) -> Self {
        Self { clients, urls }
    }

    pub fn subscribe_clients(&self) -> broadcast::Receiver<ClientNotice> {
        self.clients.subscribe()
    }

    pub fn urls(&self) -> &PortalUrls {
        &self.urls
    }
}

/// Client-supplied locales travel in the keyword arguments.
fn split_locales(
    mut kwargs: Map<String, Value>,
    fallback: Vec<String>,
) -> (Map<String, Value>, Vec<String>) {
    let locales = match kwargs.remove("locales") {
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => fallback,
    };
    (kwargs, locales)
}

impl Portal {
    pub fn subscribe_clients(&self) -> broadcast::Receiver<ClientNotice> {
        self.inner.clients.subscribe()
    }

    pub fn link(&self) -> PortalLink {
        PortalLink::new(self.inner.clients.clone(), self.urls().clone())
    }

    /// Makes `sender` the session's push connection, replacing any earlier one.
    pub fn client_connected(
        &self,
        session_id: &SessionId,
        sender: mpsc::UnboundedSender<String>,
    ) -> ConnectionId {
        let id = ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::Relaxed));
        let session = self.sessions().get_or_create(session_id);
        let replaced = lock(&session).connect(ClientConnection { id, sender });
        if let Some(previous) = replaced {
            debug!(%session_id, previous = %previous.id, "client connection replaced");
        }
        info!(%session_id, connection = %id, "client connected");
        let facade = SessionFacade::new(self.clone(), session_id.clone(), session);
        let _ = self.inner.clients.send(ClientNotice::Connected(facade));
        id
    }

    /// Forgets connection `id` unless a newer connection already replaced it.
    pub fn client_disconnected(&self, session_id: &SessionId, id: ConnectionId) {
        let Some(session) = self.sessions().get(session_id) else {
            return;
        };
        if lock(&session).disconnect(id) {
            info!(%session_id, connection = %id, "client disconnected");
        } else {
            debug!(%session_id, connection = %id, "stale client connection closed");
        }
        let portal = SessionFacade::new(self.clone(), session_id.clone(), session);
        let _ = self.inner.clients.send(ClientNotice::Disconnected {
            portal,
            connection: id,
        });
    }

    /// Decodes a client message and delivers the event it names.
    ///
    /// Returns how many portlets handled the event. Refused messages are
    /// logged and reported as errors; nothing is delivered for them.
    pub async fn client_message(&self, session_id: &SessionId, text: &str) -> Result<usize, EventError> {
        let result = self.client_event(session_id, text);
        match result {
            Ok((event, facade)) => Ok(self.deliver_event(event, facade).await),
            Err(error) => {
                warn!(%session_id, %error, "rejected client event");
                Err(error)
            }
        }
    }

    fn client_event(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<(crate::portlet::PortletEvent, SessionFacade), EventError> {
        let message = ClientEventMessage::decode(text)?;
        if message.handle == PORTAL_SOURCE {
            return Err(EventError::ReservedTarget(message.handle));
        }
        let facade = self.facade(session_id);
        let (kwargs, locales) = split_locales(message.kwargs, facade.preferred_locales());
        let event = create_event(
            &self.registry().accepted_events(),
            &message.event_type,
            &message.handle,
            message.args,
            kwargs,
            locales,
        )?;
        Ok((event, facade))
    }

    pub(crate) fn push(&self, session: &SharedSession, update: PushUpdate) -> bool {
        let text = match update.encode() {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, name = %update.name, "cannot encode push update");
                return false;
            }
        };
        let state = lock(session);
        let Some(connection) = state.connection() else {
            debug!(name = %update.name, "no client connected, dropping update");
            return false;
        };
        connection.sender.send(text).is_ok()
    }
}

#[cfg(test)]
#[path = "tests/exchange_tests.rs"]
mod tests;
