use std::{fmt, sync::Arc};

use serde_json::Value;
use shared::{
    domain::{PortletHandle, SessionId},
    protocol::PushUpdate,
};

use crate::{
    l10n::Translation,
    session::{lock, SharedSession},
    tabs::TabInfo,
    Portal,
};

/// Session-bound view of the portal handed to portlets.
///
/// Saves portlets from carrying the session around: every operation is
/// applied to the session the facade was made for.
#[derive(Clone)]
pub struct SessionFacade {
    portal: Portal,
    session_id: SessionId,
    session: SharedSession,
}

impl fmt::Debug for SessionFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFacade")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl SessionFacade {
    pub(crate) fn new(portal: Portal, session_id: SessionId, session: SharedSession) -> Self {
        Self {
            portal,
            session_id,
            session,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn title(&self) -> String {
        self.portal.settings().title.clone()
    }

    pub fn theme(&self) -> String {
        lock(&self.session).theme.clone()
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        lock(&self.session).tabs.tabs().to_vec()
    }

    pub fn configuring(&self) -> Option<PortletHandle> {
        lock(&self.session).tabs.configuring().cloned()
    }

    pub fn preferred_locales(&self) -> Vec<String> {
        lock(&self.session).preferred_locales()
    }

    pub fn translation(&self) -> Arc<Translation> {
        self.portal.l10n().translation(&self.preferred_locales())
    }

    pub fn supported_locales(&self) -> Vec<(String, String)> {
        self.portal.l10n().supported_locales().to_vec()
    }

    pub fn portlets(&self) -> Vec<PortletHandle> {
        self.portal
            .registry()
            .all()
            .into_iter()
            .map(|entry| entry.handle)
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.session).connection().is_some()
    }

    /// Pushes `[source, name, ...values]` to this session's browser.
    /// Returns `false` when there is no live connection; nothing is queued.
    pub fn update(&self, source: &PortletHandle, name: &str, values: Vec<Value>) -> bool {
        self.portal.push(
            &self.session,
            PushUpdate::from_portlet(source.clone(), name, values),
        )
    }

    /// Adds a message to the page's top message display.
    pub fn message(&self, text: impl Into<String>, class: impl Into<String>) -> bool {
        self.portal
            .push(&self.session, PushUpdate::portal_message(text, class))
    }
}
