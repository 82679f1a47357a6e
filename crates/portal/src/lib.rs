//! Portal core: aggregates portlets into per-session pages.
//!
//! The [`Portal`] handle is cheap to clone and owns the portlet registry,
//! the session store, translations, and the page template. HTTP and
//! WebSocket plumbing live in the server crate; everything here is
//! transport-agnostic.

pub mod error;
pub mod exchange;
pub mod facade;
pub mod l10n;
pub mod portlet;
pub mod registry;
pub mod render;
pub mod request;
pub mod routing;
pub mod session;
pub mod tabs;
pub mod urls;

use std::{
    path::PathBuf,
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};

use shared::domain::{PortletHandle, SessionId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use crate::{
    error::{EventError, PortalError, PortletError, RegistryError, TemplateError},
    exchange::{ClientNotice, PortalLink},
    facade::SessionFacade,
    l10n::{L10n, Translation},
    portlet::{Description, EventDecl, Portlet, PortletEvent, RenderRequest, Resource, HTML},
    registry::{PortletRegistry, RegisteredPortlet},
    render::{
        page::{DefaultPage, Template},
        scope::{PageContext, RenderOptions, RenderScope},
        RenderPhase, RequestCycle,
    },
    request::{PortalRequest, PortalResponse},
    session::SessionStore,
    urls::{PortalUrls, UrlGenerator},
};

#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub prefix: String,
    pub title: String,
    /// Searched in order for `l10n/`, `themes/` and template overrides.
    pub templates_dirs: Vec<PathBuf>,
    pub static_dir: PathBuf,
    pub render_timeout: Duration,
    pub event_timeout: Duration,
}

impl Default for PortalSettings {
    fn default() -> Self {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            prefix: "/".to_string(),
            title: "Portal".to_string(),
            templates_dirs: vec![root.join("templates")],
            static_dir: root.join("static"),
            render_timeout: Duration::from_secs(10),
            event_timeout: Duration::from_secs(10),
        }
    }
}

impl PortalSettings {
    /// Puts `dir` in front of the built-in templates.
    pub fn with_templates_override(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dirs.insert(0, dir.into());
        self
    }
}

pub(crate) struct PortalInner {
    settings: PortalSettings,
    urls: PortalUrls,
    registry: PortletRegistry,
    sessions: SessionStore,
    l10n: L10n,
    template: Arc<dyn Template>,
    clients: broadcast::Sender<ClientNotice>,
    next_connection: AtomicU64,
}

#[derive(Clone)]
pub struct Portal {
    pub(crate) inner: Arc<PortalInner>,
}

impl Portal {
    pub fn new(settings: PortalSettings) -> Self {
        Self::with_template(settings, Arc::new(DefaultPage))
    }

    pub fn with_template(settings: PortalSettings, template: Arc<dyn Template>) -> Self {
        let l10n = L10n::load(&settings.templates_dirs);
        let (clients, _) = broadcast::channel(64);
        info!(
            prefix = %settings.prefix,
            locales = l10n.supported_locales().len(),
            "portal created"
        );
        Self {
            inner: Arc::new(PortalInner {
                urls: PortalUrls::new(&settings.prefix),
                settings,
                registry: PortletRegistry::new(),
                sessions: SessionStore::new(),
                l10n,
                template,
                clients,
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.inner.settings
    }

    pub fn urls(&self) -> &PortalUrls {
        &self.inner.urls
    }

    pub fn registry(&self) -> &PortletRegistry {
        &self.inner.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn l10n(&self) -> &L10n {
        &self.inner.l10n
    }

    pub(crate) fn template(&self) -> Arc<dyn Template> {
        Arc::clone(&self.inner.template)
    }

    /// Registers `portlet` and lets it hook into the portal.
    pub async fn register(&self, portlet: Arc<dyn Portlet>) -> Result<RegisteredPortlet, RegistryError> {
        let entry = self.registry().register(portlet)?;
        entry.portlet.on_added(self.link()).await;
        info!(handle = %entry.handle, channel = %entry.channel, "portlet added");
        Ok(entry)
    }

    /// Removes the portlet and any session state that refers to it.
    pub async fn unregister(&self, handle: &PortletHandle) -> Option<RegisteredPortlet> {
        let entry = self.registry().unregister(handle)?;
        for session in self.sessions().all() {
            session::lock(&session).tabs.forget_portlet(handle);
        }
        entry.portlet.on_removed().await;
        info!(%handle, "portlet removed");
        Some(entry)
    }

    pub fn facade(&self, session_id: &SessionId) -> SessionFacade {
        let session = self.sessions().get_or_create(session_id);
        SessionFacade::new(self.clone(), session_id.clone(), session)
    }

    pub fn url_generator(&self, entry: &RegisteredPortlet) -> UrlGenerator {
        UrlGenerator::new(
            self.urls().prefix(),
            entry.handle.clone(),
            entry.channel.clone(),
        )
    }

    /// Delivers `event` to every portlet on its channel and waits for all
    /// of them, up to the event timeout each. Returns how many handled it.
    pub async fn deliver_event(&self, event: PortletEvent, portal: SessionFacade) -> usize {
        let targets = self.registry().find_by_channel(&event.channel);
        debug!(
            event_type = %event.event_type,
            channel = %event.channel,
            targets = targets.len(),
            "delivering event"
        );
        let timeout = self.settings().event_timeout;
        let deliveries = targets.into_iter().map(|entry| {
            let event = event.clone();
            let portal = portal.clone();
            async move {
                let handled =
                    tokio::time::timeout(timeout, entry.portlet.handle_event(event, portal)).await;
                match handled {
                    Ok(Ok(())) => true,
                    Ok(Err(error)) => {
                        warn!(handle = %entry.handle, %error, "event handler failed");
                        false
                    }
                    Err(_) => {
                        warn!(handle = %entry.handle, "event handler timed out");
                        false
                    }
                }
            }
        });
        futures::future::join_all(deliveries)
            .await
            .into_iter()
            .filter(|handled| *handled)
            .count()
    }
}

#[cfg(test)]
#[path = "tests/portal_tests.rs"]
mod tests;
