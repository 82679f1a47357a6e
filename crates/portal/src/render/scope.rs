use std::sync::Arc;

use serde_json::{Map, Value};
use shared::domain::{PortletHandle, RenderMode, WindowState};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
    l10n::Translation,
    portlet::HTML,
    session::SessionState,
    tabs::{TabContent, TabInfo},
    urls::PortalUrls,
    Portal,
};

use super::error_fragment;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub window_state: WindowState,
    pub params: Map<String, Value>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: RenderMode::View,
            window_state: WindowState::Normal,
            params: Map::new(),
        }
    }
}

impl RenderOptions {
    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn window_state(mut self, state: WindowState) -> Self {
        self.window_state = state;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PortletSummary {
    pub handle: PortletHandle,
    pub short_title: String,
    pub title: String,
    pub editable: bool,
    pub soloable: bool,
}

#[derive(Debug, Clone)]
pub struct TabSummary {
    pub info: TabInfo,
    pub label: String,
}

/// Everything the page template may read, captured before rendering starts.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub title: String,
    pub theme: String,
    pub urls: PortalUrls,
    pub locales: Vec<String>,
    pub translation: Arc<Translation>,
    pub supported_locales: Vec<(String, String)>,
    pub tabs: Vec<TabSummary>,
    pub configuring: Option<PortletHandle>,
    pub portlets: Vec<PortletSummary>,
}

impl PageContext {
    pub fn snapshot(portal: &Portal, session: &SessionState) -> Self {
        let locales = session.preferred_locales();
        let translation = portal.l10n().translation(&locales);
        let portlets: Vec<PortletSummary> = portal
            .registry()
            .all()
            .into_iter()
            .map(|entry| {
                let description = entry.portlet.description(&locales);
                PortletSummary {
                    editable: description.supports_mode(HTML, RenderMode::Edit),
                    soloable: description.supports_window_state(HTML, WindowState::Solo),
                    handle: entry.handle,
                    short_title: description.short_title,
                    title: description.title,
                }
            })
            .collect();
        let tabs = session
            .tabs
            .tabs()
            .iter()
            .map(|tab| {
                let label = match &tab.content {
                    TabContent::Dashboard => translation.get("Overview").to_string(),
                    TabContent::Solo(handle) => portlets
                        .iter()
                        .find(|p| &p.handle == handle)
                        .map_or_else(|| handle.to_string(), |p| p.short_title.clone()),
                };
                TabSummary {
                    info: tab.clone(),
                    label,
                }
            })
            .collect();
        Self {
            title: portal.settings().title.clone(),
            theme: session.theme.clone(),
            urls: portal.urls().clone(),
            supported_locales: portal.l10n().supported_locales().to_vec(),
            configuring: session.tabs.configuring().cloned(),
            tabs,
            portlets,
            translation,
            locales,
        }
    }

    pub fn selected_tab(&self) -> Option<&TabSummary> {
        self.tabs.iter().find(|tab| tab.info.selected)
    }

    pub fn portlet(&self, handle: &PortletHandle) -> Option<&PortletSummary> {
        self.portlets.iter().find(|p| &p.handle == handle)
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        self.translation.get(key)
    }
}

pub(crate) struct RenderCall {
    pub handle: PortletHandle,
    pub options: RenderOptions,
    pub reply: oneshot::Sender<String>,
}

pub(crate) struct Slot {
    pub placeholder: String,
    pub handle: PortletHandle,
    pub markup: oneshot::Receiver<String>,
}

/// What the page template sees while it runs on the render worker.
///
/// `render` waits for the portlet's markup; `embed` only starts the
/// render and leaves a placeholder that is filled in once every
/// outstanding portlet has answered.
pub struct RenderScope {
    context: Arc<PageContext>,
    calls: mpsc::UnboundedSender<RenderCall>,
    nonce: String,
    slots: Vec<Slot>,
}

impl RenderScope {
    pub(crate) fn new(context: Arc<PageContext>, calls: mpsc::UnboundedSender<RenderCall>) -> Self {
        Self {
            context,
            calls,
            nonce: Uuid::new_v4().simple().to_string(),
            slots: Vec::new(),
        }
    }

    pub fn page(&self) -> &PageContext {
        &self.context
    }

    /// Blocks the worker until the portlet has produced its markup.
    pub fn render(&mut self, handle: &PortletHandle, options: RenderOptions) -> String {
        let Some(reply) = self.request(handle, options) else {
            return error_fragment(handle, "render was cancelled");
        };
        reply
            .blocking_recv()
            .unwrap_or_else(|_| error_fragment(handle, "render was cancelled"))
    }

    pub fn embed(&mut self, handle: &PortletHandle, options: RenderOptions) -> String {
        let placeholder = format!("<!--portlet-slot:{}:{}-->", self.nonce, self.slots.len());
        match self.request(handle, options) {
            Some(markup) => {
                self.slots.push(Slot {
                    placeholder: placeholder.clone(),
                    handle: handle.clone(),
                    markup,
                });
                placeholder
            }
            None => error_fragment(handle, "render was cancelled"),
        }
    }

    fn request(
        &self,
        handle: &PortletHandle,
        options: RenderOptions,
    ) -> Option<oneshot::Receiver<String>> {
        let (reply, receiver) = oneshot::channel();
        self.calls
            .send(RenderCall {
                handle: handle.clone(),
                options,
                reply,
            })
            .ok()?;
        Some(receiver)
    }

    pub(crate) fn into_slots(self) -> Vec<Slot> {
        self.slots
    }
}
