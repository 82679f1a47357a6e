use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use shared::domain::{PortletHandle, SessionId, TabId};
use tracing::{debug, info, warn};

use crate::{
    l10n::parse_accept_language,
    portlet::Resource,
    render::{render_page, scope::PageContext, RenderPhase, RequestCycle},
    routing::{classify, create_event, EventTarget, PortalAction, Route, StateChange},
    session::{lock, SharedSession, DEFAULT_THEME},
    Portal,
};

/// An HTTP request reduced to what the portal needs.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub session_id: SessionId,
    pub path: String,
    /// Query and form parameters in arrival order.
    pub params: Vec<(String, String)>,
    pub accept_language: Option<String>,
}

impl PortalRequest {
    pub fn new(session_id: SessionId, path: impl Into<String>) -> Self {
        Self {
            session_id,
            path: path.into(),
            params: Vec::new(),
            accept_language: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn accept_language(mut self, header: impl Into<String>) -> Self {
        self.accept_language = Some(header.into());
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn kwargs(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalResponse {
    Page {
        body: String,
        content_language: Option<String>,
    },
    Resource(Resource),
    NotFound,
    /// The path is outside the portal's prefix.
    NotPortal,
    Error {
        status: u16,
        body: String,
    },
}

fn content_type(path: &str) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

/// Refuses anything that could leave `root`.
fn confined(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

async fn read_file(root: &Path, relative: &str) -> Option<Resource> {
    let Some(path) = confined(root, relative) else {
        warn!(path = relative, "refusing resource path");
        return None;
    };
    let body = tokio::fs::read(&path).await.ok()?;
    Some(Resource::new(content_type(relative), body))
}

impl Portal {
    pub async fn handle_request(&self, request: PortalRequest) -> PortalResponse {
        let mut cycle = RequestCycle::new();
        self.handle_request_traced(request, &mut cycle).await
    }

    /// Runs one request cycle: actions, then events (awaited), then the render.
    pub async fn handle_request_traced(
        &self,
        request: PortalRequest,
        cycle: &mut RequestCycle,
    ) -> PortalResponse {
        let route = classify(&request.path, self.urls().prefix());
        debug!(path = %request.path, ?route, "portal request");

        // Only routes that render a page get to create a session.
        let route = match route {
            Route::NotPortalRequest => return PortalResponse::NotPortal,
            Route::EventExchange => return PortalResponse::NotFound,
            Route::PortalResource(path) => return self.static_resource(&path).await,
            Route::ThemeResource(path) => {
                let session = self.sessions().get(&request.session_id);
                return self.theme_resource(session.as_ref(), &path).await;
            }
            Route::PortletResource { handle, path } => {
                let session = self.sessions().get(&request.session_id);
                return self.portlet_resource(session.as_ref(), &handle, &path).await;
            }
            Route::PortletStateChange { ref handle, .. } | Route::PortletEvent { ref handle, .. }
                if self.registry().find_by_handle(handle).is_none() =>
            {
                debug!(%handle, "request for unknown portlet");
                return PortalResponse::NotFound;
            }
            page_route => page_route,
        };

        let session = self.sessions().get_or_create(&request.session_id);
        if let Some(header) = &request.accept_language {
            lock(&session).set_accept_languages(parse_accept_language(header));
        }

        match route {
            Route::Page => cycle.advance(RenderPhase::ActionsApplied),
            Route::PortalAction(action) => {
                self.perform_action(&session, &action, &request);
                cycle.advance(RenderPhase::ActionsApplied);
            }
            Route::PortletStateChange { handle, change, .. } => {
                if !self.apply_change(&session, &handle, change) {
                    return PortalResponse::NotFound;
                }
                cycle.advance(RenderPhase::ActionsApplied);
            }
            Route::PortletEvent {
                handle,
                change,
                event,
                ..
            } => {
                if !self.apply_change(&session, &handle, change) {
                    return PortalResponse::NotFound;
                }
                cycle.advance(RenderPhase::ActionsApplied);
                self.fire_url_event(&request, &session, event, cycle).await;
            }
            _ => return PortalResponse::NotFound,
        }

        self.render_for(&request.session_id, &session, cycle).await
    }

    fn perform_action(&self, session: &SharedSession, action: &PortalAction, request: &PortalRequest) {
        let tab = request
            .get("tab")
            .and_then(|t| t.parse::<u64>().ok())
            .map(TabId);
        let mut state = lock(session);
        match action {
            PortalAction::Select => match tab {
                Some(id) => state.tabs.select_tab(id),
                None => debug!("select without a tab id"),
            },
            PortalAction::Close => match tab {
                Some(id) => state.tabs.close_tab(id),
                None => debug!("close without a tab id"),
            },
            PortalAction::Language => match request.get("language") {
                Some(language) if !language.is_empty() => state.override_language(language),
                _ => debug!("language action without a language"),
            },
            PortalAction::FinishEditing => state.tabs.configure(None),
            PortalAction::Unknown(name) => debug!(action = %name, "ignoring unknown portal action"),
        }
    }

    /// `false` if no portlet has `handle`.
    fn apply_change(
        &self,
        session: &SharedSession,
        handle: &PortletHandle,
        change: Option<StateChange>,
    ) -> bool {
        if self.registry().find_by_handle(handle).is_none() {
            debug!(%handle, "request for unknown portlet");
            return false;
        }
        if let Some(change) = change {
            lock(session)
                .tabs
                .apply_state_change(handle, change.mode, change.window_state);
        }
        true
    }

    async fn fire_url_event(
        &self,
        request: &PortalRequest,
        session: &SharedSession,
        target: EventTarget,
        cycle: &mut RequestCycle,
    ) {
        let locales = lock(session).preferred_locales();
        let created = create_event(
            &self.registry().accepted_events(),
            &target.event_type,
            &target.channel,
            Vec::new(),
            request.kwargs(),
            locales,
        );
        let event = match created {
            Ok(event) => event,
            Err(error) => {
                warn!(session_id = %request.session_id, %error, "rejected event from URL");
                return;
            }
        };
        cycle.advance(RenderPhase::EventDispatched);
        let handled = self.deliver_event(event, self.facade(&request.session_id)).await;
        debug!(event_type = %target.event_type, handled, "URL event completed");
        cycle.advance(RenderPhase::EventCompleted);
    }

    async fn render_for(
        &self,
        session_id: &SessionId,
        session: &SharedSession,
        cycle: &mut RequestCycle,
    ) -> PortalResponse {
        let context = PageContext::snapshot(self, &lock(session));
        let content_language = context.translation.content_language();
        match render_page(self, context, cycle).await {
            Ok(body) => {
                info!(%session_id, "portal page rendered");
                PortalResponse::Page {
                    body,
                    content_language,
                }
            }
            Err(error) => {
                warn!(%session_id, %error, "portal page failed");
                PortalResponse::Error {
                    status: 500,
                    body: error.to_string(),
                }
            }
        }
    }

    async fn static_resource(&self, path: &str) -> PortalResponse {
        match read_file(&self.settings().static_dir, path).await {
            Some(resource) => PortalResponse::Resource(resource),
            None => PortalResponse::NotFound,
        }
    }

    /// Looks in `themes/{theme}/` of each template directory, then falls
    /// back to the default theme.
    async fn theme_resource(&self, session: Option<&SharedSession>, path: &str) -> PortalResponse {
        let theme = session.map_or_else(|| DEFAULT_THEME.to_string(), |s| lock(s).theme.clone());
        let mut themes = vec![theme];
        if themes[0] != DEFAULT_THEME {
            themes.push(DEFAULT_THEME.to_string());
        }
        for theme in &themes {
            for dir in &self.settings().templates_dirs {
                if let Some(resource) = read_file(&dir.join("themes").join(theme), path).await {
                    return PortalResponse::Resource(resource);
                }
            }
        }
        PortalResponse::NotFound
    }

    async fn portlet_resource(
        &self,
        session: Option<&SharedSession>,
        handle: &PortletHandle,
        path: &str,
    ) -> PortalResponse {
        if confined(Path::new(""), path).is_none() {
            warn!(%handle, path, "refusing portlet resource path");
            return PortalResponse::NotFound;
        }
        let Some(entry) = self.registry().find_by_handle(handle) else {
            return PortalResponse::NotFound;
        };
        let (theme, locales) = match session {
            Some(session) => {
                let state = lock(session);
                (state.theme.clone(), state.preferred_locales())
            }
            None => (DEFAULT_THEME.to_string(), Vec::new()),
        };
        match entry.portlet.resource(path, &theme, &locales).await {
            Some(resource) => PortalResponse::Resource(resource),
            None => PortalResponse::NotFound,
        }
    }
}

#[cfg(test)]
#[path = "tests/request_tests.rs"]
mod tests;
