use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{RenderMode, WindowState};

use super::*;
use crate::{
    error::PortletError,
    facade::SessionFacade,
    portlet::{Description, EventDecl, Portlet, PortletEvent, RenderRequest},
    PortalSettings,
};

#[derive(Debug, Serialize, Deserialize)]
struct SetText {
    text: String,
}

/// Shows whatever text it was last told to, in the mode it is rendered in.
#[derive(Default)]
struct Board {
    text: Mutex<String>,
}

#[async_trait]
impl Portlet for Board {
    fn description(&self, _locales: &[String]) -> Description {
        Description::new(PortletHandle::new("board"), "Board")
            .with_markup(
                crate::portlet::HTML,
                shared::domain::MarkupType {
                    render_modes: vec![RenderMode::View, RenderMode::Edit],
                    window_states: vec![WindowState::Normal, WindowState::Solo],
                },
            )
            .accepting(EventDecl::typed::<SetText>("board.SetText", "board"))
    }

    async fn render(&self, request: RenderRequest) -> Result<String, PortletError> {
        let text = self.text.lock().expect("text").clone();
        Ok(format!("<p class=\"board-{}\">{text}</p>", request.mode))
    }

    async fn handle_event(&self, event: PortletEvent, _portal: SessionFacade) -> Result<(), PortletError> {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let SetText { text } = event.decode()?;
        *self.text.lock().expect("text") = text;
        Ok(())
    }

    async fn resource(&self, path: &str, _theme: &str, _locales: &[String]) -> Option<Resource> {
        (path == "board.css").then(|| Resource::new("text/css", "p {}"))
    }
}

struct Plain(&'static str);

#[async_trait]
impl Portlet for Plain {
    fn description(&self, _locales: &[String]) -> Description {
        Description::new(PortletHandle::new(self.0), self.0).with_markup(
            crate::portlet::HTML,
            shared::domain::MarkupType {
                render_modes: vec![RenderMode::View, RenderMode::Edit],
                window_states: vec![WindowState::Normal],
            },
        )
    }

    async fn render(&self, request: RenderRequest) -> Result<String, PortletError> {
        Ok(format!("<p class=\"{}-{}\"></p>", self.0, request.mode))
    }
}

async fn portal() -> (Portal, Arc<Board>) {
    let portal = Portal::new(PortalSettings {
        prefix: "/minpor".into(),
        ..PortalSettings::default()
    });
    let board = Arc::new(Board::default());
    portal.register(board.clone()).await.expect("register");
    portal.register(Arc::new(Plain("notes"))).await.expect("register");
    (portal, board)
}

fn session() -> SessionId {
    SessionId::new("s1")
}

fn page_body(response: PortalResponse) -> String {
    match response {
        PortalResponse::Page { body, .. } => body,
        other => panic!("expected a page, got {other:?}"),
    }
}

#[tokio::test]
async fn url_event_is_handled_before_the_page_renders() {
    let (portal, _) = portal().await;
    let request = PortalRequest::new(session(), "/minpor/board/event/board.SetText/board")
        .param("text", "fresh");
    let mut cycle = RequestCycle::new();

    let body = page_body(portal.handle_request_traced(request, &mut cycle).await);
    assert!(body.contains("<p class=\"board-view\">fresh</p>"));

    let phases: Vec<RenderPhase> = cycle
        .history()
        .iter()
        .copied()
        .filter(|p| !matches!(p, RenderPhase::Rendering { .. }))
        .collect();
    assert_eq!(
        phases,
        vec![
            RenderPhase::Received,
            RenderPhase::ActionsApplied,
            RenderPhase::EventDispatched,
            RenderPhase::EventCompleted,
            RenderPhase::Complete,
        ]
    );
}

#[tokio::test]
async fn undeclared_event_is_never_delivered() {
    let (portal, board) = portal().await;
    let request = PortalRequest::new(session(), "/minpor/board/event/board.Reset/board")
        .param("text", "evil");
    let mut cycle = RequestCycle::new();

    page_body(portal.handle_request_traced(request, &mut cycle).await);
    assert!(board.text.lock().expect("text").is_empty());
    assert!(!cycle.history().contains(&RenderPhase::EventDispatched));
}

#[tokio::test]
async fn editing_one_portlet_ends_editing_of_another() {
    let (portal, _) = portal().await;
    page_body(
        portal
            .handle_request(PortalRequest::new(session(), "/minpor/board/edit/_"))
            .await,
    );
    let body = page_body(
        portal
            .handle_request(PortalRequest::new(session(), "/minpor/notes/edit/_"))
            .await,
    );
    assert!(body.contains("notes-edit"));
    assert!(body.contains("board-view"));

    let body = page_body(
        portal
            .handle_request(PortalRequest::new(session(), "/minpor/portal/finish-editing"))
            .await,
    );
    assert!(body.contains("notes-view"));
}

#[tokio::test]
async fn solo_tab_is_opened_selected_and_closed() {
    let (portal, _) = portal().await;
    let body = page_body(
        portal
            .handle_request(PortalRequest::new(session(), "/minpor/board/_/solo"))
            .await,
    );
    assert!(body.contains("class=\"portlet solo\""));
    assert!(!body.contains("notes-view"));

    let solo_id = {
        let shared = portal.sessions().get(&session()).expect("session");
        let state = lock(&shared);
        state.tabs.selected().expect("selected").id
    };
    let body = page_body(
        portal
            .handle_request(
                PortalRequest::new(session(), "/minpor/portal/close")
                    .param("tab", solo_id.to_string()),
            )
            .await,
    );
    assert!(body.contains("notes-view"));
}

#[tokio::test]
async fn language_action_overrides_accept_language() {
    let (portal, _) = portal().await;
    let request = PortalRequest::new(session(), "/minpor/").accept_language("en-US,en;q=0.8");
    match portal.handle_request(request).await {
        PortalResponse::Page {
            content_language, ..
        } => assert_eq!(content_language.as_deref(), Some("en")),
        other => panic!("expected a page, got {other:?}"),
    }

    let request = PortalRequest::new(session(), "/minpor/portal/language")
        .param("language", "de")
        .accept_language("en-US");
    match portal.handle_request(request).await {
        PortalResponse::Page {
            content_language, ..
        } => assert_eq!(content_language.as_deref(), Some("de")),
        other => panic!("expected a page, got {other:?}"),
    }
}

#[tokio::test]
async fn resources_are_served_and_traversal_is_refused() {
    let (portal, _) = portal().await;
    let get = |path: &str| portal.handle_request(PortalRequest::new(session(), path));

    match get("/minpor/portal-resource/functions.js").await {
        PortalResponse::Resource(resource) => {
            assert!(resource.content_type.ends_with("/javascript"))
        }
        other => panic!("expected functions.js, got {other:?}"),
    }
    assert!(matches!(
        get("/minpor/theme-resource/portal.css").await,
        PortalResponse::Resource(_)
    ));
    assert!(matches!(
        get("/minpor/portlet-resource/board/board.css").await,
        PortalResponse::Resource(_)
    ));
    assert_eq!(
        get("/minpor/portal-resource/../Cargo.toml").await,
        PortalResponse::NotFound
    );
    assert_eq!(
        get("/minpor/portlet-resource/board/%2E%2E/secret").await,
        PortalResponse::NotFound
    );
    assert_eq!(
        get("/minpor/portlet-resource/ghost/x.css").await,
        PortalResponse::NotFound
    );
}

#[tokio::test]
async fn unknown_portlets_and_foreign_paths() {
    let (portal, _) = portal().await;
    assert_eq!(
        portal
            .handle_request(PortalRequest::new(session(), "/minpor/ghost/edit/_"))
            .await,
        PortalResponse::NotFound
    );
    assert_eq!(
        portal
            .handle_request(PortalRequest::new(session(), "/elsewhere"))
            .await,
        PortalResponse::NotPortal
    );
}

#[tokio::test]
async fn stray_requests_leave_no_sessions_behind() {
    let (portal, _) = portal().await;
    for i in 0..50 {
        let id = SessionId::new(format!("stray{i}"));
        for path in [
            "/favicon.ico",
            "/minpor/portal-resource/functions.js",
            "/minpor/theme-resource/portal.css",
            "/minpor/portlet-resource/board/board.css",
            "/minpor/ghost/edit/_",
            "/minpor/eventExchange",
        ] {
            portal
                .handle_request(PortalRequest::new(id.clone(), path).accept_language("de"))
                .await;
        }
    }
    assert_eq!(portal.sessions().len(), 0);

    page_body(portal.handle_request(PortalRequest::new(session(), "/minpor/")).await);
    assert_eq!(portal.sessions().len(), 1);
}

#[test]
fn confined_paths_stay_below_root() {
    let root = Path::new("/srv/static");
    assert_eq!(
        confined(root, "css/site.css"),
        Some(PathBuf::from("/srv/static/css/site.css"))
    );
    assert_eq!(confined(root, "../etc/passwd"), None);
    assert_eq!(confined(root, "/etc/passwd"), None);
}

#[test]
fn content_types_come_from_the_file_extension() {
    assert_eq!(content_type("x.svg"), "image/svg+xml");
    assert_eq!(content_type("fonts/x.woff2"), "font/woff2");
    assert_eq!(content_type("img/x.webp"), "image/webp");
    assert_eq!(content_type("x.wasm"), "application/wasm");
    assert_eq!(content_type("no-extension"), "application/octet-stream");
}
