use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use shared::domain::PortletHandle;

use super::*;
use crate::{
    error::PortletError,
    portlet::{Description, EventDecl, Portlet, PortletEvent, RenderRequest},
    PortalSettings,
};

#[derive(Default)]
struct Echo {
    seen: Mutex<Vec<PortletEvent>>,
}

#[async_trait]
impl Portlet for Echo {
    fn description(&self, _locales: &[String]) -> Description {
        Description::new(PortletHandle::new("echo"), "Echo")
            .accepting(EventDecl::untyped("echo.Say", "echo").positional(["text"]))
    }

    async fn render(&self, _request: RenderRequest) -> Result<String, PortletError> {
        Ok(String::new())
    }

    async fn handle_event(&self, event: PortletEvent, portal: SessionFacade) -> Result<(), PortletError> {
        let text = event.payload["text"].clone();
        self.seen.lock().expect("seen").push(event);
        portal.update(&PortletHandle::new("echo"), "said", vec![text]);
        Ok(())
    }
}

async fn portal_with_echo() -> (Portal, Arc<Echo>) {
    let portal = Portal::new(PortalSettings::default());
    let echo = Arc::new(Echo::default());
    portal.register(echo.clone()).await.expect("register");
    (portal, echo)
}

#[tokio::test]
async fn client_event_is_delivered_and_answered_over_the_channel() {
    let (portal, echo) = portal_with_echo().await;
    let session = SessionId::new("s1");
    let (sender, mut receiver) = mpsc::unbounded_channel();
    portal.client_connected(&session, sender);

    let handled = portal
        .client_message(&session, r#"["echo", "echo.Say", "hi", {"locales": ["de"]}]"#)
        .await
        .expect("accepted");
    assert_eq!(handled, 1);

    let seen = echo.seen.lock().expect("seen");
    assert_eq!(seen[0].payload, json!({ "text": "hi" }));
    assert_eq!(seen[0].locales, vec!["de".to_string()]);
    assert_eq!(receiver.try_recv().expect("update"), r#"["echo","said","hi"]"#);
}

#[tokio::test]
async fn undeclared_and_reserved_targets_are_refused() {
    let (portal, echo) = portal_with_echo().await;
    let session = SessionId::new("s1");

    assert!(matches!(
        portal.client_message(&session, r#"["echo", "evil.Shutdown"]"#).await,
        Err(EventError::UnknownType(_))
    ));
    assert!(matches!(
        portal.client_message(&session, r#"["other", "echo.Say", "x"]"#).await,
        Err(EventError::ChannelNotAccepted { .. })
    ));
    assert!(matches!(
        portal.client_message(&session, r#"["portal", "echo.Say", "x"]"#).await,
        Err(EventError::ReservedTarget(_))
    ));
    assert!(matches!(
        portal.client_message(&session, "{not json").await,
        Err(EventError::Protocol(_))
    ));
    assert!(echo.seen.lock().expect("seen").is_empty());
}

#[tokio::test]
async fn stale_disconnect_does_not_drop_the_newer_connection() {
    let portal = Portal::new(PortalSettings::default());
    let session = SessionId::new("s1");
    let (old_tx, _old_rx) = mpsc::unbounded_channel();
    let (new_tx, mut new_rx) = mpsc::unbounded_channel();

    let old = portal.client_connected(&session, old_tx);
    let new = portal.client_connected(&session, new_tx);
    assert_ne!(old, new);
    portal.client_disconnected(&session, old);

    let facade = portal.facade(&session);
    assert!(facade.is_connected());
    assert!(facade.message("saved", "info"));
    assert_eq!(
        new_rx.try_recv().expect("message"),
        r#"["portal","portal_message","saved","info"]"#
    );

    portal.client_disconnected(&session, new);
    assert!(!facade.is_connected());
    assert!(!facade.message("lost", "info"));
}

#[tokio::test]
async fn connection_notices_are_broadcast() {
    let portal = Portal::new(PortalSettings::default());
    let mut notices = portal.link().subscribe_clients();
    let session = SessionId::new("s1");
    let (sender, _receiver) = mpsc::unbounded_channel();

    let id = portal.client_connected(&session, sender);
    portal.client_disconnected(&session, id);

    match notices.recv().await.expect("connected") {
        ClientNotice::Connected(facade) => assert_eq!(facade.session_id(), &session),
        other => panic!("unexpected notice {other:?}"),
    }
    match notices.recv().await.expect("disconnected") {
        ClientNotice::Disconnected { connection, .. } => assert_eq!(connection, id),
        other => panic!("unexpected notice {other:?}"),
    }
}

#[test]
fn locales_fall_back_to_session_preferences() {
    let mut kwargs = Map::new();
    kwargs.insert("text".into(), json!("x"));
    let (kwargs, locales) = split_locales(kwargs, vec!["fr".into()]);
    assert_eq!(locales, vec!["fr".to_string()]);
    assert_eq!(kwargs.len(), 1);
}
