use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use serde_json::json;
use shared::domain::{RenderMode, WindowState};

use super::*;
use crate::session::lock;

#[derive(Default)]
struct Tracking {
    added: AtomicUsize,
    removed: AtomicUsize,
    events: Mutex<Vec<String>>,
}

struct TrackingPortlet {
    handle: &'static str,
    channel: &'static str,
    fail: bool,
    state: Arc<Tracking>,
}

impl TrackingPortlet {
    fn new(handle: &'static str, channel: &'static str) -> (Arc<Self>, Arc<Tracking>) {
        let state = Arc::new(Tracking::default());
        let portlet = Arc::new(Self {
            handle,
            channel,
            fail: false,
            state: Arc::clone(&state),
        });
        (portlet, state)
    }
}

#[async_trait]
impl Portlet for TrackingPortlet {
    fn description(&self, _locales: &[String]) -> Description {
        Description::new(PortletHandle::new(self.handle), self.handle)
    }

    fn channel(&self) -> String {
        self.channel.to_string()
    }

    async fn render(&self, _request: RenderRequest) -> Result<String, PortletError> {
        Ok(String::new())
    }

    async fn handle_event(&self, event: PortletEvent, _portal: SessionFacade) -> Result<(), PortletError> {
        self.state
            .events
            .lock()
            .expect("events")
            .push(format!("{}:{}", self.handle, event.event_type));
        if self.fail {
            return Err(PortletError::Failed("rejected".into()));
        }
        Ok(())
    }

    async fn on_added(&self, _portal: PortalLink) {
        self.state.added.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_removed(&self) {
        self.state.removed.fetch_add(1, Ordering::SeqCst);
    }
}

fn event(channel: &str) -> PortletEvent {
    PortletEvent {
        event_type: "test.Ping".into(),
        channel: channel.into(),
        payload: json!({}),
        locales: Vec::new(),
    }
}

#[tokio::test]
async fn register_and_unregister_run_lifecycle_hooks() {
    let portal = Portal::new(PortalSettings::default());
    let (portlet, state) = TrackingPortlet::new("tracker", "tracker");
    portal.register(portlet).await.expect("register");
    assert_eq!(state.added.load(Ordering::SeqCst), 1);

    let (duplicate, duplicate_state) = TrackingPortlet::new("tracker", "tracker");
    assert!(matches!(
        portal.register(duplicate).await,
        Err(RegistryError::DuplicateHandle(_))
    ));
    assert_eq!(duplicate_state.added.load(Ordering::SeqCst), 0);

    let handle = PortletHandle::new("tracker");
    assert!(portal.unregister(&handle).await.is_some());
    assert_eq!(state.removed.load(Ordering::SeqCst), 1);
    assert!(portal.unregister(&handle).await.is_none());
}

#[tokio::test]
async fn unregister_forgets_session_references() {
    let portal = Portal::new(PortalSettings::default());
    let (portlet, _) = TrackingPortlet::new("tracker", "tracker");
    portal.register(portlet).await.expect("register");
    let handle = PortletHandle::new("tracker");

    let session_id = SessionId::new("s1");
    let session = portal.sessions().get_or_create(&session_id);
    lock(&session).tabs.apply_state_change(
        &handle,
        Some(RenderMode::Edit),
        Some(WindowState::Solo),
    );
    assert_eq!(lock(&session).tabs.tabs().len(), 2);

    portal.unregister(&handle).await;
    let state = lock(&session);
    assert_eq!(state.tabs.tabs().len(), 1);
    assert!(state.tabs.configuring().is_none());
    assert!(state.tabs.selected().is_some());
}

#[tokio::test]
async fn events_reach_every_portlet_on_the_channel_only() {
    let portal = Portal::new(PortalSettings::default());
    let (first, first_state) = TrackingPortlet::new("first", "shared");
    let (second, second_state) = TrackingPortlet::new("second", "shared");
    let (other, other_state) = TrackingPortlet::new("other", "elsewhere");
    for portlet in [first, second, other] {
        portal.register(portlet).await.expect("register");
    }

    let facade = portal.facade(&SessionId::new("s1"));
    assert_eq!(portal.deliver_event(event("shared"), facade).await, 2);
    assert_eq!(first_state.events.lock().expect("events").len(), 1);
    assert_eq!(second_state.events.lock().expect("events").len(), 1);
    assert!(other_state.events.lock().expect("events").is_empty());
}

#[tokio::test]
async fn failing_handlers_are_not_counted() {
    let portal = Portal::new(PortalSettings::default());
    let state = Arc::new(Tracking::default());
    let failing = Arc::new(TrackingPortlet {
        handle: "failing",
        channel: "failing",
        fail: true,
        state: Arc::clone(&state),
    });
    portal.register(failing).await.expect("register");

    let facade = portal.facade(&SessionId::new("s1"));
    assert_eq!(portal.deliver_event(event("failing"), facade).await, 0);
    assert_eq!(state.events.lock().expect("events").len(), 1);
}

#[test]
fn templates_override_comes_first() {
    let settings = PortalSettings::default().with_templates_override("/srv/portal");
    assert_eq!(settings.templates_dirs[0], std::path::PathBuf::from("/srv/portal"));
    assert_eq!(settings.templates_dirs.len(), 2);
}
