use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use portal::{
    render::page::escape_html, ClientNotice, Description, EventDecl, PortalLink, Portlet,
    PortletError, PortletEvent, RenderRequest, SessionFacade,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::domain::{PortletHandle, SessionId};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, warn};

pub const HANDLE: &str = "servertime";
pub const ON_OFF_CHANGED: &str = "servertime.OnOffChanged";
pub const NEW_TIME: &str = "new_time";

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnOffChanged {
    pub value: bool,
}

fn now_millis() -> String {
    Utc::now().timestamp_millis().to_string()
}

fn push_time(portal: &SessionFacade) -> bool {
    portal.update(&PortletHandle::new(HANDLE), NEW_TIME, vec![json!(now_millis())])
}

/// Shows the server's clock. Pushes the time when a client connects and,
/// while switched on for a session, once every second.
#[derive(Default)]
pub struct ServerTimePortlet {
    listener: Mutex<Option<JoinHandle<()>>>,
    timers: Timers,
}

type Timers = Arc<Mutex<HashMap<SessionId, JoinHandle<()>>>>;

fn lock_timers(timers: &Timers) -> MutexGuard<'_, HashMap<SessionId, JoinHandle<()>>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stop_timer(timers: &Timers, session: &SessionId) {
    if let Some(timer) = lock_timers(timers).remove(session) {
        timer.abort();
        debug!(%session, "server time updates stopped");
    }
}

impl ServerTimePortlet {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<SessionId, JoinHandle<()>>> {
        lock_timers(&self.timers)
    }

    pub fn is_updating(&self, session: &SessionId) -> bool {
        self.timers().contains_key(session)
    }

    fn switch(&self, on: bool, portal: SessionFacade, locales: &[String]) {
        let session = portal.session_id().clone();
        if !on {
            stop_timer(&self.timers, &session);
            return;
        }
        let mut timers = self.timers();
        if timers.contains_key(&session) {
            return;
        }
        let message = crate::translation(locales).get("TimeUpdateOn").to_string();
        portal.message(message, "info");
        let timer = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                if !push_time(&portal) {
                    debug!(session = %portal.session_id(), "no client for server time");
                }
            }
        });
        timers.insert(session, timer);
    }
}

#[async_trait]
impl Portlet for ServerTimePortlet {
    fn description(&self, locales: &[String]) -> Description {
        let t = crate::translation(locales);
        Description::new(PortletHandle::new(HANDLE), t.get("Server Time Portlet"))
            .accepting(EventDecl::typed::<OnOffChanged>(ON_OFF_CHANGED, HANDLE).positional(["value"]))
    }

    fn weight(&self) -> i32 {
        20
    }

    async fn render(&self, request: RenderRequest) -> Result<String, PortletError> {
        let t = crate::translation(&request.locales);
        Ok(format!(
            "<div class=\"servertime\" data-time=\"{}\">\
             <span class=\"servertime-value\"></span>\
             <label><input type=\"checkbox\" class=\"servertime-toggle\" \
             onchange=\"portal.send('{HANDLE}', '{ON_OFF_CHANGED}', [this.checked])\"> {}</label>\
             </div>\
             <script>portal.on('{HANDLE}', '{NEW_TIME}', function (ms) {{\
             var d = new Date(parseInt(ms, 10));\
             var els = document.querySelectorAll('.servertime-value');\
             for (var i = 0; i < els.length; i++) {{ els[i].textContent = d.toLocaleTimeString(); }}\
             }});</script>",
            now_millis(),
            escape_html(t.get("Automatic update"))
        ))
    }

    async fn handle_event(&self, event: PortletEvent, portal: SessionFacade) -> Result<(), PortletError> {
        let OnOffChanged { value } = event.decode()?;
        self.switch(value, portal, &event.locales);
        Ok(())
    }

    async fn on_added(&self, portal: PortalLink) {
        let mut clients = portal.subscribe_clients();
        let timers = Arc::clone(&self.timers);
        let listener = tokio::spawn(async move {
            loop {
                match clients.recv().await {
                    Ok(ClientNotice::Connected(facade)) => {
                        push_time(&facade);
                    }
                    Ok(ClientNotice::Disconnected { portal, .. }) => {
                        if !portal.is_connected() {
                            stop_timer(&timers, portal.session_id());
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "server time missed client notices");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn on_removed(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
        for (_, timer) in self.timers().drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use portal::{Portal, PortalSettings};
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn connecting_client_receives_the_time() {
        let portal = Portal::new(PortalSettings::default());
        portal
            .register(Arc::new(ServerTimePortlet::new()))
            .await
            .expect("register");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        portal.client_connected(&SessionId::new("s1"), sender);

        let update = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .expect("in time")
            .expect("update");
        assert!(update.starts_with("[\"servertime\",\"new_time\","));
    }

    #[tokio::test]
    async fn switching_on_starts_a_per_session_timer() {
        let portal = Portal::new(PortalSettings::default());
        let portlet = Arc::new(ServerTimePortlet::new());
        portal.register(portlet.clone()).await.expect("register");
        let session = SessionId::new("s1");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        portal.client_connected(&session, sender);

        portal
            .client_message(&session, r#"["servertime", "servertime.OnOffChanged", true]"#)
            .await
            .expect("accepted");
        assert!(portlet.is_updating(&session));
        assert!(!portlet.is_updating(&SessionId::new("other")));

        let mut saw_message = false;
        for _ in 0..3 {
            let update = tokio::time::timeout(Duration::from_secs(3), receiver.recv())
                .await
                .expect("in time")
                .expect("update");
            saw_message |= update.starts_with("[\"portal\",\"portal_message\"");
        }
        assert!(saw_message);

        portal
            .client_message(&session, r#"["servertime", "servertime.OnOffChanged", false]"#)
            .await
            .expect("accepted");
        assert!(!portlet.is_updating(&session));
    }

    #[tokio::test]
    async fn closing_the_last_connection_stops_the_timer() {
        let portal = Portal::new(PortalSettings::default());
        let portlet = Arc::new(ServerTimePortlet::new());
        portal.register(portlet.clone()).await.expect("register");
        let session = SessionId::new("s1");

        let (first, _first_rx) = mpsc::unbounded_channel();
        let stale = portal.client_connected(&session, first);
        let (second, _second_rx) = mpsc::unbounded_channel();
        let current = portal.client_connected(&session, second);
        portal
            .client_message(&session, r#"["servertime", "servertime.OnOffChanged", true]"#)
            .await
            .expect("accepted");
        assert!(portlet.is_updating(&session));

        // A replaced socket closing late must not stop updates.
        portal.client_disconnected(&session, stale);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(portlet.is_updating(&session));

        portal.client_disconnected(&session, current);
        tokio::time::timeout(Duration::from_secs(2), async {
            while portlet.is_updating(&session) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timer stopped");
    }
}
