use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use shared::domain::{ConnectionId, SessionId};
use tokio::sync::mpsc;

use crate::tabs::TabManager;

pub const DEFAULT_THEME: &str = "default";

/// The live push-channel endpoint of a session.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<String>,
}

/// UI state of one browser session.
#[derive(Debug)]
pub struct SessionState {
    pub tabs: TabManager,
    pub theme: String,
    accept_languages: Vec<String>,
    language_override: Option<Vec<String>>,
    connection: Option<ClientConnection>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            tabs: TabManager::new(),
            theme: DEFAULT_THEME.to_string(),
            accept_languages: Vec::new(),
            language_override: None,
            connection: None,
        }
    }
}

impl SessionState {
    /// Locale preference list, most preferred first.
    pub fn preferred_locales(&self) -> Vec<String> {
        self.language_override
            .clone()
            .unwrap_or_else(|| self.accept_languages.clone())
    }

    pub fn set_accept_languages(&mut self, locales: Vec<String>) {
        self.accept_languages = locales;
    }

    pub fn override_language(&mut self, locale: impl Into<String>) {
        self.language_override = Some(vec![locale.into()]);
    }

    pub fn connection(&self) -> Option<&ClientConnection> {
        self.connection.as_ref()
    }

    /// Replaces any earlier connection; the last connect wins.
    pub fn connect(&mut self, connection: ClientConnection) -> Option<ClientConnection> {
        self.connection.replace(connection)
    }

    /// Clears the connection only if `id` is still the current one.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        if self.connection.as_ref().is_some_and(|c| c.id == id) {
            self.connection = None;
            true
        } else {
            false
        }
    }
}

pub type SharedSession = Arc<Mutex<SessionState>>;

pub fn lock(session: &SharedSession) -> MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sessions live for the process lifetime and are created on first use.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn get_or_create(&self, id: &SessionId) -> SharedSession {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(id.clone()).or_default())
    }

    pub fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn all(&self) -> Vec<SharedSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
