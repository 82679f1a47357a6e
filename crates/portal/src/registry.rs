use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use shared::domain::PortletHandle;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    error::{EventError, RegistryError},
    portlet::{ChannelFilter, EventDecl, Portlet},
};

/// A registered portlet with the identifiers captured at registration.
#[derive(Clone)]
pub struct RegisteredPortlet {
    pub handle: PortletHandle,
    pub channel: String,
    pub weight: i32,
    pub portlet: Arc<dyn Portlet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    PortletAdded(PortletHandle),
    PortletRemoved(PortletHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSet {
    Any,
    Only(BTreeSet<String>),
}

impl ChannelSet {
    pub fn allows(&self, channel: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(channels) => channels.contains(channel),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcceptedEvent {
    pub channels: ChannelSet,
    pub decl: EventDecl,
}

/// Event types registered portlets accept, with their allowed channels.
#[derive(Debug, Default)]
pub struct AcceptedEvents {
    table: HashMap<String, AcceptedEvent>,
}

impl AcceptedEvents {
    fn build(entries: &[RegisteredPortlet]) -> Self {
        let mut table: HashMap<String, AcceptedEvent> = HashMap::new();
        for entry in entries {
            for decl in entry.portlet.description(&[]).events {
                let accepted = table
                    .entry(decl.event_type.clone())
                    .or_insert_with(|| AcceptedEvent {
                        channels: ChannelSet::Only(BTreeSet::new()),
                        decl: decl.clone(),
                    });
                match (&mut accepted.channels, decl.channel) {
                    (ChannelSet::Any, _) => {}
                    (channels, ChannelFilter::Any) => *channels = ChannelSet::Any,
                    (ChannelSet::Only(set), ChannelFilter::Only(channel)) => {
                        set.insert(channel);
                    }
                }
            }
        }
        Self { table }
    }

    pub fn get(&self, event_type: &str) -> Option<&AcceptedEvent> {
        self.table.get(event_type)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the declaration to construct the event with, or why it is refused.
    pub fn check(&self, event_type: &str, channel: &str) -> Result<&EventDecl, EventError> {
        let accepted = self
            .table
            .get(event_type)
            .ok_or_else(|| EventError::UnknownType(event_type.to_string()))?;
        if !accepted.channels.allows(channel) {
            return Err(EventError::ChannelNotAccepted {
                event_type: event_type.to_string(),
                channel: channel.to_string(),
            });
        }
        Ok(&accepted.decl)
    }
}

#[derive(Default)]
struct Entries {
    portlets: Vec<RegisteredPortlet>,
    generation: u64,
}

/// Process-wide bookkeeping of active portlets, kept in ascending weight order.
pub struct PortletRegistry {
    entries: RwLock<Entries>,
    accepted: Mutex<Option<(u64, Arc<AcceptedEvents>)>>,
    notices: broadcast::Sender<RegistryEvent>,
}

impl Default for PortletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PortletRegistry {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(Entries::default()),
            accepted: Mutex::new(None),
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.notices.subscribe()
    }

    pub fn register(&self, portlet: Arc<dyn Portlet>) -> Result<RegisteredPortlet, RegistryError> {
        let handle = portlet.description(&[]).handle;
        let entry = RegisteredPortlet {
            channel: portlet.channel(),
            weight: portlet.weight(),
            handle: handle.clone(),
            portlet,
        };
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries.portlets.iter().any(|p| p.handle == handle) {
                return Err(RegistryError::DuplicateHandle(handle));
            }
            let position = entries
                .portlets
                .iter()
                .position(|p| p.weight > entry.weight)
                .unwrap_or(entries.portlets.len());
            entries.portlets.insert(position, entry.clone());
            entries.generation += 1;
            self.lock_accepted().take();
        }
        debug!(%handle, weight = entry.weight, "portlet registered");
        let _ = self.notices.send(RegistryEvent::PortletAdded(handle));
        Ok(entry)
    }

    pub fn unregister(&self, handle: &PortletHandle) -> Option<RegisteredPortlet> {
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let index = entries.portlets.iter().position(|p| &p.handle == handle)?;
            let removed = entries.portlets.remove(index);
            entries.generation += 1;
            self.lock_accepted().take();
            removed
        };
        debug!(%handle, "portlet unregistered");
        let _ = self.notices.send(RegistryEvent::PortletRemoved(handle.clone()));
        Some(removed)
    }

    pub fn find_by_handle(&self, handle: &PortletHandle) -> Option<RegisteredPortlet> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .portlets
            .iter()
            .find(|p| &p.handle == handle)
            .cloned()
    }

    pub fn find_by_channel(&self, channel: &str) -> Vec<RegisteredPortlet> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .portlets
            .iter()
            .filter(|p| p.channel == channel)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<RegisteredPortlet> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .portlets
            .clone()
    }

    /// Aggregated accepted-event table, rebuilt on first use after a change.
    pub fn accepted_events(&self) -> Arc<AcceptedEvents> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut cached = self.lock_accepted();
        if let Some((generation, table)) = cached.as_ref() {
            if *generation == entries.generation {
                return Arc::clone(table);
            }
        }
        let table = Arc::new(AcceptedEvents::build(&entries.portlets));
        *cached = Some((entries.generation, Arc::clone(&table)));
        table
    }

    fn lock_accepted(&self) -> MutexGuard<'_, Option<(u64, Arc<AcceptedEvents>)>> {
        self.accepted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
