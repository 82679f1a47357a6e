use shared::domain::{PortletHandle, RenderMode, TabId, WindowState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabContent {
    Dashboard,
    Solo(PortletHandle),
}

impl TabContent {
    pub fn renderer(&self) -> &'static str {
        match self {
            Self::Dashboard => "_dashboard",
            Self::Solo(_) => "_solo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub content: TabContent,
    pub selected: bool,
    pub closeable: bool,
}

impl TabInfo {
    pub fn portlet(&self) -> Option<&PortletHandle> {
        match &self.content {
            TabContent::Solo(handle) => Some(handle),
            TabContent::Dashboard => None,
        }
    }
}

/// Per-session tabs and edit target.
///
/// Exactly one tab is selected while the list is non-empty. Ids are opaque
/// and never reused within a session, so stale ids from racing requests
/// simply miss and the operation is a no-op.
#[derive(Debug, Clone)]
pub struct TabManager {
    tabs: Vec<TabInfo>,
    next_id: u64,
    configuring: Option<PortletHandle>,
}

impl Default for TabManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TabManager {
    pub fn new() -> Self {
        Self {
            tabs: vec![TabInfo {
                id: TabId(0),
                content: TabContent::Dashboard,
                selected: true,
                closeable: false,
            }],
            next_id: 1,
            configuring: None,
        }
    }

    pub fn tabs(&self) -> &[TabInfo] {
        &self.tabs
    }

    pub fn selected(&self) -> Option<&TabInfo> {
        self.tabs.iter().find(|tab| tab.selected)
    }

    pub fn find_tab(&self, id: TabId) -> Option<&TabInfo> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn select_tab(&mut self, id: TabId) {
        let mut found = false;
        for tab in &mut self.tabs {
            tab.selected = tab.id == id;
            found |= tab.selected;
        }
        if !found {
            if let Some(first) = self.tabs.first_mut() {
                first.selected = true;
            }
        }
    }

    pub fn close_tab(&mut self, id: TabId) {
        let Some(index) = self.tabs.iter().position(|tab| tab.id == id) else {
            return;
        };
        if !self.tabs[index].closeable {
            return;
        }
        let closed = self.tabs.remove(index);
        if closed.selected {
            let next = if index < self.tabs.len() { index } else { 0 };
            if let Some(tab) = self.tabs.get_mut(next) {
                tab.selected = true;
            }
        }
    }

    pub fn add_solo(&mut self, portlet: &PortletHandle) -> TabId {
        if let Some(existing) = self.tabs.iter().find(|tab| tab.portlet() == Some(portlet)) {
            let id = existing.id;
            self.select_tab(id);
            return id;
        }
        let id = TabId(self.next_id);
        self.next_id += 1;
        self.tabs.push(TabInfo {
            id,
            content: TabContent::Solo(portlet.clone()),
            selected: false,
            closeable: true,
        });
        self.select_tab(id);
        id
    }

    /// Drops solo tabs of a portlet that is no longer registered.
    pub fn forget_portlet(&mut self, portlet: &PortletHandle) {
        let ids: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|tab| tab.portlet() == Some(portlet))
            .map(|tab| tab.id)
            .collect();
        for id in ids {
            self.close_tab(id);
        }
        if self.configuring.as_ref() == Some(portlet) {
            self.configuring = None;
        }
    }

    pub fn configure(&mut self, portlet: Option<PortletHandle>) {
        self.configuring = portlet;
    }

    pub fn configuring(&self) -> Option<&PortletHandle> {
        self.configuring.as_ref()
    }

    /// Applies a mode/window-state change requested for `portlet`.
    ///
    /// Edit mode makes the portlet the configuring target. Any other mode,
    /// including "unchanged", ends editing if this portlet was the target.
    pub fn apply_state_change(
        &mut self,
        portlet: &PortletHandle,
        mode: Option<RenderMode>,
        window_state: Option<WindowState>,
    ) {
        if mode == Some(RenderMode::Edit) {
            self.configure(Some(portlet.clone()));
        } else if self.configuring.as_ref() == Some(portlet) {
            self.configure(None);
        }
        if window_state == Some(WindowState::Solo) {
            self.add_solo(portlet);
        }
    }
}

#[cfg(test)]
#[path = "tests/tabs_tests.rs"]
mod tests;
