use super::*;

fn handle(name: &str) -> PortletHandle {
    PortletHandle::new(name)
}

fn selected_count(manager: &TabManager) -> usize {
    manager.tabs().iter().filter(|tab| tab.selected).count()
}

fn selected_id(manager: &TabManager) -> TabId {
    manager.selected().expect("a selected tab").id
}

#[test]
fn starts_with_selected_dashboard() {
    let manager = TabManager::new();
    assert_eq!(manager.tabs().len(), 1);
    let dashboard = &manager.tabs()[0];
    assert_eq!(dashboard.content, TabContent::Dashboard);
    assert!(dashboard.selected);
    assert!(!dashboard.closeable);
}

#[test]
fn add_solo_twice_keeps_one_tab_and_reselects_it() {
    let mut manager = TabManager::new();
    let first = manager.add_solo(&handle("p"));
    manager.select_tab(TabId(0));
    let second = manager.add_solo(&handle("p"));
    assert_eq!(first, second);
    assert_eq!(
        manager
            .tabs()
            .iter()
            .filter(|tab| tab.portlet() == Some(&handle("p")))
            .count(),
        1
    );
    assert_eq!(selected_id(&manager), first);
}

#[test]
fn select_unknown_tab_falls_back_to_first() {
    let mut manager = TabManager::new();
    manager.add_solo(&handle("p"));
    manager.select_tab(TabId(999));
    assert_eq!(selected_id(&manager), TabId(0));
    assert_eq!(selected_count(&manager), 1);
}

#[test]
fn closing_selected_tab_selects_tab_now_at_same_position() {
    let mut manager = TabManager::new();
    let a = manager.add_solo(&handle("a"));
    let b = manager.add_solo(&handle("b"));
    manager.add_solo(&handle("c"));
    manager.select_tab(a);
    manager.close_tab(a);
    assert_eq!(selected_id(&manager), b);
}

#[test]
fn closing_selected_last_tab_selects_first() {
    let mut manager = TabManager::new();
    manager.add_solo(&handle("a"));
    let b = manager.add_solo(&handle("b"));
    manager.close_tab(b);
    assert_eq!(selected_id(&manager), TabId(0));
    assert_eq!(manager.tabs().len(), 2);
}

#[test]
fn closing_unselected_tab_keeps_selection() {
    let mut manager = TabManager::new();
    let a = manager.add_solo(&handle("a"));
    let b = manager.add_solo(&handle("b"));
    manager.close_tab(a);
    assert_eq!(selected_id(&manager), b);
}

#[test]
fn unknown_and_uncloseable_tabs_are_no_ops() {
    let mut manager = TabManager::new();
    let a = manager.add_solo(&handle("a"));
    manager.close_tab(TabId(42));
    manager.close_tab(TabId(0));
    assert_eq!(manager.tabs().len(), 2);
    assert_eq!(selected_id(&manager), a);
}

#[test]
fn exactly_one_tab_selected_for_any_operation_sequence() {
    let mut manager = TabManager::new();
    let mut ids = vec![TabId(0)];
    // Deterministic pseudo-random walk over select/close/add.
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    for step in 0..500 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let pick = ids[(state as usize) % ids.len()];
        match state % 3 {
            0 => manager.select_tab(pick),
            1 => manager.close_tab(pick),
            _ => ids.push(manager.add_solo(&handle(&format!("p{}", step % 7)))),
        }
        if (state >> 8) % 11 == 0 {
            manager.select_tab(TabId(10_000 + step));
        }
        assert!(!manager.tabs().is_empty());
        assert_eq!(selected_count(&manager), 1, "after step {step}");
    }
}

#[test]
fn edit_mode_switches_configuring_target() {
    let mut manager = TabManager::new();
    manager.apply_state_change(&handle("b"), Some(RenderMode::Edit), None);
    manager.apply_state_change(&handle("a"), Some(RenderMode::Edit), None);
    assert_eq!(manager.configuring(), Some(&handle("a")));
}

#[test]
fn leaving_edit_mode_clears_only_own_target() {
    let mut manager = TabManager::new();
    manager.apply_state_change(&handle("a"), Some(RenderMode::Edit), None);
    manager.apply_state_change(&handle("b"), Some(RenderMode::View), None);
    assert_eq!(manager.configuring(), Some(&handle("a")));
    manager.apply_state_change(&handle("a"), None, Some(WindowState::Normal));
    assert_eq!(manager.configuring(), None);
}

#[test]
fn solo_state_adds_solo_tab() {
    let mut manager = TabManager::new();
    manager.apply_state_change(&handle("a"), Some(RenderMode::Edit), Some(WindowState::Solo));
    let selected = manager.selected().expect("selected");
    assert_eq!(selected.portlet(), Some(&handle("a")));
    assert_eq!(manager.configuring(), Some(&handle("a")));
}

#[test]
fn forgetting_portlet_removes_its_tabs_and_edit_state() {
    let mut manager = TabManager::new();
    manager.apply_state_change(&handle("a"), Some(RenderMode::Edit), Some(WindowState::Solo));
    manager.forget_portlet(&handle("a"));
    assert_eq!(manager.tabs().len(), 1);
    assert_eq!(selected_id(&manager), TabId(0));
    assert_eq!(manager.configuring(), None);
}
