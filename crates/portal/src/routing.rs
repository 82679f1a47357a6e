use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use shared::domain::{PortletHandle, RenderMode, WindowState};
use tracing::debug;

use crate::{
    error::EventError,
    portlet::PortletEvent,
    registry::AcceptedEvents,
    urls::{
        normalize_prefix, EVENT_EXCHANGE, EVENT_SEGMENT, PORTAL_RESOURCE, PORTAL_SEGMENT,
        PORTLET_RESOURCE, THEME_RESOURCE, UNCHANGED,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalAction {
    Select,
    Close,
    Language,
    FinishEditing,
    Unknown(String),
}

impl PortalAction {
    fn parse(action: &str) -> Self {
        match action {
            "select" => Self::Select,
            "close" => Self::Close,
            "language" => Self::Language,
            "finish-editing" => Self::FinishEditing,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// New mode and window state; `None` leaves the value unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateChange {
    pub mode: Option<RenderMode>,
    pub window_state: Option<WindowState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTarget {
    pub event_type: String,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    NotPortalRequest,
    EventExchange,
    Page,
    PortalAction(PortalAction),
    PortalResource(String),
    ThemeResource(String),
    PortletResource {
        handle: PortletHandle,
        path: String,
    },
    PortletStateChange {
        handle: PortletHandle,
        change: Option<StateChange>,
        rest: Vec<String>,
    },
    PortletEvent {
        handle: PortletHandle,
        change: Option<StateChange>,
        event: EventTarget,
        rest: Vec<String>,
    },
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn parse_or_unchanged<T: std::str::FromStr>(segment: &str) -> Option<T> {
    if segment == UNCHANGED {
        return None;
    }
    let parsed = segment.parse().ok();
    if parsed.is_none() {
        debug!(segment, "ignoring unknown mode or window state in portal URL");
    }
    parsed
}

/// Classifies a request path relative to the portal's mount prefix.
pub fn classify(path: &str, prefix: &str) -> Route {
    let prefix = normalize_prefix(prefix);
    let rest = if path == prefix {
        ""
    } else if let Some(rest) = path
        .strip_prefix(prefix.as_str())
        .and_then(|p| p.strip_prefix('/'))
    {
        rest
    } else {
        return Route::NotPortalRequest;
    };

    if rest == EVENT_EXCHANGE {
        return Route::EventExchange;
    }
    if let Some(resource) = rest.strip_prefix(PORTAL_RESOURCE).and_then(|r| r.strip_prefix('/')) {
        return Route::PortalResource(decode(resource));
    }
    if let Some(resource) = rest.strip_prefix(THEME_RESOURCE).and_then(|r| r.strip_prefix('/')) {
        return Route::ThemeResource(decode(resource));
    }
    if let Some(resource) = rest.strip_prefix(PORTLET_RESOURCE).and_then(|r| r.strip_prefix('/')) {
        if let Some((handle, path)) = resource.split_once('/') {
            return Route::PortletResource {
                handle: PortletHandle::new(decode(handle)),
                path: decode(path),
            };
        }
    }

    let mut segments: Vec<String> = rest.split('/').map(decode).collect();
    if segments.first().map_or(true, String::is_empty) {
        return Route::Page;
    }
    if segments[0] == PORTAL_SEGMENT {
        return match segments.get(1) {
            Some(action) if !action.is_empty() => Route::PortalAction(PortalAction::parse(action)),
            _ => Route::Page,
        };
    }

    let handle = PortletHandle::new(segments.remove(0));
    let mut change = None;
    if segments.len() >= 2 && segments[0] != EVENT_SEGMENT {
        change = Some(StateChange {
            mode: parse_or_unchanged(&segments[0]),
            window_state: parse_or_unchanged(&segments[1]),
        });
        segments.drain(..2);
    }
    if segments.len() >= 3 && segments[0] == EVENT_SEGMENT {
        let mut taken = segments.drain(..3).skip(1);
        let event = EventTarget {
            event_type: taken.next().unwrap_or_default(),
            channel: taken.next().unwrap_or_default(),
        };
        drop(taken);
        return Route::PortletEvent {
            handle,
            change,
            event,
            rest: segments,
        };
    }
    Route::PortletStateChange {
        handle,
        change,
        rest: segments,
    }
}

/// Validates an externally requested event against the accepted-event table
/// and builds it with the declaring portlet's constructor.
pub fn create_event(
    accepted: &AcceptedEvents,
    event_type: &str,
    channel: &str,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    locales: Vec<String>,
) -> Result<PortletEvent, EventError> {
    let decl = accepted.check(event_type, channel)?;
    let payload = decl.instantiate(args, kwargs)?;
    Ok(PortletEvent {
        event_type: event_type.to_string(),
        channel: channel.to_string(),
        payload,
        locales,
    })
}

#[cfg(test)]
#[path = "tests/routing_tests.rs"]
mod tests;
