//! URL shapes produced by the portal:
//!
//! ```text
//! {prefix}/{"portal"|handle}[/{mode|_}/{window_state|_}][/event/{event_type}/{channel}][?query]
//! {prefix}/portlet-resource/{handle}/{path}
//! {prefix}/theme-resource/{path}
//! {prefix}/portal-resource/{path}
//! ```

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use shared::domain::{PortletHandle, RenderMode, WindowState};
use url::form_urlencoded;

pub const PORTAL_SEGMENT: &str = "portal";
pub const EVENT_SEGMENT: &str = "event";
pub const UNCHANGED: &str = "_";
pub const PORTLET_RESOURCE: &str = "portlet-resource";
pub const THEME_RESOURCE: &str = "theme-resource";
pub const PORTAL_RESOURCE: &str = "portal-resource";
pub const EVENT_EXCHANGE: &str = "eventExchange";

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `"/"` mounts at the root, which is represented as an empty prefix.
pub fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn with_query(mut url: String, params: &[(&str, &str)]) -> String {
    if !params.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        url.push('?');
        url.push_str(&query);
    }
    url
}

fn state_segments(mode: Option<RenderMode>, window_state: Option<WindowState>) -> String {
    format!(
        "/{}/{}",
        mode.map_or(UNCHANGED, |m| m.as_str()),
        window_state.map_or(UNCHANGED, |w| w.as_str())
    )
}

/// Portal-level URLs used by the page template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    prefix: String,
}

impl PortalUrls {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn page_url(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub fn action_url(&self, action: &str, params: &[(&str, &str)]) -> String {
        with_query(
            format!(
                "{}/{PORTAL_SEGMENT}/{}",
                self.prefix,
                encode_segment(action)
            ),
            params,
        )
    }

    pub fn portlet_state_url(
        &self,
        handle: &PortletHandle,
        mode: Option<RenderMode>,
        window_state: Option<WindowState>,
    ) -> String {
        format!(
            "{}/{}{}",
            self.prefix,
            encode_segment(handle.as_str()),
            state_segments(mode, window_state)
        )
    }

    pub fn portal_resource_url(&self, path: &str) -> String {
        format!("{}/{PORTAL_RESOURCE}/{}", self.prefix, encode_path(path))
    }

    pub fn theme_resource_url(&self, path: &str) -> String {
        format!("{}/{THEME_RESOURCE}/{}", self.prefix, encode_path(path))
    }

    pub fn event_exchange_path(&self) -> String {
        format!("{}/{EVENT_EXCHANGE}", self.prefix)
    }
}

/// URLs a portlet embeds in its own markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlGenerator {
    prefix: String,
    handle: PortletHandle,
    channel: String,
}

impl UrlGenerator {
    pub fn new(prefix: &str, handle: PortletHandle, channel: impl Into<String>) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            handle,
            channel: channel.into(),
        }
    }

    pub fn handle(&self) -> &PortletHandle {
        &self.handle
    }

    /// URL that fires `event_type` at `channel` (the portlet's own channel
    /// when `None`), optionally changing mode and window state first.
    pub fn event_url(
        &self,
        event_type: &str,
        channel: Option<&str>,
        mode: Option<RenderMode>,
        window_state: Option<WindowState>,
        params: &[(&str, &str)],
    ) -> String {
        let mut url = format!("{}/{}", self.prefix, encode_segment(self.handle.as_str()));
        if mode.is_some() || window_state.is_some() {
            url.push_str(&state_segments(mode, window_state));
        }
        url.push_str(&format!(
            "/{EVENT_SEGMENT}/{}/{}",
            encode_segment(event_type),
            encode_segment(channel.unwrap_or(&self.channel))
        ));
        with_query(url, params)
    }

    pub fn state_url(&self, mode: Option<RenderMode>, window_state: Option<WindowState>) -> String {
        format!(
            "{}/{}{}",
            self.prefix,
            encode_segment(self.handle.as_str()),
            state_segments(mode, window_state)
        )
    }

    pub fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/{PORTLET_RESOURCE}/{}/{}",
            self.prefix,
            encode_segment(self.handle.as_str()),
            encode_path(resource)
        )
    }
}

#[cfg(test)]
#[path = "tests/urls_tests.rs"]
mod tests;
