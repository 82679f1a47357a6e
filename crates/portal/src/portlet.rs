use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use shared::domain::{MarkupType, PortletHandle, RenderMode, WindowState};

use crate::{
    error::{EventError, PortletError},
    exchange::PortalLink,
    facade::SessionFacade,
    urls::UrlGenerator,
};

pub const HTML: &str = "text/html";

/// A content-producing component aggregated into the portal page.
///
/// Handles must be unique among registered portlets. Events declared in the
/// [`Description`] are the only ones the portal will ever route to the
/// portlet from a URL or a client message.
#[async_trait]
pub trait Portlet: Send + Sync {
    fn description(&self, locales: &[String]) -> Description;

    /// Channel events for this portlet are addressed to. Defaults to the handle.
    fn channel(&self) -> String {
        self.description(&[]).handle.0
    }

    /// Position in the page; lower weights render first.
    fn weight(&self) -> i32 {
        0
    }

    async fn render(&self, request: RenderRequest) -> Result<String, PortletError>;

    async fn resource(&self, _path: &str, _theme: &str, _locales: &[String]) -> Option<Resource> {
        None
    }

    async fn handle_event(
        &self,
        _event: PortletEvent,
        _portal: SessionFacade,
    ) -> Result<(), PortletError> {
        Ok(())
    }

    async fn on_added(&self, _portal: PortalLink) {}

    async fn on_removed(&self) {}
}

/// Which channels an event type is accepted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    Any,
    Only(String),
}

impl From<&str> for ChannelFilter {
    fn from(value: &str) -> Self {
        if value == "*" {
            Self::Any
        } else {
            Self::Only(value.to_string())
        }
    }
}

impl From<String> for ChannelFilter {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

type Constructor = Arc<dyn Fn(Map<String, Value>) -> Result<Value, String> + Send + Sync>;

/// An event type a portlet accepts from outside, together with the only
/// constructor that may build it.
#[derive(Clone)]
pub struct EventDecl {
    pub event_type: String,
    pub channel: ChannelFilter,
    positional: Vec<String>,
    construct: Constructor,
}

impl fmt::Debug for EventDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDecl")
            .field("event_type", &self.event_type)
            .field("channel", &self.channel)
            .field("positional", &self.positional)
            .finish_non_exhaustive()
    }
}

impl EventDecl {
    /// Arguments must deserialize into `T`; the validated value becomes the payload.
    pub fn typed<T>(event_type: impl Into<String>, channel: impl Into<ChannelFilter>) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Self {
            event_type: event_type.into(),
            channel: channel.into(),
            positional: Vec::new(),
            construct: Arc::new(|fields| {
                let value: T =
                    serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())?;
                serde_json::to_value(value).map_err(|e| e.to_string())
            }),
        }
    }

    /// Any keyword arguments are accepted as they are.
    pub fn untyped(event_type: impl Into<String>, channel: impl Into<ChannelFilter>) -> Self {
        Self {
            event_type: event_type.into(),
            channel: channel.into(),
            positional: Vec::new(),
            construct: Arc::new(|fields| Ok(Value::Object(fields))),
        }
    }

    /// Names positional arguments so they can be merged with keyword arguments.
    pub fn positional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn instantiate(
        &self,
        args: Vec<Value>,
        mut kwargs: Map<String, Value>,
    ) -> Result<Value, EventError> {
        if args.len() > self.positional.len() {
            return Err(self.bad_arguments(format!(
                "takes {} positional arguments but {} were given",
                self.positional.len(),
                args.len()
            )));
        }
        for (name, arg) in self.positional.iter().zip(args) {
            if kwargs.contains_key(name) {
                return Err(self.bad_arguments(format!("got multiple values for `{name}`")));
            }
            kwargs.insert(name.clone(), arg);
        }
        (self.construct)(kwargs).map_err(|reason| self.bad_arguments(reason))
    }

    fn bad_arguments(&self, reason: String) -> EventError {
        EventError::BadArguments {
            event_type: self.event_type.clone(),
            reason,
        }
    }
}

/// Capability descriptor of a portlet.
#[derive(Debug, Clone)]
pub struct Description {
    pub handle: PortletHandle,
    pub short_title: String,
    pub title: String,
    pub markup_types: BTreeMap<String, MarkupType>,
    pub events: Vec<EventDecl>,
    pub locale: String,
}

impl Description {
    pub fn new(handle: PortletHandle, short_title: impl Into<String>) -> Self {
        let short_title = short_title.into();
        Self {
            handle,
            title: short_title.clone(),
            short_title,
            markup_types: BTreeMap::from([(HTML.to_string(), MarkupType::default())]),
            events: Vec::new(),
            locale: "en-US".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_markup(mut self, mime_type: impl Into<String>, markup: MarkupType) -> Self {
        self.markup_types.insert(mime_type.into(), markup);
        self
    }

    pub fn accepting(mut self, event: EventDecl) -> Self {
        self.events.push(event);
        self
    }

    pub fn supports_mode(&self, mime_type: &str, mode: RenderMode) -> bool {
        self.markup_types
            .get(mime_type)
            .is_some_and(|markup| markup.supports_mode(mode))
    }

    pub fn supports_window_state(&self, mime_type: &str, state: WindowState) -> bool {
        self.markup_types
            .get(mime_type)
            .is_some_and(|markup| markup.supports_window_state(state))
    }
}

/// "Produce markup for this portlet" as issued by the page template.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub mime_type: String,
    pub mode: RenderMode,
    pub window_state: WindowState,
    pub locales: Vec<String>,
    pub urls: UrlGenerator,
    pub params: Map<String, Value>,
}

/// A validated application event addressed to a portlet channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PortletEvent {
    pub event_type: String,
    pub channel: String,
    pub payload: Value,
    pub locales: Vec<String>,
}

impl PortletEvent {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PortletError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| PortletError::Failed(format!("bad `{}` payload: {e}", self.event_type)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Resource {
    pub fn new(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
#[path = "tests/portlet_tests.rs"]
mod tests;
