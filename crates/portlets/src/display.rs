use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use portal::{
    render::page::escape_html, Description, EventDecl, Portlet, PortletError, PortletEvent,
    RenderRequest, SessionFacade, HTML,
};
use serde::{Deserialize, Serialize};
use shared::domain::{MarkupType, PortletHandle, RenderMode, WindowState};
use tracing::info;

pub const HANDLE: &str = "display";
pub const SET_TEXT: &str = "display.SetText";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetText {
    pub short_text: String,
    #[serde(default)]
    pub long_text: Option<String>,
}

#[derive(Debug, Default)]
struct Texts {
    short_text: String,
    long_text: Option<String>,
}

/// Shows a short text on the dashboard and a long one in its own tab.
/// Both are set from the portlet's edit form.
#[derive(Default)]
pub struct DisplayPortlet {
    texts: Mutex<Texts>,
}

impl DisplayPortlet {
    pub fn new() -> Self {
        Self::default()
    }

    fn texts(&self) -> std::sync::MutexGuard<'_, Texts> {
        self.texts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edit_form(&self, request: &RenderRequest) -> String {
        let t = crate::translation(&request.locales);
        let texts = self.texts();
        let long_text = texts.long_text.as_deref().unwrap_or(&texts.short_text);
        let action = request
            .urls
            .event_url(SET_TEXT, None, None, Some(WindowState::Normal), &[]);
        format!(
            "<form action=\"{}\" method=\"post\">\
             {}<br/><textarea name=\"short_text\" cols=\"30\" rows=\"3\">{}</textarea><br/>\
             {}<br/><textarea name=\"long_text\" cols=\"80\" rows=\"20\">{}</textarea><br/>\
             <input type=\"submit\" value=\"{}\">\
             </form>",
            escape_html(&action),
            escape_html(t.get("Short text")),
            escape_html(&texts.short_text),
            escape_html(t.get("Long text")),
            escape_html(long_text),
            escape_html(t.get("Save")),
        )
    }
}

#[async_trait]
impl Portlet for DisplayPortlet {
    fn description(&self, locales: &[String]) -> Description {
        let t = crate::translation(locales);
        Description::new(PortletHandle::new(HANDLE), t.get("Display Portlet"))
            .with_markup(
                HTML,
                MarkupType::new(
                    vec![RenderMode::View, RenderMode::Edit],
                    vec![WindowState::Normal, WindowState::Solo],
                ),
            )
            .accepting(
                EventDecl::typed::<SetText>(SET_TEXT, HANDLE).positional(["short_text", "long_text"]),
            )
    }

    fn weight(&self) -> i32 {
        10
    }

    async fn render(&self, request: RenderRequest) -> Result<String, PortletError> {
        match request.mode {
            RenderMode::Edit => return Ok(self.edit_form(&request)),
            RenderMode::View => {}
            other => return Err(PortletError::UnsupportedMode(other)),
        }
        let texts = self.texts();
        let text = match (&texts.long_text, request.window_state) {
            (Some(long_text), WindowState::Solo) => long_text,
            _ => &texts.short_text,
        };
        Ok(format!("<div>{}</div>", escape_html(text)))
    }

    async fn handle_event(&self, event: PortletEvent, _portal: SessionFacade) -> Result<(), PortletError> {
        let SetText {
            short_text,
            long_text,
        } = event.decode()?;
        info!(chars = short_text.len(), "display text updated");
        let mut texts = self.texts();
        texts.short_text = short_text;
        texts.long_text = long_text;
        Ok(())
    }
}
