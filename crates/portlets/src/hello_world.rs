use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use portal::{
    render::page::escape_html, Description, EventDecl, Portlet, PortletError, PortletEvent,
    RenderRequest, SessionFacade, HTML,
};
use shared::domain::{MarkupType, PortletHandle, RenderMode, WindowState};
use tracing::debug;

pub const HANDLE: &str = "hello";
pub const TOGGLE_WORLD: &str = "hello.ToggleWorld";

/// Greets the world, or just says hello once the world is toggled off.
pub struct HelloWorldPortlet {
    show_world: AtomicBool,
}

impl Default for HelloWorldPortlet {
    fn default() -> Self {
        Self::new()
    }
}

impl HelloWorldPortlet {
    pub fn new() -> Self {
        Self {
            show_world: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Portlet for HelloWorldPortlet {
    fn description(&self, locales: &[String]) -> Description {
        let t = crate::translation(locales);
        Description::new(PortletHandle::new(HANDLE), t.get("Hello World Portlet"))
            .with_markup(
                HTML,
                MarkupType::new(
                    vec![RenderMode::View, RenderMode::Edit],
                    vec![WindowState::Normal],
                ),
            )
            .accepting(EventDecl::untyped(TOGGLE_WORLD, HANDLE))
    }

    async fn render(&self, request: RenderRequest) -> Result<String, PortletError> {
        let t = crate::translation(&request.locales);
        match request.mode {
            RenderMode::View => {}
            RenderMode::Edit => {
                let action = request
                    .urls
                    .event_url(TOGGLE_WORLD, None, Some(RenderMode::View), None, &[]);
                let checked = if self.show_world.load(Ordering::SeqCst) {
                    " checked"
                } else {
                    ""
                };
                return Ok(format!(
                    "<form action=\"{}\" method=\"post\">\
                     <label><input type=\"checkbox\" disabled{checked}> {}</label> \
                     <input type=\"submit\" value=\"{}\"></form>",
                    escape_html(&action),
                    escape_html(t.get("Show world")),
                    escape_html(t.get("Toggle world"))
                ));
            }
            other => return Err(PortletError::UnsupportedMode(other)),
        }
        let greeting = if self.show_world.load(Ordering::SeqCst) {
            t.get("Hello World")
        } else {
            t.get("Hello")
        };
        Ok(format!(
            "<p class=\"hello\">{}!</p><p><a href=\"{}\">{}</a></p>",
            escape_html(greeting),
            escape_html(&request.urls.event_url(TOGGLE_WORLD, None, None, None, &[])),
            escape_html(t.get("Toggle world"))
        ))
    }

    async fn handle_event(&self, event: PortletEvent, _portal: SessionFacade) -> Result<(), PortletError> {
        if event.event_type == TOGGLE_WORLD {
            let was = self.show_world.fetch_xor(true, Ordering::SeqCst);
            debug!(show_world = !was, "world toggled");
        }
        Ok(())
    }
}
