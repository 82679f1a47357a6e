use std::fmt::Write as _;

use shared::domain::{RenderMode, WindowState};

use crate::{error::TemplateError, tabs::TabContent};

use super::scope::{PageContext, RenderOptions, RenderScope};

/// Produces the page markup. Runs on a blocking worker thread.
pub trait Template: Send + Sync + 'static {
    fn render(&self, scope: &mut RenderScope) -> Result<String, TemplateError>;
}

impl<F> Template for F
where
    F: Fn(&mut RenderScope) -> Result<String, TemplateError> + Send + Sync + 'static,
{
    fn render(&self, scope: &mut RenderScope) -> Result<String, TemplateError> {
        self(scope)
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The built-in page: tab bar, language selector, and either the
/// dashboard of all portlets or a single portlet in a solo tab.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPage;

impl Template for DefaultPage {
    fn render(&self, scope: &mut RenderScope) -> Result<String, TemplateError> {
        let page = scope.page().clone();
        let mut out = String::new();
        let lang = page.translation.content_language().unwrap_or_default();

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html lang=\"{}\">", escape_html(&lang))?;
        writeln!(out, "<head>")?;
        writeln!(out, "<meta charset=\"utf-8\">")?;
        writeln!(out, "<title>{}</title>", escape_html(&page.title))?;
        writeln!(
            out,
            "<link rel=\"stylesheet\" href=\"{}\">",
            escape_html(&page.urls.theme_resource_url("portal.css"))
        )?;
        writeln!(
            out,
            "<script src=\"{}\"></script>",
            escape_html(&page.urls.portal_resource_url("functions.js"))
        )?;
        writeln!(out, "</head>")?;
        writeln!(
            out,
            "<body data-event-exchange=\"{}\">",
            escape_html(&page.urls.event_exchange_path())
        )?;
        writeln!(out, "<div id=\"portal-messages\"></div>")?;
        write_header(&mut out, &page)?;
        write_tabs(&mut out, &page)?;

        writeln!(out, "<main>")?;
        match page.selected_tab().map(|tab| tab.info.content.clone()) {
            Some(TabContent::Solo(handle)) => {
                let mode = if page.configuring.as_ref() == Some(&handle) {
                    RenderMode::Edit
                } else {
                    RenderMode::View
                };
                let markup = scope.render(
                    &handle,
                    RenderOptions::default()
                        .mode(mode)
                        .window_state(WindowState::Solo),
                );
                writeln!(
                    out,
                    "<section class=\"portlet solo\" id=\"portlet-{}\">{markup}</section>",
                    escape_html(handle.as_str())
                )?;
            }
            _ => {
                if page.configuring.is_some() {
                    writeln!(
                        out,
                        "<p class=\"finish-editing\"><a href=\"{}\">{}</a></p>",
                        escape_html(&page.urls.action_url("finish-editing", &[])),
                        escape_html(page.t("Finish editing"))
                    )?;
                }
                for portlet in &page.portlets {
                    let editing = page.configuring.as_ref() == Some(&portlet.handle);
                    let mode = if editing {
                        RenderMode::Edit
                    } else {
                        RenderMode::View
                    };
                    let id = escape_html(portlet.handle.as_str());
                    writeln!(out, "<section class=\"portlet\" id=\"portlet-{id}\">")?;
                    write!(out, "<h2>{}", escape_html(&portlet.short_title))?;
                    if portlet.editable && !editing {
                        write!(
                            out,
                            " <a class=\"portlet-edit\" href=\"{}\">{}</a>",
                            escape_html(&page.urls.portlet_state_url(
                                &portlet.handle,
                                Some(RenderMode::Edit),
                                None
                            )),
                            escape_html(page.t("Edit"))
                        )?;
                    }
                    if portlet.soloable {
                        write!(
                            out,
                            " <a class=\"portlet-solo\" href=\"{}\">{}</a>",
                            escape_html(&page.urls.portlet_state_url(
                                &portlet.handle,
                                None,
                                Some(WindowState::Solo)
                            )),
                            escape_html(page.t("Open in tab"))
                        )?;
                    }
                    writeln!(out, "</h2>")?;
                    let slot = scope.embed(&portlet.handle, RenderOptions::default().mode(mode));
                    writeln!(out, "<div class=\"portlet-content\">{slot}</div>")?;
                    writeln!(out, "</section>")?;
                }
            }
        }
        writeln!(out, "</main>")?;
        writeln!(out, "</body>")?;
        writeln!(out, "</html>")?;
        Ok(out)
    }
}

fn write_header(out: &mut String, page: &PageContext) -> Result<(), TemplateError> {
    writeln!(out, "<header>")?;
    writeln!(out, "<h1>{}</h1>", escape_html(&page.title))?;
    if page.supported_locales.len() > 1 {
        let current = page.translation.language().unwrap_or_default();
        writeln!(
            out,
            "<form class=\"language\" method=\"post\" action=\"{}\">",
            escape_html(&page.urls.action_url("language", &[]))
        )?;
        writeln!(out, "<select name=\"language\">")?;
        for (locale, name) in &page.supported_locales {
            let selected = if locale == current { " selected" } else { "" };
            writeln!(
                out,
                "<option value=\"{}\"{selected}>{}</option>",
                escape_html(locale),
                escape_html(name)
            )?;
        }
        writeln!(out, "</select>")?;
        writeln!(
            out,
            "<button type=\"submit\">{}</button>",
            escape_html(page.t("Apply"))
        )?;
        writeln!(out, "</form>")?;
    }
    writeln!(out, "</header>")?;
    Ok(())
}

fn write_tabs(out: &mut String, page: &PageContext) -> Result<(), TemplateError> {
    writeln!(out, "<nav class=\"tabs\">")?;
    for tab in &page.tabs {
        let id = tab.info.id.to_string();
        let class = if tab.info.selected { "tab selected" } else { "tab" };
        write!(
            out,
            "<span class=\"{class}\"><a href=\"{}\">{}</a>",
            escape_html(&page.urls.action_url("select", &[("tab", &id)])),
            escape_html(&tab.label)
        )?;
        if tab.info.closeable {
            write!(
                out,
                " <a class=\"tab-close\" href=\"{}\" title=\"{}\">&#215;</a>",
                escape_html(&page.urls.action_url("close", &[("tab", &id)])),
                escape_html(page.t("Close"))
            )?;
        }
        writeln!(out, "</span>")?;
    }
    writeln!(out, "</nav>")?;
    Ok(())
}
