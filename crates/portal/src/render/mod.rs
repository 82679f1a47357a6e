//! Render coordination.
//!
//! The page template is synchronous and runs on a blocking worker. Each
//! portlet render it asks for is sent back to the async side, which runs
//! all of them concurrently and hands the markup back through a oneshot.
//! The page is complete only once the template has returned and every
//! render it started has answered.

pub mod page;
pub mod scope;

use std::sync::Arc;

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use shared::domain::PortletHandle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    error::PortalError,
    portlet::{RenderRequest, HTML},
    Portal,
};

use self::{
    page::escape_html,
    scope::{PageContext, RenderCall, RenderOptions, RenderScope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Received,
    ActionsApplied,
    EventDispatched,
    EventCompleted,
    Rendering { outstanding: usize },
    Complete,
    Failed,
}

/// Phase history of one portal request.
#[derive(Debug, Clone, Default)]
pub struct RequestCycle {
    phases: Vec<RenderPhase>,
}

impl RequestCycle {
    pub fn new() -> Self {
        Self {
            phases: vec![RenderPhase::Received],
        }
    }

    pub fn advance(&mut self, phase: RenderPhase) {
        debug!(?phase, "request phase");
        self.phases.push(phase);
    }

    pub fn phase(&self) -> RenderPhase {
        self.phases.last().copied().unwrap_or(RenderPhase::Received)
    }

    pub fn history(&self) -> &[RenderPhase] {
        &self.phases
    }
}

/// Markup shown in place of a portlet that could not be rendered.
pub fn error_fragment(handle: &PortletHandle, reason: &str) -> String {
    format!(
        "<div class=\"portlet-error\" data-portlet=\"{}\">{}</div>",
        escape_html(handle.as_str()),
        escape_html(reason)
    )
}

async fn render_portlet(
    portal: &Portal,
    context: &PageContext,
    handle: &PortletHandle,
    options: RenderOptions,
) -> String {
    let Some(entry) = portal.registry().find_by_handle(handle) else {
        warn!(%handle, "template asked for an unknown portlet");
        return error_fragment(handle, "unknown portlet");
    };
    let request = RenderRequest {
        mime_type: HTML.to_string(),
        mode: options.mode,
        window_state: options.window_state,
        locales: context.locales.clone(),
        urls: portal.url_generator(&entry),
        params: options.params,
    };
    let timeout = portal.settings().render_timeout;
    match tokio::time::timeout(timeout, entry.portlet.render(request)).await {
        Ok(Ok(markup)) => markup,
        Ok(Err(error)) => {
            warn!(%handle, %error, "portlet render failed");
            error_fragment(handle, &error.to_string())
        }
        Err(_) => {
            warn!(%handle, ?timeout, "portlet render timed out");
            error_fragment(handle, "portlet did not respond in time")
        }
    }
}

fn dispatch(portal: &Portal, context: &Arc<PageContext>, call: RenderCall) -> BoxFuture<'static, ()> {
    let portal = portal.clone();
    let context = Arc::clone(context);
    async move {
        let markup = render_portlet(&portal, &context, &call.handle, call.options).await;
        if call.reply.send(markup).is_err() {
            debug!(handle = %call.handle, "render result no longer wanted");
        }
    }
    .boxed()
}

/// Runs the page template and every portlet render it issues.
pub async fn render_page(
    portal: &Portal,
    context: PageContext,
    cycle: &mut RequestCycle,
) -> Result<String, PortalError> {
    let context = Arc::new(context);
    let (calls_tx, mut calls_rx) = mpsc::unbounded_channel::<RenderCall>();
    let template = portal.template();
    let scope = RenderScope::new(Arc::clone(&context), calls_tx);
    let mut worker = tokio::task::spawn_blocking(move || {
        let mut scope = scope;
        let markup = template.render(&mut scope);
        (markup, scope.into_slots())
    });

    let mut in_flight = FuturesUnordered::new();
    cycle.advance(RenderPhase::Rendering { outstanding: 0 });
    let joined = loop {
        tokio::select! {
            Some(call) = calls_rx.recv() => {
                in_flight.push(dispatch(portal, &context, call));
                cycle.advance(RenderPhase::Rendering { outstanding: in_flight.len() });
            }
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {
                cycle.advance(RenderPhase::Rendering { outstanding: in_flight.len() });
            }
            joined = &mut worker => break joined,
        }
    };

    let (markup, slots) = match joined {
        Ok((Ok(markup), slots)) => (markup, slots),
        Ok((Err(error), _)) => {
            cycle.advance(RenderPhase::Failed);
            return Err(error.into());
        }
        Err(error) => {
            cycle.advance(RenderPhase::Failed);
            return Err(PortalError::Worker(error.to_string()));
        }
    };

    // The scope is gone, so the channel drains and then closes.
    while let Some(call) = calls_rx.recv().await {
        in_flight.push(dispatch(portal, &context, call));
        cycle.advance(RenderPhase::Rendering { outstanding: in_flight.len() });
    }
    while in_flight.next().await.is_some() {
        cycle.advance(RenderPhase::Rendering { outstanding: in_flight.len() });
    }

    let mut page = markup;
    for slot in slots {
        let content = slot
            .markup
            .await
            .unwrap_or_else(|_| error_fragment(&slot.handle, "render was cancelled"));
        page = page.replacen(&slot.placeholder, &content, 1);
    }
    cycle.advance(RenderPhase::Complete);
    Ok(page)
}

#[cfg(test)]
#[path = "../tests/render_tests.rs"]
mod tests;
