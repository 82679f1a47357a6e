//! Sample portlets bundled with the portal server.

mod display;
mod hello_world;
mod server_time;

use std::{path::PathBuf, sync::Arc, sync::OnceLock};

use portal::{L10n, Portal, RegistryError, Translation};

pub use crate::{display::DisplayPortlet, hello_world::HelloWorldPortlet, server_time::ServerTimePortlet};

fn translation(locales: &[String]) -> Arc<Translation> {
    static BUNDLES: OnceLock<L10n> = OnceLock::new();
    BUNDLES
        .get_or_init(|| L10n::load(&[PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources")]))
        .translation(locales)
}

/// Registers every sample portlet with `portal`.
pub async fn register_all(portal: &Portal) -> Result<(), RegistryError> {
    portal.register(Arc::new(HelloWorldPortlet::new())).await?;
    portal.register(Arc::new(DisplayPortlet::new())).await?;
    portal.register(Arc::new(ServerTimePortlet::new())).await?;
    Ok(())
}
