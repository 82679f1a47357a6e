use portal::Portal;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) portal: Portal,
    /// `Path` attribute of the session cookie.
    pub(crate) cookie_path: String,
}

impl AppState {
    pub(crate) fn new(portal: Portal) -> Self {
        let prefix = portal.urls().prefix();
        let cookie_path = if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        };
        Self {
            portal,
            cookie_path,
        }
    }
}
