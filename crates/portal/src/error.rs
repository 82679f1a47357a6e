use shared::{
    domain::{PortletHandle, RenderMode},
    error::{ApiError, ErrorCode},
    protocol::ProtocolError,
};
use thiserror::Error;

/// Why an externally triggered event was not delivered.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event type `{0}` is not accepted by any portlet")]
    UnknownType(String),
    #[error("event type `{event_type}` is not accepted on channel `{channel}`")]
    ChannelNotAccepted { event_type: String, channel: String },
    #[error("cannot construct `{event_type}`: {reason}")]
    BadArguments { event_type: String, reason: String },
    #[error("event target `{0}` is reserved")]
    ReservedTarget(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Returned by portlet implementations.
#[derive(Debug, Error)]
pub enum PortletError {
    #[error("render mode `{0}` is not supported")]
    UnsupportedMode(RenderMode),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a portlet with handle `{0}` is already registered")]
    DuplicateHandle(PortletHandle),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("writing page markup failed")]
    Fmt(#[from] std::fmt::Error),
    #[error("{0}")]
    Message(String),
}

/// Failure of a coordinated page render.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("template failed: {0}")]
    Template(#[from] TemplateError),
    #[error("render worker failed: {0}")]
    Worker(String),
}

impl From<&PortalError> for ApiError {
    fn from(value: &PortalError) -> Self {
        ApiError::new(ErrorCode::Internal, value.to_string())
    }
}
