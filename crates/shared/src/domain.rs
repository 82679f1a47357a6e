use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_newtype!(PortletHandle);
string_newtype!(SessionId);
id_newtype!(TabId);
id_newtype!(ConnectionId);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct ParseVariantError {
    pub kind: &'static str,
    pub value: String,
}

/// Content variant a portlet is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    View,
    Edit,
    Help,
    Preview,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Help => "help",
            Self::Preview => "preview",
        }
    }
}

impl FromStr for RenderMode {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "help" => Ok(Self::Help),
            "preview" => Ok(Self::Preview),
            other => Err(ParseVariantError {
                kind: "render mode",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout hint given to a portlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Solo,
}

impl WindowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Minimized => "minimized",
            Self::Maximized => "maximized",
            Self::Solo => "solo",
        }
    }
}

impl FromStr for WindowState {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "minimized" => Ok(Self::Minimized),
            "maximized" => Ok(Self::Maximized),
            "solo" => Ok(Self::Solo),
            other => Err(ParseVariantError {
                kind: "window state",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render modes and window states a portlet supports for one mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupType {
    pub render_modes: Vec<RenderMode>,
    pub window_states: Vec<WindowState>,
}

impl Default for MarkupType {
    fn default() -> Self {
        Self {
            render_modes: vec![RenderMode::View],
            window_states: vec![WindowState::Normal],
        }
    }
}

impl MarkupType {
    pub fn new(render_modes: Vec<RenderMode>, window_states: Vec<WindowState>) -> Self {
        Self {
            render_modes,
            window_states,
        }
    }

    pub fn supports_mode(&self, mode: RenderMode) -> bool {
        self.render_modes.contains(&mode)
    }

    pub fn supports_window_state(&self, state: WindowState) -> bool {
        self.window_states.contains(&state)
    }
}
