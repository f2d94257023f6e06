//! Capability handlers
//!
//! Plain synchronous functions over a `HandlerContext`. Parameters arrive
//! already validated and normalised by the registry, so the accessors here
//! only fail if a handler is wired to the wrong parameter table.

pub mod desktop;
pub mod document;
pub mod plugins;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::action_plan::Params;
use crate::composer::Composer;
use crate::desktop::{Desktop, DesktopError};
use crate::outcome::ErrorKind;

/// Collaborators handed to every handler
#[derive(Clone)]
pub struct HandlerContext {
    pub desktop: Arc<dyn Desktop>,
    pub composer: Arc<dyn Composer>,
    /// Where screenshots and relative file paths land
    pub desktop_path: PathBuf,
}

impl HandlerContext {
    pub fn new(desktop: Arc<dyn Desktop>, composer: Arc<dyn Composer>, desktop_path: impl Into<PathBuf>) -> Self {
        Self {
            desktop,
            composer,
            desktop_path: desktop_path.into(),
        }
    }

    /// Relative paths are taken relative to the desktop folder
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.desktop_path.join(candidate)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Desktop(#[from] DesktopError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Unknown(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::InvalidParameter(_) => ErrorKind::InvalidParameters,
            HandlerError::Unknown(_) => ErrorKind::UnknownAction,
            HandlerError::Desktop(_) | HandlerError::Io(_) | HandlerError::Failed(_) => ErrorKind::HandlerFailure,
        }
    }
}

pub(crate) fn str_param<'a>(params: &'a Params, name: &str) -> Result<&'a str, HandlerError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerError::InvalidParameter(format!("'{}' must be a string", name)))
}

pub(crate) fn opt_str_param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).and_then(|v| v.as_str())
}

pub(crate) fn int_param(params: &Params, name: &str) -> Result<i64, HandlerError> {
    params
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerError::InvalidParameter(format!("'{}' must be an integer", name)))
}

pub(crate) fn bool_param(params: &Params, name: &str) -> bool {
    params.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::composer::TemplateComposer;
    use crate::desktop::{RecordingDesktop, ScreenSize};

    pub fn context(dir: &Path) -> (Arc<RecordingDesktop>, HandlerContext) {
        let desktop = Arc::new(RecordingDesktop::new(ScreenSize::default()));
        let ctx = HandlerContext::new(desktop.clone(), Arc::new(TemplateComposer), dir);
        (desktop, ctx)
    }

    pub fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(HandlerError::Unknown("x".into()).kind(), ErrorKind::UnknownAction);
        assert_eq!(HandlerError::InvalidParameter("x".into()).kind(), ErrorKind::InvalidParameters);
        assert_eq!(HandlerError::Failed("x".into()).kind(), ErrorKind::HandlerFailure);
    }

    #[test]
    fn test_resolve_path() {
        let dir = tempfile::tempdir().unwrap();
        let (_, ctx) = testing::context(dir.path());
        assert_eq!(ctx.resolve_path("notes.txt"), dir.path().join("notes.txt"));
        let absolute = dir.path().join("abs.txt");
        assert_eq!(ctx.resolve_path(absolute.to_str().unwrap()), absolute);
    }
}
