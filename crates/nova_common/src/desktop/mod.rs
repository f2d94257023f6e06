//! Desktop collaborator
//!
//! Everything the handlers need from the host: launching applications,
//! keyboard and mouse input, screen capture and opening URLs. Handlers only
//! see the trait, so the same capability table runs against the real
//! desktop, a headless backend, or a recording double in tests.

pub mod headless;
pub mod recording;
pub mod system;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use headless::HeadlessDesktop;
pub use recording::{DesktopEvent, RecordingDesktop};
pub use system::SystemDesktop;

/// Primary screen dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl ScreenSize {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            _ => None,
        }
    }
}

/// Desktop backend errors
#[derive(Debug, thiserror::Error)]
pub enum DesktopError {
    #[error("not supported on this desktop: {0}")]
    Unsupported(String),

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Image(String),

    #[error("injected failure: {0}")]
    Injected(String),
}

/// Host desktop operations used by the handlers
pub trait Desktop: Send + Sync {
    fn name(&self) -> &'static str;

    fn screen_size(&self) -> ScreenSize;

    fn open_application(&self, name: &str) -> Result<(), DesktopError>;

    fn type_text(&self, text: &str) -> Result<(), DesktopError>;

    /// Move to (x, y) and click `clicks` times
    fn click(&self, x: i64, y: i64, button: MouseButton, clicks: u8) -> Result<(), DesktopError>;

    /// Press the left button at the cursor and release at (x, y)
    fn drag_to(&self, x: i64, y: i64) -> Result<(), DesktopError>;

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DesktopError>;

    fn press_key(&self, key: &str) -> Result<(), DesktopError>;

    fn press_combination(&self, keys: &[String]) -> Result<(), DesktopError>;

    /// Write a PNG screenshot of the primary screen to `path`
    fn capture_screen(&self, path: &Path) -> Result<(), DesktopError>;

    fn open_url(&self, url: &str) -> Result<(), DesktopError>;
}

/// Write a blank PNG of the given size
pub(crate) fn write_blank_png(path: &Path, size: ScreenSize) -> Result<(), DesktopError> {
    let image = image::RgbImage::new(size.width.max(1), size.height.max(1));
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| DesktopError::Image(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_bounds() {
        let screen = ScreenSize::default();
        assert!(screen.contains(100, 200));
        assert!(screen.contains(1919, 1079));
        assert!(!screen.contains(1920, 10));
        assert!(!screen.contains(9999, 9999));
        assert!(!screen.contains(-1, 0));
    }

    #[test]
    fn test_scroll_direction_parse() {
        assert_eq!(ScrollDirection::parse(" Down "), Some(ScrollDirection::Down));
        assert_eq!(ScrollDirection::parse("sideways"), None);
    }
}
