//! Headless desktop - no host interaction
//!
//! Input actions are logged and succeed; screenshots are blank PNGs of the
//! configured screen size. Used for `--headless` runs and smoke tests on
//! machines without a display.

use std::path::Path;
use tracing::debug;

use super::{write_blank_png, Desktop, DesktopError, MouseButton, ScreenSize, ScrollDirection};

#[derive(Debug, Clone, Default)]
pub struct HeadlessDesktop {
    screen: ScreenSize,
}

impl HeadlessDesktop {
    pub fn new(screen: ScreenSize) -> Self {
        Self { screen }
    }
}

impl Desktop for HeadlessDesktop {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn open_application(&self, name: &str) -> Result<(), DesktopError> {
        debug!("headless: open application {}", name);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), DesktopError> {
        debug!("headless: type {} chars", text.chars().count());
        Ok(())
    }

    fn click(&self, x: i64, y: i64, button: MouseButton, clicks: u8) -> Result<(), DesktopError> {
        debug!("headless: {:?} click x{} at ({}, {})", button, clicks, x, y);
        Ok(())
    }

    fn drag_to(&self, x: i64, y: i64) -> Result<(), DesktopError> {
        debug!("headless: drag to ({}, {})", x, y);
        Ok(())
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DesktopError> {
        debug!("headless: scroll {:?} by {}", direction, amount);
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<(), DesktopError> {
        debug!("headless: press {}", key);
        Ok(())
    }

    fn press_combination(&self, keys: &[String]) -> Result<(), DesktopError> {
        debug!("headless: press {}", keys.join("+"));
        Ok(())
    }

    fn capture_screen(&self, path: &Path) -> Result<(), DesktopError> {
        write_blank_png(path, self.screen)
    }

    fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        debug!("headless: open url {}", url);
        Ok(())
    }
}
