//! Recording desktop - test double
//!
//! Records every call instead of touching the host. Can be told to fail the
//! next N calls or to stall, which is how retry and timeout paths are tested.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{write_blank_png, Desktop, DesktopError, MouseButton, ScreenSize, ScrollDirection};

/// One recorded desktop call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesktopEvent {
    OpenApplication(String),
    TypeText(String),
    Click { x: i64, y: i64, button: MouseButton, clicks: u8 },
    DragTo { x: i64, y: i64 },
    Scroll { direction: ScrollDirection, amount: u32 },
    PressKey(String),
    PressCombination(Vec<String>),
    Screenshot(PathBuf),
    OpenUrl(String),
}

#[derive(Debug, Default)]
pub struct RecordingDesktop {
    screen: ScreenSize,
    events: Mutex<Vec<DesktopEvent>>,
    failures_left: Mutex<u32>,
    stall: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingDesktop {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            ..Self::default()
        }
    }

    /// Fail the next `n` calls with an injected error
    pub fn fail_next(&self, n: u32) {
        *lock(&self.failures_left) = n;
    }

    /// Sleep this long inside every call
    pub fn stall_for(&self, duration: Duration) {
        *lock(&self.stall) = Some(duration);
    }

    pub fn events(&self) -> Vec<DesktopEvent> {
        lock(&self.events).clone()
    }

    /// Everything passed to type_text, in order
    pub fn typed_text(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DesktopEvent::TypeText(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn mouse_events(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, DesktopEvent::Click { .. } | DesktopEvent::DragTo { .. }))
            .count()
    }

    fn record(&self, event: DesktopEvent) -> Result<(), DesktopError> {
        let stall = *lock(&self.stall);
        if let Some(duration) = stall {
            std::thread::sleep(duration);
        }

        {
            let mut failures = lock(&self.failures_left);
            if *failures > 0 {
                *failures -= 1;
                return Err(DesktopError::Injected(format!("{:?}", event)));
            }
        }

        lock(&self.events).push(event);
        Ok(())
    }
}

impl Desktop for RecordingDesktop {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn open_application(&self, name: &str) -> Result<(), DesktopError> {
        self.record(DesktopEvent::OpenApplication(name.to_string()))
    }

    fn type_text(&self, text: &str) -> Result<(), DesktopError> {
        self.record(DesktopEvent::TypeText(text.to_string()))
    }

    fn click(&self, x: i64, y: i64, button: MouseButton, clicks: u8) -> Result<(), DesktopError> {
        self.record(DesktopEvent::Click { x, y, button, clicks })
    }

    fn drag_to(&self, x: i64, y: i64) -> Result<(), DesktopError> {
        self.record(DesktopEvent::DragTo { x, y })
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DesktopError> {
        self.record(DesktopEvent::Scroll { direction, amount })
    }

    fn press_key(&self, key: &str) -> Result<(), DesktopError> {
        self.record(DesktopEvent::PressKey(key.to_string()))
    }

    fn press_combination(&self, keys: &[String]) -> Result<(), DesktopError> {
        self.record(DesktopEvent::PressCombination(keys.to_vec()))
    }

    fn capture_screen(&self, path: &Path) -> Result<(), DesktopError> {
        self.record(DesktopEvent::Screenshot(path.to_path_buf()))?;
        write_blank_png(path, ScreenSize { width: 2, height: 2 })
    }

    fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        self.record(DesktopEvent::OpenUrl(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let desktop = RecordingDesktop::default();
        desktop.open_application("notepad").unwrap();
        desktop.type_text("hi").unwrap();

        assert_eq!(
            desktop.events(),
            vec![
                DesktopEvent::OpenApplication("notepad".to_string()),
                DesktopEvent::TypeText("hi".to_string()),
            ]
        );
    }

    #[test]
    fn test_fail_next_then_recover() {
        let desktop = RecordingDesktop::default();
        desktop.fail_next(1);
        assert!(desktop.press_key("enter").is_err());
        assert!(desktop.press_key("enter").is_ok());
        assert_eq!(desktop.events().len(), 1);
    }
}
