//! System desktop - drives the host through subprocesses
//!
//! Windows: PowerShell with `SendKeys`, `user32` mouse calls and
//! `CopyFromScreen`. Linux/BSD: `xdotool`, ImageMagick `import` and
//! `xdg-open`. macOS: `open`, `osascript` and `screencapture`.
//!
//! Commands are built as program + argument lists, never shell strings.
//! User text reaches PowerShell through environment variables so it is
//! never parsed as script.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Desktop, DesktopError, MouseButton, ScreenSize, ScrollDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Windows,
    MacOs,
    Unix,
}

impl Platform {
    fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unix
        }
    }
}

const POWERSHELL_MOUSE: &str = "Add-Type -Namespace Nova -Name Mouse -MemberDefinition '\
[DllImport(\"user32.dll\")] public static extern bool SetCursorPos(int x, int y);\
[DllImport(\"user32.dll\")] public static extern void mouse_event(uint f, int dx, int dy, int d, System.UIntPtr e);'";

const MOUSE_LEFT_DOWN: u32 = 0x0002;
const MOUSE_LEFT_UP: u32 = 0x0004;
const MOUSE_RIGHT_DOWN: u32 = 0x0008;
const MOUSE_RIGHT_UP: u32 = 0x0010;
const MOUSE_WHEEL: u32 = 0x0800;
const WHEEL_DELTA: i64 = 120;

/// Desktop backend for the machine we are running on
#[derive(Debug, Clone)]
pub struct SystemDesktop {
    platform: Platform,
    screen: ScreenSize,
    launch_delay: Duration,
    text_editor: String,
}

impl SystemDesktop {
    /// Detect the platform and screen size; `screen` overrides detection
    pub fn new(screen: Option<ScreenSize>) -> Self {
        let platform = Platform::current();
        let text_editor = std::env::var("NOVA_TEXT_EDITOR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| match platform {
                Platform::Windows => "notepad.exe".to_string(),
                Platform::MacOs => "TextEdit".to_string(),
                Platform::Unix => "gedit".to_string(),
            });

        let mut desktop = Self {
            platform,
            screen: ScreenSize::default(),
            launch_delay: Duration::from_millis(1500),
            text_editor,
        };

        desktop.screen = match screen {
            Some(size) => size,
            None => desktop.detect_screen().unwrap_or_else(|| {
                warn!("Could not detect screen size, assuming 1920x1080");
                ScreenSize::default()
            }),
        };
        desktop
    }

    /// Time to wait after launching an application before sending input
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    fn detect_screen(&self) -> Option<ScreenSize> {
        let output = match self.platform {
            Platform::Windows => self
                .powershell(
                    "Add-Type -AssemblyName System.Windows.Forms; \
                     $b = [System.Windows.Forms.Screen]::PrimaryScreen.Bounds; \
                     Write-Output \"$($b.Width) $($b.Height)\"",
                    &[],
                )
                .ok()?,
            Platform::Unix => run("xdotool", &["getdisplaygeometry"], &[]).ok()?,
            Platform::MacOs => return None,
        };
        parse_geometry(&output)
    }

    fn powershell(&self, script: &str, env: &[(&str, &str)]) -> Result<String, DesktopError> {
        run(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command", script],
            env,
        )
    }

    fn send_keys(&self, keys: &str) -> Result<(), DesktopError> {
        self.powershell(
            "Add-Type -AssemblyName System.Windows.Forms; \
             [System.Windows.Forms.SendKeys]::SendWait($env:NOVA_KEYS)",
            &[("NOVA_KEYS", keys)],
        )
        .map(|_| ())
    }

    fn mouse_script(&self, body: &str) -> Result<(), DesktopError> {
        self.powershell(&format!("{}; {}", POWERSHELL_MOUSE, body), &[]).map(|_| ())
    }

    fn resolve_application<'a>(&'a self, name: &'a str) -> &'a str {
        match name.trim().to_lowercase().as_str() {
            "notepad" | "notepad.exe" | "text editor" | "editor" => self.text_editor.as_str(),
            "calculator" | "calc" => match self.platform {
                Platform::Windows => "calc.exe",
                Platform::MacOs => "Calculator",
                Platform::Unix => "gnome-calculator",
            },
            "paint" => match self.platform {
                Platform::Windows => "mspaint.exe",
                _ => "kolourpaint",
            },
            _ => name.trim(),
        }
    }
}

impl Desktop for SystemDesktop {
    fn name(&self) -> &'static str {
        "system"
    }

    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn open_application(&self, name: &str) -> Result<(), DesktopError> {
        let program = self.resolve_application(name).to_string();
        debug!("Launching {}", program);

        match self.platform {
            Platform::Windows => {
                self.powershell("Start-Process -FilePath $env:NOVA_APP", &[("NOVA_APP", &program)])?;
            }
            Platform::MacOs => {
                run("open", &["-a", &program], &[])?;
            }
            Platform::Unix => {
                spawn_detached(&program)?;
            }
        }

        std::thread::sleep(self.launch_delay);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => self.send_keys(&sendkeys_escape(text)),
            Platform::Unix => run("xdotool", &["type", "--delay", "12", "--", text], &[]).map(|_| ()),
            Platform::MacOs => run(
                "osascript",
                &[
                    "-e",
                    "on run argv",
                    "-e",
                    "tell application \"System Events\" to keystroke (item 1 of argv)",
                    "-e",
                    "end run",
                    text,
                ],
                &[],
            )
            .map(|_| ()),
        }
    }

    fn click(&self, x: i64, y: i64, button: MouseButton, clicks: u8) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => {
                let (down, up) = match button {
                    MouseButton::Left => (MOUSE_LEFT_DOWN, MOUSE_LEFT_UP),
                    MouseButton::Right => (MOUSE_RIGHT_DOWN, MOUSE_RIGHT_UP),
                };
                let mut body = format!("[Nova.Mouse]::SetCursorPos({}, {}) | Out-Null", x, y);
                for _ in 0..clicks.max(1) {
                    body.push_str(&format!(
                        "; [Nova.Mouse]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero); [Nova.Mouse]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero)",
                        down, up
                    ));
                }
                self.mouse_script(&body)
            }
            Platform::Unix => {
                let button_id = match button {
                    MouseButton::Left => "1",
                    MouseButton::Right => "3",
                };
                let (x, y, repeat) = (x.to_string(), y.to_string(), clicks.max(1).to_string());
                run(
                    "xdotool",
                    &["mousemove", &x, &y, "click", "--repeat", &repeat, button_id],
                    &[],
                )
                .map(|_| ())
            }
            Platform::MacOs => Err(DesktopError::Unsupported("mouse control on macOS".to_string())),
        }
    }

    fn drag_to(&self, x: i64, y: i64) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => self.mouse_script(&format!(
                "[Nova.Mouse]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero); Start-Sleep -Milliseconds 100; \
                 [Nova.Mouse]::SetCursorPos({}, {}) | Out-Null; Start-Sleep -Milliseconds 100; \
                 [Nova.Mouse]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero)",
                MOUSE_LEFT_DOWN, x, y, MOUSE_LEFT_UP
            )),
            Platform::Unix => {
                let (x, y) = (x.to_string(), y.to_string());
                run("xdotool", &["mousedown", "1", "mousemove", &x, &y, "mouseup", "1"], &[]).map(|_| ())
            }
            Platform::MacOs => Err(DesktopError::Unsupported("mouse control on macOS".to_string())),
        }
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => {
                let delta = match direction {
                    ScrollDirection::Up => WHEEL_DELTA * i64::from(amount),
                    ScrollDirection::Down => -WHEEL_DELTA * i64::from(amount),
                };
                self.mouse_script(&format!(
                    "[Nova.Mouse]::mouse_event({}, 0, 0, {}, [UIntPtr]::Zero)",
                    MOUSE_WHEEL, delta
                ))
            }
            Platform::Unix => {
                let button_id = match direction {
                    ScrollDirection::Up => "4",
                    ScrollDirection::Down => "5",
                };
                let repeat = amount.max(1).to_string();
                run("xdotool", &["click", "--repeat", &repeat, button_id], &[]).map(|_| ())
            }
            Platform::MacOs => Err(DesktopError::Unsupported("scrolling on macOS".to_string())),
        }
    }

    fn press_key(&self, key: &str) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => self.send_keys(&sendkeys_key(key)?),
            Platform::Unix => run("xdotool", &["key", &xdotool_key(key)], &[]).map(|_| ()),
            Platform::MacOs => Err(DesktopError::Unsupported("key presses on macOS".to_string())),
        }
    }

    fn press_combination(&self, keys: &[String]) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => self.send_keys(&sendkeys_combination(keys)?),
            Platform::Unix => {
                let combo = keys.iter().map(|k| xdotool_key(k)).collect::<Vec<_>>().join("+");
                run("xdotool", &["key", &combo], &[]).map(|_| ())
            }
            Platform::MacOs => Err(DesktopError::Unsupported("key combinations on macOS".to_string())),
        }
    }

    fn capture_screen(&self, path: &Path) -> Result<(), DesktopError> {
        let path_str = path.to_string_lossy().to_string();
        match self.platform {
            Platform::Windows => self
                .powershell(
                    "Add-Type -AssemblyName System.Windows.Forms,System.Drawing; \
                     $b = [System.Windows.Forms.Screen]::PrimaryScreen.Bounds; \
                     $bmp = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
                     $g = [System.Drawing.Graphics]::FromImage($bmp); \
                     try { $g.CopyFromScreen($b.Location, [System.Drawing.Point]::Empty, $b.Size); \
                           $bmp.Save($env:NOVA_PATH, [System.Drawing.Imaging.ImageFormat]::Png) } \
                     finally { $g.Dispose(); $bmp.Dispose() }",
                    &[("NOVA_PATH", &path_str)],
                )
                .map(|_| ()),
            Platform::MacOs => run("screencapture", &["-x", &path_str], &[]).map(|_| ()),
            Platform::Unix => match run("import", &["-window", "root", &path_str], &[]) {
                Ok(_) => Ok(()),
                Err(e) => {
                    debug!("import failed ({}), trying gnome-screenshot", e);
                    run("gnome-screenshot", &["-f", &path_str], &[]).map(|_| ())
                }
            },
        }
    }

    fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        match self.platform {
            Platform::Windows => self
                .powershell("Start-Process -FilePath $env:NOVA_URL", &[("NOVA_URL", url)])
                .map(|_| ()),
            Platform::MacOs => run("open", &[url], &[]).map(|_| ()),
            Platform::Unix => run("xdg-open", &[url], &[]).map(|_| ()),
        }
    }
}

/// Start a long-lived program and reap it from a watcher thread when it exits
fn spawn_detached(program: &str) -> Result<Option<JoinHandle<Option<ExitStatus>>>, DesktopError> {
    let mut child = Command::new(program)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| DesktopError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let name = program.to_string();
    let watcher = std::thread::Builder::new()
        .name(format!("reap-{}", child.id()))
        .spawn(move || match child.wait() {
            Ok(status) => {
                debug!("{} exited: {}", name, status);
                Some(status)
            }
            Err(e) => {
                warn!("Lost track of {}: {}", name, e);
                None
            }
        });

    match watcher {
        Ok(handle) => Ok(Some(handle)),
        Err(e) => {
            warn!("No watcher thread for {}, it will not be reaped: {}", program, e);
            Ok(None)
        }
    }
}

/// Run a program to completion and return its stdout
fn run(program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<String, DesktopError> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    for (key, value) in env {
        command.env(key, value);
    }

    let output = command.output().map_err(|source| DesktopError::Spawn {
        program: program.to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(DesktopError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_geometry(output: &str) -> Option<ScreenSize> {
    let mut parts = output.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some(ScreenSize { width, height })
}

/// Escape literal text for SendKeys
fn sendkeys_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                escaped.push('{');
                escaped.push(c);
                escaped.push('}');
            }
            '\r' => {}
            '\n' => escaped.push_str("{ENTER}"),
            '\t' => escaped.push_str("{TAB}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// SendKeys code for a named key
fn sendkeys_key(key: &str) -> Result<String, DesktopError> {
    let lower = key.trim().to_lowercase();
    let code = match lower.as_str() {
        "enter" | "return" => "{ENTER}",
        "tab" => "{TAB}",
        "esc" | "escape" => "{ESC}",
        "backspace" => "{BACKSPACE}",
        "delete" | "del" => "{DELETE}",
        "up" => "{UP}",
        "down" => "{DOWN}",
        "left" => "{LEFT}",
        "right" => "{RIGHT}",
        "home" => "{HOME}",
        "end" => "{END}",
        "pageup" | "page_up" => "{PGUP}",
        "pagedown" | "page_down" => "{PGDN}",
        "space" => " ",
        "win" | "windows" | "super" => {
            return Err(DesktopError::Unsupported("the Windows key via SendKeys".to_string()))
        }
        _ => {
            if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                if (1..=16).contains(&n) {
                    return Ok(format!("{{F{}}}", n));
                }
            }
            if lower.chars().count() == 1 {
                return Ok(sendkeys_escape(&lower));
            }
            return Err(DesktopError::Unsupported(format!("key '{}'", key)));
        }
    };
    Ok(code.to_string())
}

/// SendKeys code for a modifier chord, e.g. ctrl+s -> ^s
fn sendkeys_combination(keys: &[String]) -> Result<String, DesktopError> {
    let mut prefix = String::new();
    let mut main = Vec::new();
    for key in keys {
        match key.trim().to_lowercase().as_str() {
            "ctrl" | "control" => prefix.push('^'),
            "shift" => prefix.push('+'),
            "alt" => prefix.push('%'),
            _ => main.push(sendkeys_key(key)?),
        }
    }
    if main.is_empty() {
        return Err(DesktopError::Unsupported("a combination of modifiers only".to_string()));
    }
    if main.len() == 1 {
        Ok(format!("{}{}", prefix, main[0]))
    } else {
        Ok(format!("{}({})", prefix, main.concat()))
    }
}

/// xdotool keysym for a named key
fn xdotool_key(key: &str) -> String {
    let lower = key.trim().to_lowercase();
    match lower.as_str() {
        "enter" | "return" => "Return".to_string(),
        "esc" | "escape" => "Escape".to_string(),
        "backspace" => "BackSpace".to_string(),
        "tab" => "Tab".to_string(),
        "delete" | "del" => "Delete".to_string(),
        "pageup" | "page_up" => "Prior".to_string(),
        "pagedown" | "page_down" => "Next".to_string(),
        "home" => "Home".to_string(),
        "end" => "End".to_string(),
        "up" => "Up".to_string(),
        "down" => "Down".to_string(),
        "left" => "Left".to_string(),
        "right" => "Right".to_string(),
        "space" => "space".to_string(),
        "control" => "ctrl".to_string(),
        "win" | "windows" => "super".to_string(),
        _ if lower.starts_with('f') && lower[1..].parse::<u8>().is_ok() => lower.to_uppercase(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sendkeys_escape() {
        assert_eq!(sendkeys_escape("Hello, world"), "Hello, world");
        assert_eq!(sendkeys_escape("1+1=2 (yes)"), "1{+}1=2 {(}yes{)}");
        assert_eq!(sendkeys_escape("a\r\nb"), "a{ENTER}b");
    }

    #[test]
    fn test_sendkeys_combination() {
        let keys = |s: &[&str]| s.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        assert_eq!(sendkeys_combination(&keys(&["ctrl", "s"])).unwrap(), "^s");
        assert_eq!(sendkeys_combination(&keys(&["ctrl", "shift", "esc"])).unwrap(), "^+{ESC}");
        assert_eq!(sendkeys_combination(&keys(&["alt", "f4"])).unwrap(), "%{F4}");
        assert!(sendkeys_combination(&keys(&["ctrl", "shift"])).is_err());
        assert!(sendkeys_combination(&keys(&["win", "d"])).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_detached_program_is_reaped() {
        let watcher = spawn_detached("true").unwrap().unwrap();
        let status = watcher.join().unwrap();
        assert!(status.unwrap().success());

        let missing = spawn_detached("nova-no-such-program");
        assert!(matches!(missing, Err(DesktopError::Spawn { .. })));
    }

    #[test]
    fn test_xdotool_keys() {
        assert_eq!(xdotool_key("Enter"), "Return");
        assert_eq!(xdotool_key("f5"), "F5");
        assert_eq!(xdotool_key("a"), "a");
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!(parse_geometry("2560 1440\n"), Some(ScreenSize { width: 2560, height: 1440 }));
        assert_eq!(parse_geometry("garbage"), None);
    }
}
