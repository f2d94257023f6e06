//! Desktop control handlers

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{int_param, str_param, HandlerContext, HandlerError};
use crate::action_plan::Params;
use crate::capability::split_combo;
use crate::desktop::{MouseButton, ScrollDirection};

pub const NOTEPAD: &str = "notepad";

pub fn open_application(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let name = str_param(params, "name")?;
    ctx.desktop.open_application(name)?;
    Ok(format!("Opened {}", name))
}

pub fn open_notepad(ctx: &HandlerContext, _params: &Params) -> Result<String, HandlerError> {
    ctx.desktop.open_application(NOTEPAD)?;
    Ok("Opened Notepad".to_string())
}

pub fn open_notepad_and_type(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let text = str_param(params, "text")?;
    ctx.desktop.open_application(NOTEPAD)?;
    ctx.desktop.type_text(text)?;
    Ok(format!("Opened Notepad and typed {} characters", text.chars().count()))
}

pub fn type_text(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let text = str_param(params, "text")?;
    ctx.desktop.type_text(text)?;
    Ok(format!("Typed {} characters", text.chars().count()))
}

pub fn append_text(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let text = str_param(params, "text")?;
    ctx.desktop.press_combination(&["ctrl".to_string(), "end".to_string()])?;
    ctx.desktop.type_text(text)?;
    Ok(format!("Appended {} characters to the document", text.chars().count()))
}

pub fn press_key(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let key = str_param(params, "key")?.trim().to_lowercase();
    ctx.desktop.press_key(&key)?;
    Ok(format!("Pressed {}", key))
}

pub fn press_key_combination(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let keys = split_combo(str_param(params, "keys")?);
    ctx.desktop.press_combination(&keys)?;
    Ok(format!("Pressed {}", keys.join("+")))
}

fn click(ctx: &HandlerContext, params: &Params, button: MouseButton, clicks: u8, verb: &str) -> Result<String, HandlerError> {
    let x = int_param(params, "x")?;
    let y = int_param(params, "y")?;
    ctx.desktop.click(x, y, button, clicks)?;
    Ok(format!("{} at ({}, {})", verb, x, y))
}

pub fn click_at(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    click(ctx, params, MouseButton::Left, 1, "Clicked")
}

pub fn double_click_at(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    click(ctx, params, MouseButton::Left, 2, "Double-clicked")
}

pub fn right_click_at(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    click(ctx, params, MouseButton::Right, 1, "Right-clicked")
}

pub fn drag_to(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let x = int_param(params, "x")?;
    let y = int_param(params, "y")?;
    ctx.desktop.drag_to(x, y)?;
    Ok(format!("Dragged to ({}, {})", x, y))
}

pub fn scroll(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let raw = str_param(params, "direction")?;
    let direction = ScrollDirection::parse(raw)
        .ok_or_else(|| HandlerError::InvalidParameter(format!("unknown scroll direction {:?}", raw)))?;
    let amount = int_param(params, "amount")?;
    let amount = u32::try_from(amount)
        .map_err(|_| HandlerError::InvalidParameter(format!("scroll amount {} out of range", amount)))?;
    ctx.desktop.scroll(direction, amount)?;
    Ok(format!("Scrolled {} by {}", raw, amount))
}

pub fn take_screenshot(ctx: &HandlerContext, _params: &Params) -> Result<String, HandlerError> {
    std::fs::create_dir_all(&ctx.desktop_path)?;
    let path = screenshot_path(&ctx.desktop_path, Local::now());
    ctx.desktop.capture_screen(&path)?;
    info!("Screenshot written to {}", path.display());
    Ok(format!("Screenshot saved to {}", path.display()))
}

/// `screenshot_YYYYMMDD_HHMMSS.png`, with `_2`, `_3`, ... when that name is taken
pub fn screenshot_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    let stem = format!("screenshot_{}", at.format("%Y%m%d_%H%M%S"));
    let first = dir.join(format!("{}.png", stem));
    if !first.exists() {
        return first;
    }
    (2u32..)
        .map(|n| dir.join(format!("{}_{}.png", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}
