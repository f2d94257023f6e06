//! Document creation handlers
//!
//! Text comes from the composer; these handlers only decide where it goes.

use super::{bool_param, opt_str_param, str_param, HandlerContext, HandlerError};
use crate::action_plan::Params;
use crate::handlers::desktop::NOTEPAD;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn create_article(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let topic = str_param(params, "topic")?;
    let article = ctx.composer.article(topic);
    if bool_param(params, "open_in_notepad") {
        ctx.desktop.open_application(NOTEPAD)?;
    }
    ctx.desktop.type_text(&article)?;
    Ok(format!("Wrote a {}-word article about {}", word_count(&article), topic))
}

pub fn open_notepad_and_write_article(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let topic = str_param(params, "topic")?;
    let article = ctx.composer.article(topic);
    ctx.desktop.open_application(NOTEPAD)?;
    ctx.desktop.type_text(&article)?;
    Ok(format!("Opened Notepad and wrote a {}-word article about {}", word_count(&article), topic))
}

pub fn create_leave_letter(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let reason = opt_str_param(params, "reason").unwrap_or("personal reasons");
    let letter = ctx.composer.leave_letter(reason);
    ctx.desktop.open_application(NOTEPAD)?;
    ctx.desktop.type_text(&letter)?;
    Ok(format!("Wrote a leave letter ({})", reason))
}

/// Print the focused document to the PDF printer and name the file
pub fn save_as_pdf(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let name = opt_str_param(params, "filename").unwrap_or("document").trim();
    let filename = if name.to_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{}.pdf", name)
    };
    let target = ctx.resolve_path(&filename);

    ctx.desktop.press_combination(&["ctrl".to_string(), "p".to_string()])?;
    ctx.desktop.press_key("enter")?;
    ctx.desktop.type_text(&target.to_string_lossy())?;
    ctx.desktop.press_key("enter")?;
    Ok(format!("Sent the document to the PDF printer as {}", target.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::DesktopEvent;
    use crate::handlers::testing::{context, params};
    use serde_json::json;

    #[test]
    fn test_write_article_opens_notepad_then_types() {
        let dir = tempfile::tempdir().unwrap();
        let (desktop, ctx) = context(dir.path());
        let message = open_notepad_and_write_article(&ctx, &params(json!({"topic": "quantum computing"}))).unwrap();
        assert!(message.contains("quantum computing"));

        let events = desktop.events();
        assert_eq!(events[0], DesktopEvent::OpenApplication("notepad".into()));
        assert!(desktop.typed_text()[0].contains("quantum computing"));
    }

    #[test]
    fn test_create_article_without_notepad() {
        let dir = tempfile::tempdir().unwrap();
        let (desktop, ctx) = context(dir.path());
        create_article(&ctx, &params(json!({"topic": "tea", "open_in_notepad": false}))).unwrap();
        assert!(matches!(desktop.events()[0], DesktopEvent::TypeText(_)));
    }

    #[test]
    fn test_leave_letter_reason() {
        let dir = tempfile::tempdir().unwrap();
        let (desktop, ctx) = context(dir.path());
        create_leave_letter(&ctx, &params(json!({"reason": "a doctor's appointment"}))).unwrap();
        assert!(desktop.typed_text()[0].contains("a doctor's appointment"));
    }

    #[test]
    fn test_save_as_pdf_keystrokes() {
        let dir = tempfile::tempdir().unwrap();
        let (desktop, ctx) = context(dir.path());
        save_as_pdf(&ctx, &params(json!({"filename": "report"}))).unwrap();
        let typed = desktop.typed_text();
        assert!(typed[0].ends_with("report.pdf"));
        assert_eq!(desktop.events()[0], DesktopEvent::PressCombination(vec!["ctrl".into(), "p".into()]));
    }
}
