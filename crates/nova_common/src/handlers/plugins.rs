//! Plug-in handlers: browser, files, email, shopping

use std::fs::OpenOptions;
use std::io::Write;
use url::Url;

use super::{opt_str_param, str_param, HandlerContext, HandlerError};
use crate::action_plan::Params;

const SEARCH_URL: &str = "https://www.google.com/search";
const SHOP_URL: &str = "https://www.amazon.com/s";

fn with_query(base: &str, key: &str, value: &str) -> Result<Url, HandlerError> {
    Url::parse_with_params(base, &[(key, value)]).map_err(|e| HandlerError::Failed(format!("bad URL {}: {}", base, e)))
}

pub fn open_url(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let url = str_param(params, "url")?;
    ctx.desktop.open_url(url)?;
    Ok(format!("Opened {}", url))
}

pub fn search_web(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let query = str_param(params, "query")?;
    let url = with_query(SEARCH_URL, "q", query)?;
    ctx.desktop.open_url(url.as_str())?;
    Ok(format!("Searched the web for {}", query))
}

pub fn search_product(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let query = str_param(params, "query")?;
    let url = with_query(SHOP_URL, "k", query)?;
    ctx.desktop.open_url(url.as_str())?;
    Ok(format!("Searched the store for {}", query))
}

/// Build a `mailto:` URL with percent-encoded subject and body
pub fn mailto(to: &str, subject: &str, body: Option<&str>) -> Result<Url, HandlerError> {
    let mut url = Url::parse(&format!("mailto:{}", to.trim()))
        .map_err(|e| HandlerError::InvalidParameter(format!("bad recipient {:?}: {}", to, e)))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("subject", subject);
        if let Some(body) = body {
            query.append_pair("body", body);
        }
    }
    Ok(url)
}

pub fn compose_email(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let to = str_param(params, "to")?;
    if !to.contains('@') {
        return Err(HandlerError::InvalidParameter(format!("{:?} is not an email address", to)));
    }
    let subject = opt_str_param(params, "subject").unwrap_or("(no subject)");
    let url = mailto(to, subject, opt_str_param(params, "body"))?;
    ctx.desktop.open_url(url.as_str())?;
    Ok(format!("Opened a new email to {}", to))
}

/// Create a new file; never overwrites an existing one
pub fn create_file(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let path = ctx.resolve_path(str_param(params, "path")?);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| HandlerError::Failed(format!("cannot create {}: {}", path.display(), e)))?;
    let content = opt_str_param(params, "content").unwrap_or("");
    file.write_all(content.as_bytes())?;
    Ok(format!("Created {} ({} bytes)", path.display(), content.len()))
}

pub fn delete_file(ctx: &HandlerContext, params: &Params) -> Result<String, HandlerError> {
    let path = ctx.resolve_path(str_param(params, "path")?);
    if !path.is_file() {
        return Err(HandlerError::Failed(format!("{} is not a file", path.display())));
    }
    std::fs::remove_file(&path)?;
    Ok(format!("Deleted {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::DesktopEvent;
    use crate::handlers::testing::{context, params};
    use serde_json::json;

    #[test]
    fn test_search_encodes_query() {
        let dir = tempfile::tempdir().unwrap();
        let (desktop, ctx) = context(dir.path());
        search_web(&ctx, &params(json!({"query": "rust & tokio"}))).unwrap();
        match &desktop.events()[0] {
            DesktopEvent::OpenUrl(url) => assert_eq!(url, "https://www.google.com/search?q=rust+%26+tokio"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_mailto() {
        let url = mailto("ada@example.org", "Lunch plans", Some("See you at noon")).unwrap();
        assert_eq!(url.scheme(), "mailto");
        assert!(url.as_str().starts_with("mailto:ada@example.org?subject=Lunch+plans"));
    }

    #[test]
    fn test_compose_rejects_non_address() {
        let dir = tempfile::tempdir().unwrap();
        let (desktop, ctx) = context(dir.path());
        let err = compose_email(&ctx, &params(json!({"to": "bob"}))).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParameter(_)));
        assert!(desktop.events().is_empty());
    }

    #[test]
    fn test_create_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (_, ctx) = context(dir.path());
        create_file(&ctx, &params(json!({"path": "notes/todo.txt", "content": "milk"}))).unwrap();
        let path = dir.path().join("notes/todo.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "milk");

        assert!(create_file(&ctx, &params(json!({"path": "notes/todo.txt"}))).is_err());

        delete_file(&ctx, &params(json!({"path": "notes/todo.txt"}))).unwrap();
        assert!(!path.exists());
        assert!(delete_file(&ctx, &params(json!({"path": "notes/todo.txt"}))).is_err());
    }
}
