//! Primitive automation steps executed against a browsing context. The
//! debug input endpoints reuse `click_at`/`press_key` directly.

use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::Page;
use tracing::debug;

use crate::error::{PagecastError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll until the selector matches an element.
pub async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    let check = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(selector)?
    );
    wait_for(page, &check, timeout, &format!("element {selector}")).await
}

/// Poll until a media element matching the selector reports fully-buffered
/// readiness (readyState 4, HAVE_ENOUGH_DATA).
pub async fn wait_for_media(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    let check = format!(
        "(() => {{ const m = document.querySelector({}); return !!m && m.readyState === 4; }})()",
        serde_json::to_string(selector)?
    );
    wait_for(page, &check, timeout, &format!("media {selector}")).await
}

async fn wait_for(page: &Page, predicate: &str, timeout: Duration, what: &str) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let hit: bool = page
            .evaluate(predicate)
            .await
            .map_err(|e| PagecastError::cdp(e.to_string()))?
            .into_value()
            .unwrap_or(false);
        if hit {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PagecastError::cdp(format!(
                "timed out after {timeout:?} waiting for {what}"
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Build the style-override script: force the element into the requested
/// presentation and kick playback if it is a media element.
pub(crate) fn style_override_script(selector: &str, styles: &[(&str, &str)]) -> String {
    let mut assignments = String::new();
    for (property, value) in styles {
        assignments.push_str(&format!(
            "el.style.setProperty({}, {});",
            serde_json::to_string(property).unwrap_or_default(),
            serde_json::to_string(value).unwrap_or_default()
        ));
    }
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         {assignments} if (typeof el.play === 'function') el.play(); return true; }})()",
        sel = serde_json::to_string(selector).unwrap_or_default(),
    )
}

pub async fn apply_styles(page: &Page, selector: &str, styles: &[(&str, &str)]) -> Result<()> {
    let script = style_override_script(selector, styles);
    let applied: bool = page
        .evaluate(script)
        .await
        .map_err(|e| PagecastError::cdp(e.to_string()))?
        .into_value()
        .unwrap_or(false);
    if applied {
        Ok(())
    } else {
        Err(PagecastError::cdp(format!(
            "style target {selector} not found"
        )))
    }
}

/// Dispatch a trusted click at viewport coordinates. Used where target
/// pages expose no stable selector; the coordinates are part of the recipe
/// data and tied to the capture resolution.
pub async fn click_at(page: &Page, x: f64, y: f64) -> Result<()> {
    let press = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MousePressed)
        .x(x)
        .y(y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(PagecastError::Cdp)?;
    page.execute(press)
        .await
        .map_err(|e| PagecastError::cdp(e.to_string()))?;

    let release = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseReleased)
        .x(x)
        .y(y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(PagecastError::Cdp)?;
    page.execute(release)
        .await
        .map_err(|e| PagecastError::cdp(e.to_string()))?;

    debug!(x, y, "dispatched click");
    Ok(())
}

/// Named key lookup: key value, code, printed text, Windows virtual key.
fn key_spec(name: &str) -> Option<(&'static str, &'static str, Option<&'static str>, i64)> {
    match name {
        "Tab" => Some(("Tab", "Tab", Some("\t"), 9)),
        "Enter" => Some(("Enter", "Enter", Some("\r"), 13)),
        "Escape" => Some(("Escape", "Escape", None, 27)),
        "Space" => Some((" ", "Space", Some(" "), 32)),
        "ArrowLeft" => Some(("ArrowLeft", "ArrowLeft", None, 37)),
        "ArrowUp" => Some(("ArrowUp", "ArrowUp", None, 38)),
        "ArrowRight" => Some(("ArrowRight", "ArrowRight", None, 39)),
        "ArrowDown" => Some(("ArrowDown", "ArrowDown", None, 40)),
        _ => None,
    }
}

/// Dispatch a named key press (down + up).
pub async fn press_key(page: &Page, name: &str) -> Result<()> {
    let (key, code, text, vkc) = key_spec(name)
        .ok_or_else(|| PagecastError::cdp(format!("unknown key {name}")))?;

    for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(event_type)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vkc);
        if let Some(text) = text {
            builder = builder.text(text);
        }
        let event = builder.build().map_err(PagecastError::Cdp)?;
        page.execute(event)
            .await
            .map_err(|e| PagecastError::cdp(e.to_string()))?;
    }

    debug!(key = name, "dispatched key press");
    Ok(())
}

/// Type literal text into the focused element, one character at a time.
pub async fn type_text(page: &Page, text: &str) -> Result<()> {
    for c in text.chars() {
        let char_text = c.to_string();
        for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let event = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .text(char_text.clone())
                .build()
                .map_err(PagecastError::Cdp)?;
            page.execute(event)
                .await
                .map_err(|e| PagecastError::cdp(e.to_string()))?;
        }
    }
    debug!(chars = text.len(), "typed text");
    Ok(())
}

/// Ask the page to enter fullscreen on its media element (or the document
/// root). Rejections are swallowed in-page: some sites refuse without a
/// user gesture and the style overrides already approximate full bleed.
pub async fn trigger_fullscreen(page: &Page) -> Result<()> {
    page.evaluate(
        "(() => { const el = document.querySelector('video') || document.documentElement; \
         if (el.requestFullscreen) el.requestFullscreen().catch(() => {}); return true; })()",
    )
    .await
    .map_err(|e| PagecastError::cdp(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_script_escapes_and_sets_properties() {
        let script = style_override_script("video", &[("z-index", "999000"), ("cursor", "none")]);
        assert!(script.contains("document.querySelector(\"video\")"));
        assert!(script.contains("el.style.setProperty(\"z-index\", \"999000\");"));
        assert!(script.contains("el.style.setProperty(\"cursor\", \"none\");"));
        assert!(script.contains("el.play()"));
    }

    #[test]
    fn style_script_quotes_awkward_selectors() {
        let script = style_override_script("div[data-role=\"player\"]", &[("top", "0")]);
        assert!(script.contains("querySelector(\"div[data-role=\\\"player\\\"]\")"));
    }

    #[test]
    fn key_specs_cover_navigation_keys() {
        assert!(key_spec("Tab").is_some());
        assert!(key_spec("Enter").is_some());
        assert!(key_spec("ArrowDown").is_some());
        assert!(key_spec("SuperKey").is_none());

        let (key, code, text, vkc) = key_spec("Enter").unwrap();
        assert_eq!(key, "Enter");
        assert_eq!(code, "Enter");
        assert_eq!(text, Some("\r"));
        assert_eq!(vkc, 13);
    }
}
