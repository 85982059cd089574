//! Window geometry control: size the browser window so the rendered content
//! area exactly matches the requested capture resolution.

use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, GetWindowForTargetParams, SetWindowBoundsParams, WindowState,
};
use chromiumoxide::Page;
use tracing::debug;

use crate::error::{PagecastError, Result};
use crate::Viewport;

/// Measured difference between the window's outer bounds and its content
/// viewport, together with the content size the capture wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub content: Viewport,
    pub inset_width: u32,
    pub inset_height: u32,
}

impl WindowGeometry {
    /// Outer window dimensions that make the content area exactly `content`.
    pub fn outer_bounds(&self) -> (u32, u32) {
        (
            self.content.width + self.inset_width,
            self.content.height + self.inset_height,
        )
    }
}

/// Measure the chrome inset of the navigated page and apply outer window
/// bounds so the viewport equals `content`. Must run after navigation: the
/// inset measurement depends on the loaded page. Optionally minimizes the
/// window afterwards; callers enable that only on platforms where a
/// minimized window keeps rendering.
pub async fn fit_window(page: &Page, content: Viewport, minimize: bool) -> Result<WindowGeometry> {
    let (inset_width, inset_height) = measure_inset(page).await?;
    let geometry = WindowGeometry {
        content,
        inset_width,
        inset_height,
    };
    let (outer_width, outer_height) = geometry.outer_bounds();

    let window = page
        .execute(GetWindowForTargetParams::default())
        .await
        .map_err(|e| PagecastError::cdp(e.to_string()))?;
    let window_id = window.window_id.clone();

    page.execute(SetWindowBoundsParams::new(
        window_id.clone(),
        Bounds {
            left: None,
            top: None,
            width: Some(outer_width as i64),
            height: Some(outer_height as i64),
            window_state: None,
        },
    ))
    .await
    .map_err(|e| PagecastError::cdp(e.to_string()))?;

    debug!(
        content = %content,
        inset_width,
        inset_height,
        outer_width,
        outer_height,
        "applied window bounds"
    );

    if minimize {
        page.execute(SetWindowBoundsParams::new(
            window_id,
            Bounds {
                left: None,
                top: None,
                width: None,
                height: None,
                window_state: Some(WindowState::Minimized),
            },
        ))
        .await
        .map_err(|e| PagecastError::cdp(e.to_string()))?;
        debug!("minimized capture window");
    }

    Ok(geometry)
}

async fn measure_inset(page: &Page) -> Result<(u32, u32)> {
    let (dw, dh): (i64, i64) = page
        .evaluate("[window.outerWidth - window.innerWidth, window.outerHeight - window.innerHeight]")
        .await
        .map_err(|e| PagecastError::cdp(e.to_string()))?
        .into_value()
        .map_err(|e| PagecastError::cdp(format!("inset measurement: {e}")))?;

    // Negative insets show up transiently while the window is still
    // animating; treat them as zero rather than shrinking the target.
    Ok((dw.max(0) as u32, dh.max(0) as u32))
}
