//! Site automation recipes: per-destination procedures that take a freshly
//! navigated page to a capturable full-bleed playback state.
//!
//! Recipes are data wherever the target page has stable structure; only
//! destinations with no usable selectors get a bespoke procedural body, and
//! those may rely on fixed coordinates and delays. That fragility is a
//! property of the destination pages, carried openly in the recipe data.
//! Recipes never escalate failures: the owning capture session keeps
//! streaming whatever the page shows.

pub mod steps;

use std::time::Duration;

use chromiumoxide::Page;
use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::capture::request::CaptureRequest;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    WaitForElement {
        selector: &'static str,
        timeout: Duration,
    },
    WaitForMedia {
        selector: &'static str,
        timeout: Duration,
    },
    StyleOverride {
        selector: &'static str,
        styles: &'static [(&'static str, &'static str)],
    },
    SyntheticInput {
        actions: &'static [InputAction],
    },
    Fullscreen,
    Sleep(Duration),
}

#[derive(Debug, Clone, Copy)]
pub enum InputAction {
    Click { x: f64, y: f64 },
    Key(&'static str),
    Text(&'static str),
    Delay(Duration),
}

impl Step {
    /// Wait steps are skippable via the request's wait policy; pages with no
    /// detectable media element would otherwise stall on them.
    fn is_wait(&self) -> bool {
        matches!(self, Step::WaitForElement { .. } | Step::WaitForMedia { .. })
    }

    fn describe(&self) -> String {
        match self {
            Step::WaitForElement { selector, .. } => format!("wait-for-element({selector})"),
            Step::WaitForMedia { selector, .. } => format!("wait-for-media({selector})"),
            Step::StyleOverride { selector, .. } => format!("style-override({selector})"),
            Step::SyntheticInput { .. } => "synthetic-input".to_string(),
            Step::Fullscreen => "fullscreen".to_string(),
            Step::Sleep(d) => format!("sleep({d:?})"),
        }
    }
}

type ProceduralBody = for<'a> fn(&'a Page, &'a CaptureRequest) -> BoxFuture<'a, Result<()>>;

enum RecipeBody {
    Steps(&'static [Step]),
    Procedural(ProceduralBody),
}

pub struct Recipe {
    pub name: &'static str,
    body: RecipeBody,
}

/// How a recipe run ended. Degraded runs leave the capture session alive;
/// the distinction exists so callers log rather than abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeOutcome {
    Completed,
    Degraded { step: String, reason: String },
}

impl RecipeOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RecipeOutcome::Degraded { .. })
    }
}

/// Styles from the reference playback pages: pin the media element over
/// everything, black it out to the edges, hide the cursor.
const FULL_BLEED: &[(&str, &str)] = &[
    ("position", "fixed"),
    ("top", "0"),
    ("left", "0"),
    ("width", "100%"),
    ("height", "100%"),
    ("z-index", "999000"),
    ("background", "black"),
    ("cursor", "none"),
];

/// For pages that are already a full-viewport render: just tidy the chrome.
const BARE_PAGE: &[(&str, &str)] = &[("cursor", "none"), ("overflow", "hidden")];

const DEFAULT_STEPS: &[Step] = &[
    Step::WaitForMedia {
        selector: "video",
        timeout: Duration::from_secs(10),
    },
    Step::StyleOverride {
        selector: "video",
        styles: FULL_BLEED,
    },
];

const NBC_STEPS: &[Step] = &[
    Step::WaitForElement {
        selector: "video",
        timeout: Duration::from_secs(15),
    },
    Step::WaitForMedia {
        selector: "video",
        timeout: Duration::from_secs(15),
    },
    Step::StyleOverride {
        selector: "video",
        styles: FULL_BLEED,
    },
];

const WEATHERSCAN_STEPS: &[Step] = &[
    Step::Sleep(Duration::from_secs(2)),
    Step::StyleOverride {
        selector: "body",
        styles: BARE_PAGE,
    },
];

const WINDY_STEPS: &[Step] = &[
    Step::WaitForElement {
        selector: "#map-container",
        timeout: Duration::from_secs(10),
    },
    Step::StyleOverride {
        selector: "body",
        styles: BARE_PAGE,
    },
    Step::Fullscreen,
];

static DEFAULT_RECIPE: Recipe = Recipe {
    name: "default",
    body: RecipeBody::Steps(DEFAULT_STEPS),
};

static NBC_RECIPE: Recipe = Recipe {
    name: "nbc",
    body: RecipeBody::Steps(NBC_STEPS),
};

static WEATHERSCAN_RECIPE: Recipe = Recipe {
    name: "weatherscan",
    body: RecipeBody::Steps(WEATHERSCAN_STEPS),
};

static WINDY_RECIPE: Recipe = Recipe {
    name: "windy",
    body: RecipeBody::Steps(WINDY_STEPS),
};

static FRNDLY_RECIPE: Recipe = Recipe {
    name: "frndly",
    body: RecipeBody::Procedural(frndly_body),
};

/// The Frndly portal renders its channel search without stable selectors,
/// so this recipe tabs into the search box, types the requested channel and
/// clicks the first result tile at a fixed coordinate. Coordinates and
/// delays are tuned for a 1920x1080 capture.
fn frndly_body<'a>(page: &'a Page, request: &'a CaptureRequest) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        steps::wait_for_element(page, "input", Duration::from_secs(15)).await?;

        for _ in 0..3 {
            steps::press_key(page, "Tab").await?;
            sleep(Duration::from_millis(200)).await;
        }

        if let Some(channel) = request.channel.as_deref() {
            steps::type_text(page, channel).await?;
            sleep(Duration::from_millis(800)).await;
            steps::press_key(page, "Enter").await?;
            sleep(Duration::from_millis(1500)).await;
            steps::click_at(page, 640.0, 360.0).await?;
        }

        if request.wait_for_media {
            steps::wait_for_media(page, "video", Duration::from_secs(15)).await?;
        }
        steps::apply_styles(page, "video", FULL_BLEED).await?;
        Ok(())
    })
}

/// Registry of recipes keyed by destination alias.
pub struct RecipeBook;

impl RecipeBook {
    pub fn resolve(alias: Option<&str>) -> &'static Recipe {
        match alias {
            Some("nbc") | Some("cnbc") => &NBC_RECIPE,
            Some("weatherscan") => &WEATHERSCAN_RECIPE,
            Some("windy") => &WINDY_RECIPE,
            Some("frndly") => &FRNDLY_RECIPE,
            _ => &DEFAULT_RECIPE,
        }
    }

    /// Run the recipe for the request's destination. Never fails the
    /// session: every error is caught here and reported as a degraded
    /// outcome.
    pub async fn run(page: &Page, request: &CaptureRequest) -> RecipeOutcome {
        let recipe = Self::resolve(request.destination.as_deref());
        info!(recipe = recipe.name, "running site recipe");

        match &recipe.body {
            RecipeBody::Steps(step_list) => {
                for step in *step_list {
                    if step.is_wait() && !request.wait_for_media {
                        continue;
                    }
                    if let Err(e) = run_step(page, step).await {
                        let outcome = RecipeOutcome::Degraded {
                            step: step.describe(),
                            reason: e.to_string(),
                        };
                        warn!(
                            recipe = recipe.name,
                            step = %step.describe(),
                            error = %e,
                            "recipe step failed; continuing degraded"
                        );
                        return outcome;
                    }
                }
                RecipeOutcome::Completed
            }
            RecipeBody::Procedural(body) => match body(page, request).await {
                Ok(()) => RecipeOutcome::Completed,
                Err(e) => {
                    warn!(
                        recipe = recipe.name,
                        error = %e,
                        "recipe failed; continuing degraded"
                    );
                    RecipeOutcome::Degraded {
                        step: "procedural".to_string(),
                        reason: e.to_string(),
                    }
                }
            },
        }
    }
}

async fn run_step(page: &Page, step: &Step) -> Result<()> {
    match step {
        Step::WaitForElement { selector, timeout } => {
            steps::wait_for_element(page, selector, *timeout).await
        }
        Step::WaitForMedia { selector, timeout } => {
            steps::wait_for_media(page, selector, *timeout).await
        }
        Step::StyleOverride { selector, styles } => {
            steps::apply_styles(page, selector, styles).await
        }
        Step::SyntheticInput { actions } => {
            for action in *actions {
                match action {
                    InputAction::Click { x, y } => steps::click_at(page, *x, *y).await?,
                    InputAction::Key(name) => steps::press_key(page, name).await?,
                    InputAction::Text(text) => steps::type_text(page, text).await?,
                    InputAction::Delay(d) => sleep(*d).await,
                }
            }
            Ok(())
        }
        Step::Fullscreen => steps::trigger_fullscreen(page).await,
        Step::Sleep(d) => {
            sleep(*d).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_list(recipe: &Recipe) -> &'static [Step] {
        match &recipe.body {
            RecipeBody::Steps(steps) => *steps,
            RecipeBody::Procedural(_) => panic!("expected data-driven recipe"),
        }
    }

    #[test]
    fn unknown_alias_resolves_to_default() {
        assert_eq!(RecipeBook::resolve(Some("mystery")).name, "default");
        assert_eq!(RecipeBook::resolve(None).name, "default");
    }

    #[test]
    fn nbc_aliases_share_a_recipe() {
        assert_eq!(RecipeBook::resolve(Some("nbc")).name, "nbc");
        assert_eq!(RecipeBook::resolve(Some("cnbc")).name, "nbc");
    }

    #[test]
    fn weatherscan_has_no_wait_steps() {
        let steps = step_list(RecipeBook::resolve(Some("weatherscan")));
        assert!(steps.iter().all(|s| !s.is_wait()));
    }

    #[test]
    fn nbc_waits_for_media_readiness() {
        let steps = step_list(RecipeBook::resolve(Some("nbc")));
        assert!(steps
            .iter()
            .any(|s| matches!(s, Step::WaitForMedia { selector: "video", .. })));
    }

    #[test]
    fn every_wait_step_carries_a_timeout() {
        for recipe in [&DEFAULT_RECIPE, &NBC_RECIPE, &WEATHERSCAN_RECIPE, &WINDY_RECIPE] {
            for step in step_list(recipe) {
                match step {
                    Step::WaitForElement { timeout, .. } | Step::WaitForMedia { timeout, .. } => {
                        assert!(*timeout > Duration::ZERO, "{}", recipe.name);
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn default_recipe_forces_full_bleed_video() {
        let steps = step_list(&DEFAULT_RECIPE);
        let style = steps.iter().find_map(|s| match s {
            Step::StyleOverride { selector, styles } => Some((selector, styles)),
            _ => None,
        });
        let (selector, styles) = style.expect("default recipe styles the media element");
        assert_eq!(*selector, "video");
        assert!(styles.contains(&("position", "fixed")));
        assert!(styles.contains(&("z-index", "999000")));
        assert!(styles.contains(&("cursor", "none")));
    }

    #[test]
    fn step_descriptions_name_their_target() {
        let step = Step::WaitForMedia {
            selector: "video",
            timeout: Duration::from_secs(5),
        };
        assert_eq!(step.describe(), "wait-for-media(video)");
        assert_eq!(Step::Fullscreen.describe(), "fullscreen");
    }

    #[test]
    fn degraded_outcome_reports_step() {
        let outcome = RecipeOutcome::Degraded {
            step: "wait-for-media(video)".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(outcome.is_degraded());
        assert!(!RecipeOutcome::Completed.is_degraded());
    }
}
