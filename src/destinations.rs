//! Destination catalog: short aliases mapping to a target URL, an automation
//! recipe key and a default wait policy. The same alias selects both the URL
//! and the recipe, and the catalog doubles as the playlist source.

use url::Url;

use crate::error::{PagecastError, Result};

#[derive(Debug, Clone)]
pub struct Destination {
    pub alias: &'static str,
    pub title: &'static str,
    pub url: &'static str,
    /// Whether to run "wait for media readiness" recipe steps by default.
    /// Full-bleed pages (radar maps, dashboards) have no media element to
    /// wait on.
    pub wait_for_media: bool,
}

const CATALOG: &[Destination] = &[
    Destination {
        alias: "weatherscan",
        title: "Weatherscan Local",
        url: "https://weatherscan.net/",
        wait_for_media: false,
    },
    Destination {
        alias: "windy",
        title: "Windy Radar",
        url: "https://www.windy.com/-Weather-radar-radar",
        wait_for_media: false,
    },
    Destination {
        alias: "nbc",
        title: "NBC News Now",
        url: "https://www.nbc.com/live?brand=nbc-news&callsign=nbcnews",
        wait_for_media: true,
    },
    Destination {
        alias: "cnbc",
        title: "CNBC Live",
        url: "https://www.nbc.com/live?brand=cnbc&callsign=cnbc",
        wait_for_media: true,
    },
    Destination {
        alias: "frndly",
        title: "Frndly TV",
        url: "https://watch.frndlytv.com/",
        wait_for_media: true,
    },
];

pub fn all() -> &'static [Destination] {
    CATALOG
}

pub fn find(alias: &str) -> Option<&'static Destination> {
    CATALOG
        .iter()
        .find(|d| d.alias.eq_ignore_ascii_case(alias))
}

/// Resolve a destination alias to its target URL, or fall back to a literal
/// URL parameter. Aliases win so playlist entries stay stable even when a
/// caller also passes `url`.
pub fn resolve_target(alias: Option<&str>, url_param: Option<&str>) -> Result<Url> {
    if let Some(name) = alias {
        let dest = find(name)
            .ok_or_else(|| PagecastError::UnknownDestination(name.to_string()))?;
        return Ok(Url::parse(dest.url)?);
    }
    let raw = url_param.ok_or_else(|| {
        PagecastError::Config("missing url parameter and no destination alias".to_string())
    })?;
    let parsed = Url::parse(raw)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(PagecastError::Config(format!(
            "unsupported URL scheme '{}', only http/https allowed",
            scheme
        ))),
    }
}
