use std::process::{Command, Stdio};

use tracing::{info, warn};
use url::Url;

use crate::authorization::SideEffectRequest;
use crate::metrics;

const MAPS_DIRECTIONS: &str = "https://www.google.com/maps/dir/";

/// Visible action performed for a newly sighted authorized vehicle.
pub trait RouteAction: Send {
    fn show_route(&mut self, request: &SideEffectRequest);
}

/// Directions URL from `origin` to `destination`.
pub fn directions_url(origin: &str, destination: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(MAPS_DIRECTIONS)?;
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(origin).push(destination);
    }
    Ok(url)
}

/// Opens the directions page with the desktop URL handler.
pub struct MapsRouteOpener {
    opener: String,
}

impl MapsRouteOpener {
    pub fn new(opener: Option<String>) -> Self {
        Self {
            opener: opener.unwrap_or_else(|| default_opener().to_string()),
        }
    }
}

fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    }
}

impl RouteAction for MapsRouteOpener {
    fn show_route(&mut self, request: &SideEffectRequest) {
        metrics::ROUTES.inc();
        let url = match directions_url(&request.origin, &request.destination) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build route for {}: {}", request.plate, e);
                return;
            }
        };
        info!("Showing route for {}: {}", request.plate, url);

        // The opener is not waited on.
        if let Err(e) = Command::new(&self.opener)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            warn!("Cannot launch '{}' for {}: {}", self.opener, url, e);
        }
    }
}
