//! Redirect resources
//!
//! `$redirect=` names map to small inline surrogates so a redirected
//! reference never costs an extra request.

const GIF_1X1: &str = "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";
const PNG_2X2: &str =
    "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAIAAAACCAYAAABytg0kAAAAC0lEQVR42mNgQAcAABIAAeRVjecAAAAASUVORK5CYII=";
const PNG_32X32: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAACAAAAAgCAYAAABzenr0AAAAGklEQVR42u3BAQEAAACCIP+vbkhAAQAAAO8GECAAAcm1w7EAAAAASUVORK5CYII=";

/// Resolve a redirect resource name (or absolute URL) to its target.
///
/// uBO priority suffixes (`noopjs:10`) are ignored. Returns `None` for
/// unknown names.
pub fn redirect_target(name: &str) -> Option<String> {
    let name = name.trim();
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        return Some(name.to_string());
    }

    let resource = match lower.rsplit_once(':') {
        Some((resource, priority)) if priority.bytes().all(|b| b.is_ascii_digit()) => resource,
        _ => lower.as_str(),
    };

    let target = match resource {
        "noopjs" | "noop.js" => "data:text/javascript,",
        "noopframe" | "noop.html" => "data:text/html;base64,PCFET0NUWVBFIGh0bWw+",
        "nooptext" | "noop.txt" | "empty" => "data:text/plain,",
        "1x1.gif" | "1x1-transparent.gif" => GIF_1X1,
        "2x2.png" | "2x2-transparent.png" => PNG_2X2,
        "32x32.png" | "32x32-transparent.png" => PNG_32X32,
        "noopmp3-0.1s" | "noop-0.1s.mp3" => "data:audio/mpeg;base64,",
        _ => return None,
    };
    Some(target.to_string())
}
