//! Wire constants and message types shared by the relays, ingress and dispatcher.
//!
//! Two directions:
//! - **to-host**: browser (our stdin) → native messaging host (its stdin)
//! - **to-peer**: native messaging host (its stdout) → browser (our stdout)

use std::fmt;

use tokio_util::bytes::Bytes;

/// Largest payload accepted on any stream (1 MiB, the browser's own limit).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Pending messages between ingress and dispatcher.
pub const QUEUE_CAPACITY: usize = 1024;

/// Content-type marker every ingress POST must carry.
pub const FRAME_CONTENT_TYPE: &str = "application/json";

/// Routing label for a relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Destined for the native messaging host's stdin.
    ToHost,
    /// Destined for the browser, via our stdout.
    ToPeer,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToHost => "to-host",
            Self::ToPeer => "to-peer",
        }
    }

    /// Request path the ingress server serves this tag on.
    pub fn path(&self) -> &'static str {
        match self {
            Self::ToHost => "/to-host",
            Self::ToPeer => "/to-peer",
        }
    }

    /// Resolve a request path to a tag.
    ///
    /// Surrounding `/` are trimmed and the comparison ignores ASCII case and
    /// `-`/`_` separators, so `/to-host`, `/ToHost` and `/TOHOST` all match.
    /// `ToChrome` is accepted as an alias of [`Tag::ToPeer`].
    pub fn from_path(path: &str) -> Option<Self> {
        let normalized: String = path
            .trim_matches('/')
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "tohost" => Some(Self::ToHost),
            "topeer" | "tochrome" => Some(Self::ToPeer),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload accepted by the ingress server, waiting for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub payload: Bytes,
    pub tag: Tag,
}

impl QueuedMessage {
    pub fn new(tag: Tag, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            tag,
        }
    }
}

/// Returns true when a Content-Type header value carries the frame marker.
///
/// Parameters (`; charset=utf-8`) are ignored and the media type is compared
/// without regard to ASCII case.
pub fn is_frame_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case(FRAME_CONTENT_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_paths_are_case_insensitive() {
        for path in ["/ToHost", "/tohost", "/TOHOST", "/to-host", "to-host/", "//to_host//"] {
            assert_eq!(Tag::from_path(path), Some(Tag::ToHost), "path {path}");
        }
        for path in ["/to-peer", "/ToPeer", "/TOPEER", "/ToChrome"] {
            assert_eq!(Tag::from_path(path), Some(Tag::ToPeer), "path {path}");
        }
    }

    #[test]
    fn unknown_paths_have_no_tag() {
        assert_eq!(Tag::from_path("/"), None);
        assert_eq!(Tag::from_path(""), None);
        assert_eq!(Tag::from_path("/to-host/extra"), None);
        assert_eq!(Tag::from_path("/health"), None);
    }

    #[test]
    fn tag_path_resolves_to_itself() {
        assert_eq!(Tag::from_path(Tag::ToHost.path()), Some(Tag::ToHost));
        assert_eq!(Tag::from_path(Tag::ToPeer.path()), Some(Tag::ToPeer));
        assert_eq!(Tag::ToPeer.to_string(), "to-peer");
    }

    #[test]
    fn content_type_marker() {
        assert!(is_frame_content_type("application/json"));
        assert!(is_frame_content_type("Application/JSON; charset=utf-8"));
        assert!(!is_frame_content_type("text/plain"));
        assert!(!is_frame_content_type("application/jsonx"));
        assert!(!is_frame_content_type(""));
    }
}
