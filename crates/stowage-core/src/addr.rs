//! Item URLs: building them from path segments and taking them apart again.

use url::Url;

use crate::error::{Error, Result};

/// Append `segments` to the path of `base`. Empty segments are skipped, so a
/// base ending in `/` does not produce a double slash.
pub fn join_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        for segment in segments {
            if !segment.is_empty() {
                path.push(segment);
            }
        }
    }
    url
}

/// Percent-decoded, non-empty path segments of `url`.
pub fn decoded_segments(url: &Url) -> Result<Vec<String>> {
    let segments = url
        .path_segments()
        .ok_or_else(|| Error::InvalidArgument(format!("{url} has no path")))?;
    segments
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .map_err(|e| Error::InvalidArgument(format!("{url}: {e}")))
        })
        .collect()
}

/// Check that `url` uses `scheme`.
pub fn expect_scheme(url: &Url, scheme: &str) -> Result<()> {
    if url.scheme() != scheme {
        return Err(Error::InvalidArgument(format!(
            "expected a {scheme}:// URL, got {url}"
        )));
    }
    Ok(())
}
