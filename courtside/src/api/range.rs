//! Partial-content delivery of stored media.
//!
//! Clients must send `Range: bytes=N-` and receive at most one chunk per
//! request, so a player walks the file window by window.

use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::api::error::{ApiError, ApiResult};
use crate::artifact::{ArtifactCategory, ArtifactLocator};
use crate::utils::fs::file_size;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// A parsed single `bytes=` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// Why a `Range` header was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Not a `bytes=` range or not ASCII.
    Malformed,
    /// Start or end does not fit in a u64.
    Overflow,
    /// A suffix range (`bytes=-N`); only `bytes=N-[M]` windows are served.
    Suffix,
}

/// Parse `bytes=N-[M]`.
///
/// Only the first range of a multi-range header is used. A missing start
/// means 0 unless an end is given, which makes it a suffix range; a missing
/// end leaves the window to the chunk size.
pub fn parse_range(value: &str) -> Result<ByteRange, RangeError> {
    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;
    let spec = spec.split(',').next().unwrap_or_default().trim();
    let (start, end) = spec.split_once('-').unwrap_or((spec, ""));

    let (start, end) = (parse_prefix(start)?, parse_prefix(end)?);
    if start.is_none() && end.is_some() {
        return Err(RangeError::Suffix);
    }
    Ok(ByteRange {
        start: start.unwrap_or(0),
        end,
    })
}

fn parse_prefix(part: &str) -> Result<Option<u64>, RangeError> {
    let digits = part
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    if digits.is_empty() {
        return Ok(None);
    }
    digits.parse().map(Some).map_err(|_| RangeError::Overflow)
}

/// Inclusive `[start, end]` window served for `range` on a file of `size`
/// bytes, or `None` when the start lies past the end of the file.
pub fn window(range: ByteRange, size: u64, chunk_size: u64) -> Option<(u64, u64)> {
    if range.start >= size {
        return None;
    }
    let mut end = range
        .start
        .saturating_add(chunk_size.max(1) - 1)
        .min(size - 1);
    if let Some(requested) = range.end
        && requested >= range.start
        && requested < end
    {
        end = requested;
    }
    Some((range.start, end))
}

/// Serve `category` for `stem` honouring the request's `Range` header.
///
/// `HEAD` gets the full-file headers without a body whatever its `Range`.
/// A `GET` without `Range` is rejected before the file is looked up.
pub async fn serve(
    locator: &ArtifactLocator,
    stem: &str,
    category: ArtifactCategory,
    method: &Method,
    headers: &HeaderMap,
    chunk_size: u64,
) -> ApiResult<Response> {
    let is_head = method == Method::HEAD;
    let range_header = headers.get(header::RANGE);
    if range_header.is_none() && !is_head {
        return Err(ApiError::plain(
            StatusCode::BAD_REQUEST,
            "Requires Range header",
        ));
    }

    let artifact = locator
        .locate(stem, category)
        .await
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    let size = file_size(&artifact.path).await.map_err(|e| {
        error!(path = %artifact.path.display(), error = %e, "Failed to stat video");
        ApiError::internal("Error reading video file.").with_error(e.to_string())
    })?;

    let Some(range_header) = range_header.filter(|_| !is_head) else {
        return Ok(head_response(size));
    };

    let range = range_header
        .to_str()
        .map_err(|_| RangeError::Malformed)
        .and_then(parse_range)
        .map_err(|e| {
            debug!(stem, ?e, "Rejected Range header");
            ApiError::plain(StatusCode::BAD_REQUEST, "Invalid Range header")
        })?;

    let Some((start, end)) = window(range, size, chunk_size) else {
        return Err(
            ApiError::plain(StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable")
                .with_header(header::CONTENT_RANGE, content_range_unsatisfied(size)),
        );
    };

    let len = end - start + 1;
    let body = open_window(&artifact.path, start, len).await?;

    debug!(stem, start, end, size, "Serving range");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_RANGE,
        header_value(format!("bytes {start}-{end}/{size}")),
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(VIDEO_CONTENT_TYPE),
    );

    Ok((StatusCode::PARTIAL_CONTENT, response_headers, body).into_response())
}

/// Body streaming `len` bytes of `path` from `start`. Fails before any
/// header is built if the file cannot be opened or seeked.
async fn open_window(path: &Path, start: u64, len: u64) -> ApiResult<Body> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to open video");
        ApiError::internal("Error reading video file.").with_error(e.to_string())
    })?;
    file.seek(SeekFrom::Start(start)).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to seek video");
        ApiError::internal("Error reading video file.").with_error(e.to_string())
    })?;
    Ok(Body::from_stream(ReaderStream::new(file.take(len))))
}

fn head_response(size: u64) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(VIDEO_CONTENT_TYPE),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    (StatusCode::OK, headers, Body::empty()).into_response()
}

fn content_range_unsatisfied(size: u64) -> HeaderValue {
    header_value(format!("bytes */{size}"))
}

// Built only from digits and ASCII punctuation.
fn header_value(value: String) -> HeaderValue {
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static("bytes */0"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bytes=0-", 0, None)]
    #[case("bytes=500-", 500, None)]
    #[case("bytes=10-20", 10, Some(20))]
    #[case("bytes=-", 0, None)]
    #[case("bytes=7-9, 20-30", 7, Some(9))]
    #[case(" bytes=42- ", 42, None)]
    fn test_parse_range(#[case] header: &str, #[case] start: u64, #[case] end: Option<u64>) {
        assert_eq!(parse_range(header).unwrap(), ByteRange { start, end });
    }

    #[rstest]
    #[case("items=0-", RangeError::Malformed)]
    #[case("0-100", RangeError::Malformed)]
    #[case("bytes=99999999999999999999999-", RangeError::Overflow)]
    #[case("bytes=-500", RangeError::Suffix)]
    fn test_parse_range_rejects(#[case] header: &str, #[case] expected: RangeError) {
        assert_eq!(parse_range(header).unwrap_err(), expected);
    }

    #[rstest]
    #[case(0, None, 5_000_000, Some((0, 999_999)))]
    #[case(0, None, 10, Some((0, 9)))]
    #[case(1_000_000, None, 2_500_000, Some((1_000_000, 1_999_999)))]
    #[case(2_000_000, None, 2_500_000, Some((2_000_000, 2_499_999)))]
    #[case(0, Some(99), 5_000_000, Some((0, 99)))]
    #[case(0, Some(5_000_000), 5_000_000, Some((0, 999_999)))]
    #[case(10, None, 10, None)]
    #[case(0, None, 0, None)]
    fn test_window(
        #[case] start: u64,
        #[case] end: Option<u64>,
        #[case] size: u64,
        #[case] expected: Option<(u64, u64)>,
    ) {
        assert_eq!(window(ByteRange { start, end }, size, 1_000_000), expected);
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_without_headers() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = open_window(&temp.path().join("gone.mp4"), 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Error reading video file.");
        assert!(err.error.is_some());

        let response = err.into_response();
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert!(response.headers().get(header::ACCEPT_RANGES).is_none());
    }

    #[test]
    fn test_windows_cover_file_exactly_once() {
        let size = 3_456_789;
        let mut next = 0;
        while let Some((start, end)) = window(ByteRange { start: next, end: None }, size, 1_000_000) {
            assert_eq!(start, next);
            next = end + 1;
        }
        assert_eq!(next, size);
    }
}
