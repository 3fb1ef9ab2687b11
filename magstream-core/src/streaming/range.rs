//! HTTP Range header handling for media streaming
//!
//! Supports a single `bytes=` range in the forms `s-e`, `s-` and `-n`.
//! Headers that cannot be parsed, or that ask for several ranges, are
//! ignored and the whole file is served.

use super::StreamError;

/// Inclusive byte span within a file of `total` bytes.
///
/// Always covers at least one byte: `start <= end < total`. Empty files have
/// no `ByteRange`; see [`ByteRange::full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Span covering the whole file, or None for an empty file.
    pub fn full(total: u64) -> Option<Self> {
        (total > 0).then(|| Self {
            start: 0,
            end: total - 1,
            total,
        })
    }

    /// Number of bytes in the span, at least 1.
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Range as written by the client, before resolving against a file length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-end` or `bytes=start-`
    FromOffset { start: u64, end: Option<u64> },
    /// `bytes=-length`
    Suffix { length: u64 },
}

/// Parses a `Range` header value.
///
/// Returns None when the header is not a single well-formed byte range.
///
/// # Examples
/// ```
/// use magstream_core::streaming::range::{RangeSpec, parse_range_header};
/// let spec = parse_range_header("bytes=100-199");
/// assert_eq!(spec, Some(RangeSpec::FromOffset { start: 100, end: Some(199) }));
/// ```
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let value = value.trim();
    let (unit, spec) = value.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => None,
        (true, false) => Some(RangeSpec::Suffix {
            length: end.parse().ok()?,
        }),
        (false, true) => Some(RangeSpec::FromOffset {
            start: start.parse().ok()?,
            end: None,
        }),
        (false, false) => Some(RangeSpec::FromOffset {
            start: start.parse().ok()?,
            end: Some(end.parse().ok()?),
        }),
    }
}

/// Resolves a parsed range against a file of `total` bytes.
///
/// An end past the file is clamped to the last byte.
///
/// # Errors
/// - `StreamError::RangeNotSatisfiable` - Start at or past the end of file,
///   start after end, or an empty suffix
pub fn validate_range_bounds(spec: RangeSpec, total: u64) -> Result<ByteRange, StreamError> {
    let unsatisfiable = StreamError::RangeNotSatisfiable { length: total };

    match spec {
        RangeSpec::FromOffset { start, end } => {
            if start >= total {
                return Err(unsatisfiable);
            }
            let end = end.unwrap_or(total - 1);
            if start > end {
                return Err(unsatisfiable);
            }
            Ok(ByteRange {
                start,
                end: end.min(total - 1),
                total,
            })
        }
        RangeSpec::Suffix { length } => {
            if length == 0 || total == 0 {
                return Err(unsatisfiable);
            }
            Ok(ByteRange {
                start: total.saturating_sub(length),
                end: total - 1,
                total,
            })
        }
    }
}

/// Picks the span to serve for an optional `Range` header.
///
/// Returns `Ok(None)` when the whole file should be served with 200.
///
/// # Errors
/// - `StreamError::RangeNotSatisfiable` - Header parsed but cannot be served
pub fn select_range(header: Option<&str>, total: u64) -> Result<Option<ByteRange>, StreamError> {
    match header.and_then(parse_range_header) {
        Some(spec) => validate_range_bounds(spec, total).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn resolve(header: &str, total: u64) -> Result<Option<ByteRange>, StreamError> {
        select_range(Some(header), total)
    }

    #[test]
    fn test_parse_range_header_valid() {
        let range = resolve("bytes=100-199", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end, range.byte_count()), (100, 199, 100));
        assert_eq!(range.content_range(), "bytes 100-199/1000");
    }

    #[test]
    fn test_parse_range_header_open_end() {
        let range = resolve("bytes=500-", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end, range.byte_count()), (500, 999, 500));
        assert_eq!(range.content_range(), "bytes 500-999/1000");
    }

    #[test]
    fn test_parse_range_header_suffix() {
        let range = resolve("bytes=-100", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end), (900, 999));

        let larger_than_file = resolve("bytes=-5000", 1000).unwrap().unwrap();
        assert_eq!((larger_than_file.start, larger_than_file.end), (0, 999));
    }

    #[test]
    fn test_parse_range_header_invalid_is_ignored() {
        for header in ["invalid", "bytes=abc-def", "bytes=-", "items=0-10", "bytes=0-1,5-9"] {
            assert_eq!(resolve(header, 1000).unwrap(), None, "header {header}");
        }
        assert_eq!(select_range(None, 1000).unwrap(), None);
    }

    #[test]
    fn test_parse_range_header_tolerates_whitespace_and_case() {
        assert_eq!(
            parse_range_header(" Bytes = 10 - 20 "),
            Some(RangeSpec::FromOffset {
                start: 10,
                end: Some(20)
            })
        );
    }

    #[test]
    fn test_single_byte_ranges() {
        let first = resolve("bytes=0-0", 1000).unwrap().unwrap();
        assert_eq!(first.byte_count(), 1);
        assert_eq!(first.content_range(), "bytes 0-0/1000");

        let whole_tiny_file = ByteRange::full(1).unwrap();
        assert_eq!(whole_tiny_file.byte_count(), 1);
        assert_eq!(ByteRange::full(0), None);
    }

    #[test]
    fn test_validate_range_bounds_clamps_end() {
        let range = resolve("bytes=100-999", 500).unwrap().unwrap();
        assert_eq!((range.start, range.end, range.byte_count()), (100, 499, 400));
    }

    #[test]
    fn test_validate_range_bounds_exceeds_available() {
        let result = resolve("bytes=500-599", 400);
        assert!(matches!(
            result,
            Err(StreamError::RangeNotSatisfiable { length: 400 })
        ));
        assert!(resolve("bytes=400-", 400).is_err());
    }

    #[test]
    fn test_validate_range_bounds_reversed() {
        assert!(matches!(
            resolve("bytes=200-100", 1000),
            Err(StreamError::RangeNotSatisfiable { .. })
        ));
    }

    #[test]
    fn test_empty_file_rejects_every_range() {
        assert!(resolve("bytes=0-", 0).is_err());
        assert!(resolve("bytes=-10", 0).is_err());
        assert_eq!(ByteRange::full(0), None);
        assert!(resolve("bytes=0-0", 1).is_ok());
    }

    proptest! {
        #[test]
        fn test_resolved_range_stays_inside_file(
            total in 1u64..1_000_000,
            start in 0u64..1_200_000,
            end in proptest::option::of(0u64..1_200_000),
        ) {
            let spec = RangeSpec::FromOffset { start, end };
            match validate_range_bounds(spec, total) {
                Ok(range) => {
                    prop_assert!(range.start <= range.end);
                    prop_assert!(range.end < total);
                    prop_assert_eq!(range.start, start);
                    prop_assert_eq!(range.byte_count(), range.end - range.start + 1);
                }
                Err(_) => prop_assert!(start >= total || end.is_some_and(|end| start > end)),
            }
        }

        #[test]
        fn test_suffix_range_ends_at_last_byte(total in 1u64..1_000_000, length in 1u64..2_000_000) {
            let range = validate_range_bounds(RangeSpec::Suffix { length }, total).unwrap();
            prop_assert_eq!(range.end, total - 1);
            prop_assert_eq!(range.byte_count(), length.min(total));
        }
    }
}
