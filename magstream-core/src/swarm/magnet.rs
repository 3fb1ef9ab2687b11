//! Magnet link parsing

use super::{InfoHash, SwarmError};

const BTIH_PREFIX: &str = "urn:btih:";

/// Parsed magnet link.
///
/// Keeps the original URI so engines can hand it to the transport untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Info hash from the `xt=urn:btih:` parameter
    pub info_hash: InfoHash,
    /// Optional `dn` display name
    pub display_name: Option<String>,
    /// Tracker announce URLs
    pub trackers: Vec<String>,
    /// The magnet URI as received
    pub uri: String,
}

impl MagnetLink {
    /// Parses magnet link to extract the info hash and metadata.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMagnet` - Malformed URI or missing/invalid btih hash
    pub fn parse(magnet_uri: &str) -> Result<Self, SwarmError> {
        let magnet_uri = magnet_uri.trim();
        let magnet = magnet_url::Magnet::new(magnet_uri).map_err(|e| SwarmError::InvalidMagnet {
            reason: format!("{e:?}"),
        })?;

        let info_hash = Self::extract_info_hash(magnet_uri)?;

        Ok(Self {
            info_hash,
            display_name: magnet.display_name().map(|name| name.to_string()),
            trackers: magnet
                .trackers()
                .iter()
                .map(|tracker| tracker.to_string())
                .collect(),
            uri: magnet_uri.to_string(),
        })
    }

    /// Finds the first `xt` parameter carrying a hex btih hash.
    fn extract_info_hash(magnet_uri: &str) -> Result<InfoHash, SwarmError> {
        let query = magnet_uri
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or_default();

        for param in query.split('&') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if !key.eq_ignore_ascii_case("xt") {
                continue;
            }

            let value = value.replace("%3A", ":").replace("%3a", ":");
            let is_btih = value
                .get(..BTIH_PREFIX.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(BTIH_PREFIX));
            if is_btih {
                return InfoHash::from_hex(&value[BTIH_PREFIX.len()..]);
            }
        }

        Err(SwarmError::InvalidMagnet {
            reason: format!("Missing btih info hash in magnet link: {magnet_uri}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn test_parse_magnet_link() {
        let uri = format!(
            "magnet:?xt=urn:btih:{HASH}&dn=Cosmos+Laundromat&tr=udp%3A%2F%2Fexplodie.org%3A6969"
        );
        let magnet = MagnetLink::parse(&uri).unwrap();

        assert_eq!(magnet.info_hash.to_string(), HASH);
        assert_eq!(magnet.uri, uri);
        assert_eq!(magnet.trackers.len(), 1);
    }

    #[test]
    fn test_same_hash_different_trackers_share_info_hash() {
        let first = MagnetLink::parse(&format!("magnet:?xt=urn:btih:{HASH}")).unwrap();
        let second = MagnetLink::parse(&format!(
            "magnet:?xt=urn:btih:{HASH}&tr=udp%3A%2F%2Ftracker.example.com%3A1337"
        ))
        .unwrap();

        assert_eq!(first.info_hash, second.info_hash);
        assert_ne!(first.uri, second.uri);
    }

    #[test]
    fn test_reject_missing_hash() {
        let result = MagnetLink::parse("magnet:?dn=nothing");
        assert!(matches!(result, Err(SwarmError::InvalidMagnet { .. })));
    }

    #[test]
    fn test_reject_non_magnet() {
        let result = MagnetLink::parse("https://example.com/file.torrent");
        assert!(matches!(result, Err(SwarmError::InvalidMagnet { .. })));
    }
}
