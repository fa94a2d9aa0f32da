//! Whitelist membership checks, matching the original broker's linear
//! scan over a small, hand-curated table of device prefixes.

use shmif_config::{DeviceMode, WhitelistEntry};

/// Dumb traversal safeguard matching `access_device()`'s prefix check:
/// every byte of a prefix-matched path must be printable ASCII and `.`
/// is rejected outright, so `/dev/input/../../etc/shadow` never passes
/// even though it starts with a whitelisted prefix.
fn is_traversal_safe(path: &str) -> bool {
    path.bytes().all(|b| b.is_ascii_graphic() || b == b' ') && !path.contains('.')
}

/// Returns the granted mode if `path` is covered by `entries`, checking
/// exact matches before prefix matches so a more specific entry always
/// wins over a broader one that happens to come first in the table.
/// Prefix-matched paths are additionally subjected to the traversal
/// safeguard; exact matches need no such check since they must equal the
/// whitelisted path verbatim.
pub fn resolve<'a>(entries: &'a [WhitelistEntry], path: &str) -> Option<&'a WhitelistEntry> {
    entries
        .iter()
        .find(|e| e.mode == DeviceMode::Exact && e.path == path)
        .or_else(|| {
            entries.iter().find(|e| {
                e.mode != DeviceMode::Exact && path.starts_with(e.path.as_str()) && is_traversal_safe(path)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<WhitelistEntry> {
        vec![
            WhitelistEntry { path: "/dev/input/".into(), mode: DeviceMode::Prefix },
            WhitelistEntry { path: "/dev/dri/".into(), mode: DeviceMode::Drm },
        ]
    }

    #[test]
    fn matches_prefix() {
        let e = entries();
        let hit = resolve(&e, "/dev/input/event3").unwrap();
        assert_eq!(hit.mode, DeviceMode::Prefix);
    }

    #[test]
    fn rejects_path_outside_whitelist() {
        let e = entries();
        assert!(resolve(&e, "/etc/shadow").is_none());
    }

    #[test]
    fn drm_prefix_grants_drm_mode() {
        let e = entries();
        let hit = resolve(&e, "/dev/dri/card0").unwrap();
        assert_eq!(hit.mode, DeviceMode::Drm);
    }

    #[test]
    fn rejects_dot_dot_traversal_under_a_whitelisted_prefix() {
        let e = entries();
        assert!(resolve(&e, "/dev/input/../../etc/shadow").is_none());
    }

    #[test]
    fn rejects_non_printable_bytes_under_a_whitelisted_prefix() {
        let e = entries();
        assert!(resolve(&e, "/dev/input/ev\x01ent3").is_none());
    }
}
