//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
//! Request-to-version assignment. The bucket is derived from a SHA-256 of the
//! request id alone, so it is stable across processes and restarts.
use sha2::{Digest, Sha256};

/// Number of buckets request ids are spread over.
pub const BUCKETS: u64 = 100;

fn digest_prefix(request_id: &str) -> [u8; 8] {
    let digest = Sha256::digest(request_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    prefix
}

/// Stable bucket in `0..100` for a request id.
pub fn bucket(request_id: &str) -> u8 {
    (u64::from_be_bytes(digest_prefix(request_id)) % BUCKETS) as u8
}

/// Hex of the digest prefix the bucket is computed from, for logs.
pub fn request_fingerprint(request_id: &str) -> String {
    hex::encode(digest_prefix(request_id))
}

/// Whether `request_id` is routed to the new version when
/// `traffic_percentage` of traffic is on it. Percentages above 100 behave as 100.
pub fn should_use_new_version(traffic_percentage: u8, request_id: &str) -> bool {
    bucket(request_id) < traffic_percentage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_deterministic() {
        for id in ["req-1", "req-2", "a3f1c9", ""] {
            assert_eq!(should_use_new_version(50, id), should_use_new_version(50, id));
            assert_eq!(bucket(id), bucket(id));
        }
    }

    #[test]
    fn split_converges_to_percentage() {
        let hits = (0..100)
            .filter(|i| should_use_new_version(50, &format!("request-{i}")))
            .count();
        assert!((30..=70).contains(&hits), "got {hits} of 100");

        let hits = (0..10_000)
            .filter(|i| should_use_new_version(10, &format!("request-{i}")))
            .count();
        assert!((800..=1200).contains(&hits), "got {hits} of 10000");
    }

    #[test]
    fn boundaries_are_exclusive_and_inclusive() {
        for i in 0..200 {
            let id = format!("scan-{i}");
            assert!(!should_use_new_version(0, &id));
            assert!(should_use_new_version(100, &id));
        }
    }

    #[test]
    fn widening_traffic_never_reassigns_new_requests() {
        for i in 0..500 {
            let id = format!("user-{i}");
            if should_use_new_version(25, &id) {
                assert!(should_use_new_version(50, &id));
            }
        }
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let fingerprint = request_fingerprint("req-1");
        assert_eq!(fingerprint.len(), 16);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
