//! Probe labels: names crafted to sort just after a known label so that
//! asking for them yields an NSEC denial covering the gap behind it.

/// Longest label DNS allows, in bytes.
pub const MAX_LABEL_LEN: usize = 63;

/// Derives the label to query after `seed`.
///
/// `foo` becomes `foo--`. Labels that would overflow 63 bytes are cut and
/// their last byte bumped instead, so `aaa…aa-` becomes `aaa…a0` and
/// `aaa…a9` becomes `aaa…aa`.
pub fn probe_label(seed: &str) -> String {
    let mut probe = seed.to_ascii_lowercase().into_bytes();
    probe.extend_from_slice(b"--");

    if probe.len() > MAX_LABEL_LEN {
        probe.truncate(MAX_LABEL_LEN);
        let last = &mut probe[MAX_LABEL_LEN - 1];
        *last = match *last {
            b'-' => b'0',
            b'9' => b'a',
            c => c.wrapping_add(1),
        };
    }

    match String::from_utf8(probe) {
        Ok(probe) => probe,
        // Only reachable for non-ASCII seeds cut mid character.
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn appends_dashes() {
        assert_eq!(probe_label("foo"), "foo--");
        assert_eq!(probe_label(""), "--");
        assert_eq!(probe_label("MiXeD"), "mixed--");
    }

    #[test]
    fn overflow_on_dash_becomes_zero() {
        // 62 bytes + "--" overflows; byte 63 is the first dash.
        let seed = "a".repeat(62);
        let probe = probe_label(&seed);
        assert_eq!(probe.len(), MAX_LABEL_LEN);
        assert_eq!(probe, format!("{seed}0"));
    }

    #[test]
    fn overflow_on_nine_becomes_a() {
        let seed = format!("{}9", "b".repeat(62));
        let probe = probe_label(&seed);
        assert_eq!(probe, format!("{}a", "b".repeat(62)));
    }

    #[test]
    fn overflow_on_other_increments() {
        let seed = "x".repeat(63);
        let probe = probe_label(&seed);
        assert_eq!(probe, format!("{}y", "x".repeat(62)));
        assert!(probe.as_str() > seed.as_str());
    }

    proptest! {
        #[test]
        fn short_seeds_gain_two_dashes(seed in "[a-z0-9-]{0,61}") {
            let probe = probe_label(&seed);
            prop_assert!(probe.ends_with("--"));
            prop_assert_eq!(probe.len(), seed.len() + 2);
            prop_assert!(probe > seed);
        }

        #[test]
        fn never_exceeds_label_limit(seed in "[a-z0-9-]{0,100}") {
            prop_assert!(probe_label(&seed).len() <= MAX_LABEL_LEN);
        }
    }
}
