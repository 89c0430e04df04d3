//! Turning NSEC owner/next pairs into ranges of a zone.
//!
//! Ordering is plain byte-wise comparison of lower-cased labels. That is
//! close to, but not the same as, DNSSEC canonical ordering; zones whose
//! labels sort differently under the two can derail a walk.

use std::fmt;

use regex::Regex;

use crate::error::InvalidZone;

/// A zone being walked, together with the matcher for names inside it.
#[derive(Debug, Clone)]
pub struct Zone {
    name: String,
    pattern: Regex,
}

impl Zone {
    pub fn new(name: &str) -> Result<Self, InvalidZone> {
        let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(InvalidZone(name));
        }
        let pattern = Regex::new(&format!(
            r"^(?:(?:[^.]+\.)*([^.]+)\.|){}\.*$",
            regex::escape(&name)
        ))
        .map_err(|_| InvalidZone(name.clone()))?;
        Ok(Self { name, pattern })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label directly below the apex for a name inside this zone, `""` for
    /// the apex itself, `None` for names outside the zone.
    ///
    /// Deeper names collapse onto their ancestor just below the apex.
    pub fn label_of(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let caps = self.pattern.captures(&name)?;
        Some(caps.get(1).map_or("", |m| m.as_str()).to_owned())
    }

    /// Fully qualified name for a label of this zone, without trailing dot.
    pub fn fqdn(&self, label: &str) -> String {
        if label.is_empty() {
            self.name.clone()
        } else {
            format!("{label}.{}", self.name)
        }
    }

    /// Checks an NSEC `owner`/`next` pair against `probe` and, if the
    /// record belongs to this zone and its gap contains the probe,
    /// returns the bracketing labels.
    pub fn range(&self, owner: &str, next: &str, probe: &str) -> Option<NsecRange> {
        let prev = self.label_of(owner)?;
        let next = self.label_of(next)?;

        if prev.as_str() < probe && (probe < next.as_str() || next.is_empty()) {
            Some(NsecRange { prev, next })
        } else {
            None
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A proven gap in a zone: `prev` exists, nothing exists between it and
/// `next`. An empty `next` means the chain wrapped back to the apex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsecRange {
    pub prev: String,
    pub next: String,
}

impl NsecRange {
    pub fn is_last(&self) -> bool {
        self.next.is_empty()
    }
}
