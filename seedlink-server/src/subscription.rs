//! Station scope and SELECT pattern matching.
//!
//! Pattern format: `[!]<station-glob>[.<type>]`
//! - `*` matches any run of characters, `?` a single character
//! - `.T` restricts to records whose format or subformat code is `T`
//! - a leading `!` excludes whatever the rest of the pattern matches

use seedlink4_protocol::{PayloadFormat, PayloadSubformat};

use crate::identity::StationKey;

/// A parsed SELECT pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Selector {
    negated: bool,
    station: String,
    type_code: Option<u8>,
}

impl Selector {
    pub fn parse(pattern: &str) -> Option<Self> {
        let (negated, rest) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };

        let (station, type_code) = match rest.split_once('.') {
            Some((station, code)) => {
                let &[c] = code.as_bytes() else {
                    return None;
                };
                if !c.is_ascii_alphanumeric() {
                    return None;
                }
                (station, Some(c))
            }
            None => (rest, None),
        };

        if !station
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'*' | b'?' | b'-'))
        {
            return None;
        }
        if station.is_empty() && type_code.is_none() {
            return None;
        }

        Some(Self {
            negated,
            station: if station.is_empty() { "*".to_owned() } else { station.to_owned() },
            type_code,
        })
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Match ignoring negation.
    fn hits(
        &self,
        station: &str,
        format: PayloadFormat,
        subformat: Option<PayloadSubformat>,
    ) -> bool {
        if !glob_match(&self.station, station) {
            return false;
        }
        match self.type_code {
            None => true,
            Some(code) => {
                code == format.to_byte() || subformat.is_some_and(|s| s.to_byte() == code)
            }
        }
    }
}

/// The scope set by `STATION` plus the selectors added under it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Subscription {
    station: String,
    network: String,
    selectors: Vec<Selector>,
}

impl Subscription {
    pub fn new(station: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            network: network.into(),
            selectors: Vec::new(),
        }
    }

    pub fn add_selector(&mut self, selector: Selector) {
        self.selectors.push(selector);
    }

    /// Positive selectors form a union; any matching negative selector excludes.
    /// Without positive selectors everything in scope that is not excluded matches.
    pub fn matches(
        &self,
        key: &StationKey,
        format: PayloadFormat,
        subformat: Option<PayloadSubformat>,
    ) -> bool {
        if !glob_match(&self.network, &key.network) || !glob_match(&self.station, &key.station) {
            return false;
        }

        let mut any_positive = false;
        let mut positive_hit = false;
        for selector in &self.selectors {
            let hit = selector.hits(&key.station, format, subformat);
            if selector.is_negated() {
                if hit {
                    return false;
                }
            } else {
                any_positive = true;
                positive_hit |= hit;
            }
        }
        !any_positive || positive_hit
    }
}

/// Glob match with `*` and `?`. Case-sensitive.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let (p, t) = (pattern.as_bytes(), text.as_bytes());
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some(b'*') => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == b'?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ti = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}
