//! Port allowances of a policy record.
//!
//! On the wire (and in the store) a port entry is either a JSON number or a
//! string holding a single port or a `"<start>-<end>"` range. Entries are
//! parsed once, when a record is decoded, into a [`PortRule`]; decisions never
//! re-parse text.

use serde::{Deserialize, Serialize};

const MAX_PORT: u32 = 65_535;

/// Why a stored port entry could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortFormatError {
    /// A range did not split into exactly two parts.
    RangeShape { raw: String },
    /// The start of a range is not a number.
    RangeStart { raw: String, start: String },
    /// The end of a range is not a number.
    RangeEnd { raw: String, end: String },
    /// A single port is not a number.
    NotANumber { raw: String },
}

impl PortFormatError {
    /// The original text of the entry.
    pub fn raw(&self) -> &str {
        match self {
            PortFormatError::RangeShape { raw }
            | PortFormatError::RangeStart { raw, .. }
            | PortFormatError::RangeEnd { raw, .. }
            | PortFormatError::NotANumber { raw } => raw,
        }
    }

    /// Human-readable rejection reason for `user`.
    pub fn describe(&self, user: &str) -> String {
        match self {
            PortFormatError::RangeShape { raw } => {
                format!("user [{user}] port range [{raw}] format error")
            }
            PortFormatError::RangeStart { raw, start } => format!(
                "user [{user}] port range [{raw}] start port [{start}] is not a number"
            ),
            PortFormatError::RangeEnd { raw, end } => {
                format!("user [{user}] port range [{raw}] end port [{end}] is not a number")
            }
            PortFormatError::NotANumber { raw } => {
                format!("user [{user}] allowed port [{raw}] is not a number")
            }
        }
    }
}

/// One parsed entry of a record's `ports` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PortEntry", into = "PortEntry")]
pub enum PortRule {
    /// Empty-string entry: every port is allowed.
    Unrestricted,
    /// A single port.
    Exact(u32),
    /// An inclusive range.
    Range { start: u32, end: u32 },
    /// Malformed stored data. Scanning stops here.
    Invalid(PortFormatError),
}

/// Raw wire shape of a port entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PortEntry {
    Number(u64),
    Text(String),
}

impl From<PortEntry> for PortRule {
    fn from(entry: PortEntry) -> Self {
        match entry {
            PortEntry::Number(n) => match u32::try_from(n) {
                Ok(port) => PortRule::Exact(port),
                Err(_) => PortRule::Invalid(PortFormatError::NotANumber { raw: n.to_string() }),
            },
            PortEntry::Text(text) => PortRule::parse(&text),
        }
    }
}

impl From<PortRule> for PortEntry {
    fn from(rule: PortRule) -> Self {
        match rule {
            PortRule::Unrestricted => PortEntry::Text(String::new()),
            PortRule::Exact(port) => PortEntry::Number(u64::from(port)),
            PortRule::Range { start, end } => PortEntry::Text(format!("{start}-{end}")),
            PortRule::Invalid(err) => PortEntry::Text(err.raw().to_string()),
        }
    }
}

fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl PortRule {
    /// Parse the textual form of an entry (surrounding whitespace ignored).
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return PortRule::Unrestricted;
        }

        if trimmed.contains('-') {
            let parts: Vec<&str> = trimmed.split('-').collect();
            if parts.len() != 2 {
                return PortRule::Invalid(PortFormatError::RangeShape {
                    raw: trimmed.to_string(),
                });
            }
            let Some(start) = parse_number(parts[0]) else {
                return PortRule::Invalid(PortFormatError::RangeStart {
                    raw: trimmed.to_string(),
                    start: parts[0].trim().to_string(),
                });
            };
            let Some(end) = parse_number(parts[1]) else {
                return PortRule::Invalid(PortFormatError::RangeEnd {
                    raw: trimmed.to_string(),
                    end: parts[1].trim().to_string(),
                });
            };
            return PortRule::Range { start, end };
        }

        match parse_number(trimmed) {
            Some(port) => PortRule::Exact(port),
            None => PortRule::Invalid(PortFormatError::NotANumber {
                raw: trimmed.to_string(),
            }),
        }
    }

    /// Whether this entry passes the admission format check.
    pub fn is_well_formed(&self) -> bool {
        let in_range = |p: u32| (1..=MAX_PORT).contains(&p);
        match self {
            PortRule::Unrestricted => true,
            PortRule::Exact(port) => in_range(*port),
            PortRule::Range { start, end } => in_range(*start) && in_range(*end),
            PortRule::Invalid(_) => false,
        }
    }

    /// Highest port this entry names, if any.
    pub fn upper_bound(&self) -> Option<u32> {
        match self {
            PortRule::Exact(port) => Some(*port),
            PortRule::Range { end, .. } => Some(*end),
            PortRule::Unrestricted | PortRule::Invalid(_) => None,
        }
    }

    /// Scan a `ports` list for `port`.
    ///
    /// An empty list places no restriction. Scanning stops at the first entry
    /// that allows the port, or at the first malformed entry, which is
    /// returned as the error and leaves the port not allowed.
    pub fn scan(rules: &[PortRule], port: u32) -> Result<bool, &PortFormatError> {
        if rules.is_empty() {
            return Ok(true);
        }
        for rule in rules {
            match rule {
                PortRule::Unrestricted => return Ok(true),
                PortRule::Exact(allowed) if *allowed == port => return Ok(true),
                PortRule::Range { start, end } if *start <= port && port <= *end => {
                    return Ok(true);
                }
                PortRule::Invalid(err) => return Err(err),
                _ => {}
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rules(json: &str) -> Vec<PortRule> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_numbers_strings_and_ranges() {
        let parsed = rules(r#"[8080, "9000", " 10000 - 10100 ", ""]"#);
        assert_eq!(
            parsed,
            vec![
                PortRule::Exact(8080),
                PortRule::Exact(9000),
                PortRule::Range {
                    start: 10000,
                    end: 10100
                },
                PortRule::Unrestricted,
            ]
        );
    }

    #[test]
    fn malformed_entries_are_kept_as_invalid() {
        assert!(matches!(
            PortRule::parse("1-2-3"),
            PortRule::Invalid(PortFormatError::RangeShape { .. })
        ));
        assert!(matches!(
            PortRule::parse("a-20"),
            PortRule::Invalid(PortFormatError::RangeStart { .. })
        ));
        assert!(matches!(
            PortRule::parse("20-b"),
            PortRule::Invalid(PortFormatError::RangeEnd { .. })
        ));
        assert!(matches!(
            PortRule::parse("+80"),
            PortRule::Invalid(PortFormatError::NotANumber { .. })
        ));
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let json = serde_json::to_string(&rules(r#"[80, "1-2", "", "x"]"#)).unwrap();
        assert_eq!(json, r#"[80,"1-2","","x"]"#);
    }

    #[test]
    fn range_scan_is_inclusive() {
        let list = rules(r#"["8000-9000"]"#);
        assert_eq!(PortRule::scan(&list, 8000), Ok(true));
        assert_eq!(PortRule::scan(&list, 8500), Ok(true));
        assert_eq!(PortRule::scan(&list, 9000), Ok(true));
        assert_eq!(PortRule::scan(&list, 9500), Ok(false));
    }

    #[test]
    fn scan_stops_at_first_malformed_entry() {
        let list = rules(r#"["abc", 7000]"#);
        let err = PortRule::scan(&list, 7000).unwrap_err();
        assert_eq!(
            err.describe("bob"),
            "user [bob] allowed port [abc] is not a number"
        );

        // An allowing entry before the malformed one still wins.
        let list = rules(r#"[7000, "abc"]"#);
        assert_eq!(PortRule::scan(&list, 7000), Ok(true));
    }

    #[test]
    fn empty_string_entry_short_circuits() {
        let list = rules(r#"[1, "", "broken-"]"#);
        assert_eq!(PortRule::scan(&list, 4242), Ok(true));
    }

    #[test]
    fn well_formed_bounds() {
        assert!(PortRule::Exact(65535).is_well_formed());
        assert!(!PortRule::Exact(0).is_well_formed());
        assert!(!PortRule::Exact(70000).is_well_formed());
        assert!(!PortRule::parse("x").is_well_formed());
        assert!(PortRule::Unrestricted.is_well_formed());
    }

    proptest! {
        #[test]
        fn empty_list_allows_any_port(port in 0u32..=65535) {
            prop_assert_eq!(PortRule::scan(&[], port), Ok(true));
        }

        #[test]
        fn range_membership_matches_bounds(start in 1u32..30000, len in 0u32..30000, port in 1u32..=65535) {
            let end = start + len;
            let list = vec![PortRule::Range { start, end }];
            prop_assert_eq!(PortRule::scan(&list, port), Ok(start <= port && port <= end));
        }
    }
}
