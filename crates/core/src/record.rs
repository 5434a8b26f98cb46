//! Per-user policy record and the listing filter.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ports::PortRule;
use crate::time::RecordClock;

/// Authorization profile of one proxy client user.
///
/// JSON field names follow the admin wire format (`enable`, `create_date`,
/// `expire_date`). `server` is written as `""` when no affinity is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub comment: String,

    /// Empty list: no port restriction.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ports: Vec<PortRule>,

    /// Empty list or an `""` entry: no domain restriction.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub domains: Vec<String>,

    /// Empty list or an `""` entry: no subdomain restriction.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subdomains: Vec<String>,

    #[serde(rename = "enable", default = "enabled_by_default")]
    pub enabled: bool,

    /// Name of the upstream server this user is bound to.
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        serialize_with = "none_as_blank"
    )]
    pub server: Option<String>,

    #[serde(default)]
    pub create_date: String,

    /// Empty: never expires.
    #[serde(default)]
    pub expire_date: String,
}

fn enabled_by_default() -> bool {
    true
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn none_as_blank<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

impl PolicyRecord {
    /// An enabled record with no restrictions.
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
            comment: String::new(),
            ports: Vec::new(),
            domains: Vec::new(),
            subdomains: Vec::new(),
            enabled: true,
            server: None,
            create_date: String::new(),
            expire_date: String::new(),
        }
    }

    /// Trim whitespace from every string field.
    ///
    /// Port entries are already trimmed when parsed.
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.user);
        trim_in_place(&mut self.token);
        trim_in_place(&mut self.comment);
        for domain in &mut self.domains {
            trim_in_place(domain);
        }
        for subdomain in &mut self.subdomains {
            trim_in_place(subdomain);
        }
        self.server = self
            .server
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        trim_in_place(&mut self.create_date);
        trim_in_place(&mut self.expire_date);
    }

    /// Parsed expiry, `None` when unset or unparseable.
    pub fn expires_at(&self) -> Option<NaiveDateTime> {
        if self.expire_date.trim().is_empty() {
            return None;
        }
        RecordClock::parse(&self.expire_date)
    }

    /// Whether the record is past its expiry at `now`.
    ///
    /// An unparseable expiry never expires.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at().is_some_and(|expiry| now > expiry)
    }

    /// Highest port referenced by this record's rules.
    pub fn max_port(&self) -> Option<u32> {
        self.ports.iter().filter_map(PortRule::upper_bound).max()
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

/// Substring filter used by record listings.
///
/// All whitespace is stripped from each term first; an empty term matches
/// everything. `server`, when set, must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub server: String,
}

fn strip_whitespace(term: &str) -> String {
    term.chars().filter(|c| !c.is_whitespace()).collect()
}

fn contains_term(field: &str, term: &str) -> bool {
    let term = strip_whitespace(term);
    term.is_empty() || field.contains(&term)
}

impl RecordFilter {
    pub fn matches(&self, record: &PolicyRecord) -> bool {
        let server = self.server.trim();
        if !server.is_empty() && record.server.as_deref() != Some(server) {
            return false;
        }

        contains_term(&record.user, &self.user)
            && contains_term(&record.token, &self.token)
            && contains_term(&record.comment, &self.comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn decodes_admin_payload_with_defaults() {
        let record: PolicyRecord = serde_json::from_str(
            r#"{"user":"alice","token":"s3cret","ports":[22,"8000-9000"],"domains":null,"server":""}"#,
        )
        .unwrap();

        assert!(record.enabled);
        assert!(record.domains.is_empty());
        assert_eq!(record.server, None);
        assert_eq!(record.ports.len(), 2);
    }

    #[test]
    fn encodes_missing_server_as_blank() {
        let value = serde_json::to_value(PolicyRecord::new("bob", "t")).unwrap();
        assert_eq!(value["server"], "");
        assert_eq!(value["enable"], true);
        assert_eq!(value["ports"], serde_json::json!([]));
    }

    #[test]
    fn normalize_trims_every_field() {
        let mut record = PolicyRecord::new("bob", "t");
        record.comment = "  hello ".into();
        record.domains = vec![" a.example.com ".into()];
        record.subdomains = vec![" web".into()];
        record.server = Some("  ".into());
        record.expire_date = " 2030-01-01 00:00:00 ".into();

        record.normalize();

        assert_eq!(record.comment, "hello");
        assert_eq!(record.domains, vec!["a.example.com"]);
        assert_eq!(record.subdomains, vec!["web"]);
        assert_eq!(record.server, None);
        assert_eq!(record.expire_date, "2030-01-01 00:00:00");
    }

    #[test]
    fn expiry_is_strictly_after() {
        let mut record = PolicyRecord::new("bob", "t");
        let at = |h| {
            NaiveDate::from_ymd_opt(2030, 1, 1)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };

        assert!(!record.is_expired_at(at(12)));

        record.expire_date = "2030-01-01 10:00:00".into();
        assert!(!record.is_expired_at(at(10)));
        assert!(record.is_expired_at(at(11)));

        record.expire_date = "garbage".into();
        assert!(!record.is_expired_at(at(23)));
    }

    #[test]
    fn filter_strips_whitespace_and_matches_substrings() {
        let mut record = PolicyRecord::new("alice_ops", "tok123");
        record.comment = "team-a".into();
        record.server = Some("edge-1".into());

        assert!(RecordFilter::default().matches(&record));
        assert!(
            RecordFilter {
                user: " ali ce ".into(),
                ..Default::default()
            }
            .matches(&record)
        );
        assert!(
            !RecordFilter {
                token: "999".into(),
                ..Default::default()
            }
            .matches(&record)
        );
        assert!(
            RecordFilter {
                server: "edge-1".into(),
                ..Default::default()
            }
            .matches(&record)
        );
        assert!(
            !RecordFilter {
                server: "edge".into(),
                ..Default::default()
            }
            .matches(&record)
        );
    }

    #[test]
    fn max_port_considers_range_ends() {
        let mut record = PolicyRecord::new("bob", "t");
        record.ports = serde_json::from_str(r#"[443, "10000-10200", "", "bad"]"#).unwrap();
        assert_eq!(record.max_port(), Some(10200));
        assert_eq!(PolicyRecord::new("x", "y").max_port(), None);
    }
}
