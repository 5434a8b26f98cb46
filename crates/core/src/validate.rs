//! Admission checks for policy records.
//!
//! Field checks run only for add/update and short-circuit on the first
//! failing field, in a fixed order: user, existence, token, comment, ports,
//! domains, subdomains, expiry. Checks see trimmed values except for `user`
//! and `token`, which must already be free of whitespace.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{PolicyError, PolicyResult, ValidationField};
use crate::record::PolicyRecord;
use crate::time::RecordClock;

static USER_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_]+$").expect("static user regex"));
static TOKEN_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_!@#$%^&*()]+$").expect("static token regex"));
static COMMENT_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n\t\r]").expect("static comment regex"));
static DOMAIN_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]+(-[a-zA-Z0-9]+)*\.)+[a-zA-Z]{2,}$").expect("static domain regex")
});
static SUBDOMAIN_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]{1,20}$").expect("static subdomain regex"));
static EXPIRE_DATE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}$")
        .expect("static expire date regex")
});

/// Which admin operation a record is being admitted for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Add,
    Update,
    Remove,
    Enable,
    Disable,
}

impl OperationKind {
    /// Add/update run the full field checks; the rest only check existence.
    pub fn checks_fields(self) -> bool {
        matches!(self, OperationKind::Add | OperationKind::Update)
    }

    pub fn requires_existing(self) -> bool {
        !matches!(self, OperationKind::Add)
    }
}

/// Stateless record validator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordValidator;

impl RecordValidator {
    /// Validate `record` for `kind`, given whether its user is already stored.
    pub fn validate(record: &PolicyRecord, kind: OperationKind, exists: bool) -> PolicyResult<()> {
        if kind.checks_fields() {
            Self::check_user(record)?;
        }

        match (kind.requires_existing(), exists) {
            (false, true) => return Err(PolicyError::Conflict(record.user.clone())),
            (true, false) => return Err(PolicyError::NotFound(record.user.clone())),
            _ => {}
        }

        if kind.checks_fields() {
            Self::check_fields(record)?;
        }
        Ok(())
    }

    pub fn check_user(record: &PolicyRecord) -> PolicyResult<()> {
        if USER_FORMAT.is_match(&record.user) {
            Ok(())
        } else {
            Err(PolicyError::validation(
                ValidationField::User,
                format!("operate failed, user [{}] format error", record.user),
            ))
        }
    }

    /// Token, comment, ports, domains, subdomains and expiry, in that order.
    pub fn check_fields(record: &PolicyRecord) -> PolicyResult<()> {
        if !TOKEN_FORMAT.is_match(&record.token) {
            return Err(PolicyError::validation(
                ValidationField::Token,
                format!("operate failed, token of user [{}] format error", record.user),
            ));
        }

        let comment = record.comment.trim();
        if COMMENT_FORBIDDEN.is_match(comment) {
            return Err(PolicyError::validation(
                ValidationField::Comment,
                format!("operate failed, comment [{}] format error", record.comment),
            ));
        }

        if !record.ports.iter().all(|rule| rule.is_well_formed()) {
            let ports = serde_json::to_string(&record.ports).unwrap_or_default();
            return Err(PolicyError::validation(
                ValidationField::Ports,
                format!("operate failed, ports {ports} format error"),
            ));
        }

        if !all_blank_or_match(&record.domains, &DOMAIN_FORMAT) {
            return Err(PolicyError::validation(
                ValidationField::Domains,
                format!(
                    "operate failed, domains [{}] format error",
                    record.domains.join(",")
                ),
            ));
        }

        if !all_blank_or_match(&record.subdomains, &SUBDOMAIN_FORMAT) {
            return Err(PolicyError::validation(
                ValidationField::Subdomains,
                format!(
                    "operate failed, subdomains [{}] format error",
                    record.subdomains.join(",")
                ),
            ));
        }

        let expire_date = record.expire_date.trim();
        if !expire_date.is_empty()
            && (!EXPIRE_DATE_FORMAT.is_match(expire_date) || RecordClock::parse(expire_date).is_none())
        {
            return Err(PolicyError::validation(
                ValidationField::ExpireDate,
                format!(
                    "operate failed, expire date [{}] format error",
                    record.expire_date
                ),
            ));
        }

        Ok(())
    }
}

fn all_blank_or_match(values: &[String], format: &Regex) -> bool {
    values.iter().all(|value| {
        let value = value.trim();
        value.is_empty() || format.is_match(value)
    })
}
