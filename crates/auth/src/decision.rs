use serde::{Deserialize, Serialize};

/// Outcome of evaluating one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Accept the operation without modifying the client's request.
    Unchanged,
    /// Deny the operation with a human-readable reason.
    Reject(String),
}

impl Decision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Decision::Unchanged)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Unchanged => None,
            Decision::Reject(reason) => Some(reason),
        }
    }
}

/// Response body of the upstream server's plugin protocol.
///
/// Exactly one of `reject` / `unchange` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResponse {
    pub reject: bool,
    #[serde(default)]
    pub reject_reason: String,
    pub unchange: bool,
}

impl From<Decision> for PluginResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Unchanged => Self {
                reject: false,
                reject_reason: String::new(),
                unchange: true,
            },
            Decision::Reject(reason) => Self {
                reject: true,
                reject_reason: reason,
                unchange: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let ok = serde_json::to_value(PluginResponse::from(Decision::Unchanged)).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"reject": false, "reject_reason": "", "unchange": true})
        );

        let denied = PluginResponse::from(Decision::reject("nope"));
        assert!(denied.reject);
        assert!(!denied.unchange);
        assert_eq!(denied.reject_reason, "nope");
    }
}
