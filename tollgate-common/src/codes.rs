use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Reason code attached to a denied access decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessCode {
    IpLimitExceeded,
    IpBlacklisted,
    GeoRestricted,
    SubscriptionIpLimit,
}

impl AccessCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpLimitExceeded => "IP_LIMIT_EXCEEDED",
            Self::IpBlacklisted => "IP_BLACKLISTED",
            Self::GeoRestricted => "GEO_RESTRICTED",
            Self::SubscriptionIpLimit => "SUBSCRIPTION_IP_LIMIT",
        }
    }
}

impl Display for AccessCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an access check. A denial is a normal value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResult {
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<AccessCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_slots: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub online_ips: Vec<String>,
}

impl AccessResult {
    pub fn allow<R: Into<String>>(reason: R) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            code: None,
            remaining_slots: None,
            online_ips: vec![],
        }
    }

    pub fn deny<R: Into<String>>(code: AccessCode, reason: R) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            code: Some(code),
            remaining_slots: None,
            online_ips: vec![],
        }
    }

    #[must_use]
    pub fn with_remaining_slots(mut self, slots: u32) -> Self {
        self.remaining_slots = Some(slots);
        self
    }

    #[must_use]
    pub fn with_online_ips(mut self, ips: Vec<String>) -> Self {
        self.online_ips = ips;
        self
    }
}
