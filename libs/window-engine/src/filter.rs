//! Attribute filter over decoded user records.
//!
//! Every supplied criterion must hold (AND); an absent criterion places no
//! constraint. Identifiers live in union-encoded fields (`{"long": 42}`,
//! `{"string": "srv"}`) under fixed payload paths. A path that does not
//! resolve is a non-match, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use window_api::{resolve_path, UserRecord};

// ═══════════════════════════════════════════════════════════════
//  Union values
// ═══════════════════════════════════════════════════════════════

/// Значение union-поля после классификации.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionValue<'a> {
    Long(i64),
    Str(&'a str),
    /// Missing, `null`, or any other shape.
    Absent,
}

impl<'a> UnionValue<'a> {
    pub fn classify(value: Option<&'a Value>) -> Self {
        let Some(obj) = value.and_then(Value::as_object) else {
            return UnionValue::Absent;
        };
        if obj.len() != 1 {
            return UnionValue::Absent;
        }
        if let Some(n) = obj.get("long").and_then(Value::as_i64) {
            return UnionValue::Long(n);
        }
        if let Some(s) = obj.get("string").and_then(Value::as_str) {
            return UnionValue::Str(s);
        }
        UnionValue::Absent
    }

    pub fn as_long(self) -> Option<i64> {
        match self {
            UnionValue::Long(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(self) -> Option<&'a str> {
        match self {
            UnionValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Identifier paths
// ═══════════════════════════════════════════════════════════════

const CONTACT_EVENT: &str = "com.incontact.datainfra.events.ContactEvent";
const AGENT_EVENT: &str = "com.incontact.datainfra.events.AgentEvent";

/// Object holding an identifier plus the keys of its primary and alternate
/// union fields.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierPath {
    pub base: &'static [&'static str],
    pub primary: &'static str,
    pub alt: &'static str,
}

impl IdentifierPath {
    pub const CONTACT_ID: Self = Self {
        base: &["baseEventData", CONTACT_EVENT, "mediaScopeIdentification", "contactIdentification"],
        primary: "contactId",
        alt: "contactIdAlt",
    };

    pub const AGENT_ID: Self = Self {
        base: &["baseEventData", AGENT_EVENT, "agentShiftIdentification", "agentIdentification"],
        primary: "agentId",
        alt: "agentIdAlt",
    };

    pub const AGENT_SHIFT_ID: Self = Self {
        base: &["baseEventData", AGENT_EVENT, "agentShiftIdentification"],
        primary: "agentShiftId",
        alt: "agentShiftIdAlt",
    };

    pub const TENANT_ID: Self = Self {
        base: &["tenantId"],
        primary: "tenantId",
        alt: "tenantIdAlt",
    };

    /// True when either the primary or the alternate field is `{"long": expected}`.
    fn long_matches(&self, payload: &Value, expected: i64) -> bool {
        let Some(base) = resolve_path(payload, self.base) else {
            return false;
        };
        [self.primary, self.alt]
            .into_iter()
            .any(|key| UnionValue::classify(base.get(key)).as_long() == Some(expected))
    }
}

const SERVER_NAME_PATH: &[&str] = &["tenantId", "serverName"];

// ═══════════════════════════════════════════════════════════════
//  Criteria
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Criteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_shift_id: Option<i64>,
}

impl Criteria {
    pub fn is_empty(&self) -> bool {
        self.contact_id.is_none()
            && self.agent_id.is_none()
            && self.server_name.is_none()
            && self.tenant_id.is_none()
            && self.agent_shift_id.is_none()
    }

    pub fn matches(&self, record: &UserRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        // Sentinel payloads carry no attributes.
        let Some(payload) = record.payload.as_json() else {
            return false;
        };

        self.contact_id
            .is_none_or(|id| IdentifierPath::CONTACT_ID.long_matches(payload, id))
            && self
                .agent_id
                .is_none_or(|id| IdentifierPath::AGENT_ID.long_matches(payload, id))
            && self
                .agent_shift_id
                .is_none_or(|id| IdentifierPath::AGENT_SHIFT_ID.long_matches(payload, id))
            && self
                .tenant_id
                .is_none_or(|id| IdentifierPath::TENANT_ID.long_matches(payload, id))
            && self.server_name.as_deref().is_none_or(|expected| {
                UnionValue::classify(resolve_path(payload, SERVER_NAME_PATH))
                    .as_str()
                    .is_some_and(|actual| actual.to_lowercase() == expected.to_lowercase())
            })
    }
}
