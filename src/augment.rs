// Request-derived metadata
//
// Backend agents get the caller's address as `system.ip`; browser agents
// get `user.ip` and `user.user-agent`. Values are merged into whatever the
// client sent and take precedence over it.

use crate::middleware::client_ip;
use axum::http::{header, Extensions, HeaderMap};
use serde_json::{Map, Value};

/// Which metadata block receives the request fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentTarget {
    System,
    User,
}

impl AugmentTarget {
    pub fn key(&self) -> &'static str {
        match self {
            AugmentTarget::System => "system",
            AugmentTarget::User => "user",
        }
    }
}

/// Fields captured from one request, ready to merge into its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Augmenter {
    target: Option<AugmentTarget>,
    fields: Vec<(&'static str, String)>,
}

impl Augmenter {
    /// An augmenter that leaves metadata untouched.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_request(target: AugmentTarget, headers: &HeaderMap, extensions: &Extensions) -> Self {
        let mut fields = Vec::new();
        if let Some(ip) = client_ip(headers, extensions) {
            fields.push(("ip", ip));
        }

        if target == AugmentTarget::User {
            let user_agent = headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty());
            if let Some(user_agent) = user_agent {
                fields.push(("user-agent", user_agent.to_string()));
            }
        }

        Self {
            target: Some(target),
            fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_none() || self.fields.is_empty()
    }

    /// Merge the captured fields into `metadata`.
    ///
    /// A target block of the wrong type is left alone so schema validation
    /// can report it.
    pub fn apply(&self, metadata: &mut Map<String, Value>) {
        let Some(target) = self.target else {
            return;
        };
        if self.fields.is_empty() {
            return;
        }

        let block = metadata
            .entry(target.key())
            .or_insert_with(|| Value::Object(Map::new()));
        if block.is_null() {
            *block = Value::Object(Map::new());
        }

        if let Value::Object(block) = block {
            for (key, value) in &self.fields {
                block.insert((*key).to_string(), Value::String(value.clone()));
            }
        }
    }
}
