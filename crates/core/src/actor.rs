//! Who is acting, and how their name appears on audit entries.

use serde::{Deserialize, Serialize};

pub const UNKNOWN_OPERATOR: &str = "unknown";
pub const GUEST_OPERATOR: &str = "guest";
pub const ADMIN_OPERATOR: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    Account { uid: String, email: Option<String> },
}

impl Identity {
    /// Interpret a configured actor string.
    ///
    /// Blank means no identity, `guest`/`anonymous` an anonymous session,
    /// anything containing `@` an account with that email, and any other
    /// value an account without an email.
    pub fn from_actor(actor: &str) -> Option<Identity> {
        let actor = actor.trim();
        match actor {
            "" => None,
            "guest" | "anonymous" => Some(Identity::Anonymous),
            _ if actor.contains('@') => Some(Identity::Account {
                uid: actor.to_string(),
                email: Some(actor.to_string()),
            }),
            _ => Some(Identity::Account {
                uid: actor.to_string(),
                email: None,
            }),
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            Identity::Anonymous => GUEST_OPERATOR,
            Identity::Account { uid, .. } => uid,
        }
    }
}

/// Display name stamped on audit entries: the local part of an email,
/// `guest` for anonymous sessions, `unknown` without identity and `admin`
/// for accounts that have no email.
pub fn operator_name(identity: Option<&Identity>) -> String {
    match identity {
        None => UNKNOWN_OPERATOR.to_string(),
        Some(Identity::Anonymous) => GUEST_OPERATOR.to_string(),
        Some(Identity::Account {
            email: Some(email), ..
        }) => email.split('@').next().unwrap_or_default().to_string(),
        Some(Identity::Account { email: None, .. }) => ADMIN_OPERATOR.to_string(),
    }
}
