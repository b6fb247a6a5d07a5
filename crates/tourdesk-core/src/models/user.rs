use std::fmt;

use serde::{Deserialize, Serialize};

/// Access level of a dashboard account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Vendor,
    Admin,
}

impl Role {
    /// Whether this role satisfies a `required` role.
    /// Admins satisfy every requirement; vendors only their own.
    pub fn grants(self, required: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Vendor => required == Role::Vendor,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// The authenticated identity as returned by `/api/auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub business_type: Option<String>,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Business name if the account has one, otherwise the person's name
    pub fn display_name(&self) -> &str {
        self.business_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.full_name)
    }
}
