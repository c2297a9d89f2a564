//! User model for storage.

use serde::{Deserialize, Serialize};

/// Chat user bound (or not yet bound) to a portal company.
///
/// Fields added after the first release carry `#[serde(default)]` so blobs
/// written by older builds keep decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Chat identity (also used as document ID)
    pub id: i64,
    /// Phone number shared through the chat contact button
    pub phone: String,
    /// Bound company, 0 when unbound
    #[serde(default)]
    pub company_id: i64,
    /// Authenticated as the company's portal administrator
    #[serde(default)]
    pub admin: bool,
    /// Last balance the user has seen or been notified about
    #[serde(default)]
    pub last_balance: f64,
    /// Last ride id the user has been notified about
    #[serde(default)]
    pub last_ride_id: i64,
}

impl User {
    /// A freshly onboarded user with no company binding.
    pub fn new(id: i64, phone: impl Into<String>) -> Self {
        Self {
            id,
            phone: phone.into(),
            company_id: 0,
            admin: false,
            last_balance: 0.0,
            last_ride_id: 0,
        }
    }

    pub fn has_company(&self) -> bool {
        self.company_id != 0
    }

    /// Drop the company binding (sign-out of the bound company's admin).
    pub fn unbind(&mut self) {
        self.company_id = 0;
        self.admin = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_blob_written_before_watermarks() {
        let old = r#"{"id":42,"phone":"+79990000000","company_id":7,"admin":false}"#;
        let user: User = serde_json::from_str(old).unwrap();
        assert_eq!(user.company_id, 7);
        assert_eq!(user.last_balance, 0.0);
        assert_eq!(user.last_ride_id, 0);
    }

    #[test]
    fn test_unbind_clears_admin() {
        let mut user = User::new(1, "+7");
        user.company_id = 9;
        user.admin = true;
        user.unbind();
        assert!(!user.has_company());
        assert!(!user.admin);
    }
}
