//! Role resolution for a (user, company) pair.
//!
//! Pure evaluation over already-loaded data; refreshing the roster is the
//! caller's job.

use crate::models::{Company, User};
use std::fmt;

/// Access level of a user within a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Employee,
    None,
}

impl Role {
    pub fn has_access(self) -> bool {
        !matches!(self, Role::None)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::None => "none",
        };
        f.write_str(name)
    }
}

/// Reduce a phone number to its digits so formatting differences don't
/// matter (`+7 (999) 000-00-00` == `79990000000`).
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// True when `phone` appears in the company roster.
pub fn roster_contains(company: &Company, phone: &str) -> bool {
    let wanted = normalize_phone(phone);
    !wanted.is_empty()
        && company
            .employees
            .iter()
            .any(|candidate| normalize_phone(candidate) == wanted)
}

/// Compute the role of `user` in `company`.
pub fn resolve(user: &User, company: &Company) -> Role {
    if user.admin && user.company_id == company.id {
        return Role::Admin;
    }
    if roster_contains(company, &user.phone) {
        return Role::Employee;
    }
    Role::None
}
