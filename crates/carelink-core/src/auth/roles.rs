use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Portal roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Patient = 1,
    Doctor = 2,
    Admin = 3,
    SuperAdmin = 4,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Patient, Role::Doctor, Role::Admin, Role::SuperAdmin];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Whether a holder of `self` may do something that requires `required`.
    pub fn has_access(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// Rank of a role name; unknown names rank 0.
pub fn role_rank(role: &str) -> u8 {
    role.parse::<Role>().map(Role::rank).unwrap_or(0)
}

/// `true` when `actual` ranks at least as high as `required`.
///
/// Unknown names on either side deny access.
pub fn has_access(required: &str, actual: &str) -> bool {
    let required = role_rank(required);
    required > 0 && role_rank(actual) >= required
}
