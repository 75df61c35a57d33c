use serde::{Deserialize, Serialize};

use eventhire_core::DomainError;

/// Staff role assigned to an employee profile.
///
/// Roles describe the job function; access rights derive from the access
/// group, not from the role directly (see [`crate::groups`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Administrator,
    Clerk,
    Driver,
    Loader,
    Supervisor,
    Cleaning,
    Laundry,
    Cashier,
}

impl StaffRole {
    pub const ALL: [StaffRole; 8] = [
        StaffRole::Administrator,
        StaffRole::Clerk,
        StaffRole::Driver,
        StaffRole::Loader,
        StaffRole::Supervisor,
        StaffRole::Cleaning,
        StaffRole::Laundry,
        StaffRole::Cashier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Administrator => "administrator",
            StaffRole::Clerk => "clerk",
            StaffRole::Driver => "driver",
            StaffRole::Loader => "loader",
            StaffRole::Supervisor => "supervisor",
            StaffRole::Cleaning => "cleaning",
            StaffRole::Laundry => "laundry",
            StaffRole::Cashier => "cashier",
        }
    }

    /// Roles that carry administrative responsibility on their own.
    pub fn is_administrative(&self) -> bool {
        matches!(self, StaffRole::Administrator)
    }
}

impl core::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for StaffRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(StaffRole::Administrator),
            "clerk" => Ok(StaffRole::Clerk),
            "driver" => Ok(StaffRole::Driver),
            "loader" => Ok(StaffRole::Loader),
            "supervisor" => Ok(StaffRole::Supervisor),
            "cleaning" => Ok(StaffRole::Cleaning),
            "laundry" => Ok(StaffRole::Laundry),
            "cashier" => Ok(StaffRole::Cashier),
            other => Err(DomainError::validation(format!("unknown staff role: {other}"))),
        }
    }
}
