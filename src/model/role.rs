use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Capabilities that gate the attendance and overtime workflows.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Superadmin,
    HrdManager,
    HrdTimekeeper,
    DepartmentManager,
    Regular,
}

impl Role {
    pub fn from_name(name: &str) -> Option<Self> {
        name.trim().to_lowercase().parse().ok()
    }
}
