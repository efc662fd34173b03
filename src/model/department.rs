use serde::{Deserialize, Serialize};

/// A user allowed to act as department-level approver for `department`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DepartmentManagerAssignment {
    pub manager_id: u64,
    pub department: String,
}
