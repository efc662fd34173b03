use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: Option<String>,
    pub employee_id: Option<u64>,
    pub is_active: bool,
}
