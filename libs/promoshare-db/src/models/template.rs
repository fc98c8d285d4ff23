use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemeTemplate {
    pub id: i64,
    pub file_path: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TextTemplate {
    pub id: i64,
    pub text: String,
}
