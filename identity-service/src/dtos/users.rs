use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::models::Role;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub organization_ids: Vec<String>,
}

/// Partial update. `avatar_url` distinguishes "absent" (leave as is) from
/// an explicit `null` (clear it) via the double-`Option`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
    pub organization_ids: Option<Vec<String>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
