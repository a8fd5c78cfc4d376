/*!
Classes (as in "Grade 4 Mathematics", not Rust types).
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::Record;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: String,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Record for Class {
    const KIND: &'static str = "Class";

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClassUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}
