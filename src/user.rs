/*!
Staff accounts and their roles.

A login account lives in the auth backend; its role lives in the `users`
collection under the account's uid.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::Record;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Finance,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin   => "admin",
            Role::Teacher => "teacher",
            Role::Finance => "finance",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"   => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "finance" => Ok(Role::Finance),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

/// A document from the `users` collection.
///
/// `role` is kept as text so a document with an unrecognized role still
/// loads; use [`UserRecord::role()`] to interpret it.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl UserRecord {
    pub fn role(&self) -> Option<Role> {
        match self.role.as_deref() {
            None => None,
            Some(s) => match s.parse() {
                Ok(r) => Some(r),
                Err(e) => {
                    log::warn!("User {:?}: {}", &self.id, &e);
                    None
                },
            },
        }
    }
}

impl Record for UserRecord {
    const KIND: &'static str = "User";

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_round_trip_as_text() {
        for r in [Role::Admin, Role::Teacher, Role::Finance] {
            assert_eq!(r.to_string().parse::<Role>().unwrap(), r);
            assert_eq!(
                serde_json::to_value(r).unwrap(),
                json!(r.to_string())
            );
        }
        assert!("Boss".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_role_reads_as_none() {
        let u: UserRecord = serde_json::from_value(json!({
            "email": "x@school.test",
            "role": "janitor",
        })).unwrap();
        assert_eq!(u.role(), None);

        let u: UserRecord = serde_json::from_value(json!({
            "email": "y@school.test",
            "role": "finance",
        })).unwrap();
        assert_eq!(u.role(), Some(Role::Finance));
        assert!(u.created_at.is_none());
    }
}
