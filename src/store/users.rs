/*!
`Store` methods for the `users` collection, which maps auth uids to roles.

Deleting a user here removes only the role document; the login account in
the auth backend is untouched.
*/
use serde_json::json;

use super::*;
use crate::user::{Role, UserRecord};

impl Store {
    /// Create or replace the role document for `uid`.
    pub async fn set_user_record(&self, uid: &str, email: &str, role: Role) -> Result<(), Error> {
        log::trace!("Store::set_user_record( {:?}, {:?}, {} ) called.", uid, email, &role);

        let data = json!({
            "email": email,
            "role": role.to_string(),
            "createdAt": now_value()?,
        });

        self.docs.set(USERS, uid, data).await
            .map_err(|e| e.annotate(&format!("Unable to write User {:?}", uid)))?;
        Ok(())
    }

    pub async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, Error> {
        log::trace!("Store::get_user( {:?} ) called.", uid);
        self.fetch(USERS, uid).await
    }

    /// `None` when there is no users document, or when it holds no role we
    /// recognize.
    pub async fn get_user_role(&self, uid: &str) -> Result<Option<Role>, Error> {
        log::trace!("Store::get_user_role( {:?} ) called.", uid);

        Ok(self.get_user(uid).await?.and_then(|u| u.role()))
    }

    pub async fn get_users_by_role(&self, role: Role) -> Result<Vec<UserRecord>, Error> {
        log::trace!("Store::get_users_by_role( {} ) called.", &role);

        let q = Query::new(USERS).eq("role", role.to_string());
        self.fetch_all(&q).await
    }

    pub async fn get_teachers(&self) -> Result<Vec<UserRecord>, Error> {
        self.get_users_by_role(Role::Teacher).await
    }

    pub async fn get_finance_users(&self) -> Result<Vec<UserRecord>, Error> {
        self.get_users_by_role(Role::Finance).await
    }

    pub async fn delete_user(&self, uid: &str) -> Result<(), Error> {
        log::trace!("Store::delete_user( {:?} ) called.", uid);

        self.docs.delete(USERS, uid).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::mem_store;
    use crate::tests::ensure_logging;

    #[tokio::test]
    async fn roles() {
        ensure_logging();
        let db = mem_store();

        db.set_user_record("u-admin", "head@school.test", Role::Admin).await.unwrap();
        db.set_user_record("u-t1", "t1@school.test", Role::Teacher).await.unwrap();
        db.set_user_record("u-t2", "t2@school.test", Role::Teacher).await.unwrap();
        db.set_user_record("u-fin", "bursar@school.test", Role::Finance).await.unwrap();

        assert_eq!(db.get_user_role("u-admin").await.unwrap(), Some(Role::Admin));
        assert_eq!(db.get_user_role("u-nobody").await.unwrap(), None);

        let u = db.get_user("u-fin").await.unwrap().unwrap();
        assert_eq!(u.id, "u-fin");
        assert_eq!(u.email, "bursar@school.test");
        assert!(u.created_at.is_some());

        let mut teachers: Vec<String> = db.get_teachers().await.unwrap()
            .into_iter().map(|u| u.id).collect();
        teachers.sort();
        assert_eq!(teachers, vec!["u-t1", "u-t2"]);
        assert_eq!(db.get_finance_users().await.unwrap().len(), 1);

        // Replacing the record changes the role.
        db.set_user_record("u-t2", "t2@school.test", Role::Finance).await.unwrap();
        assert_eq!(db.get_teachers().await.unwrap().len(), 1);
        assert_eq!(db.get_finance_users().await.unwrap().len(), 2);

        db.delete_user("u-t1").await.unwrap();
        assert!(db.get_user("u-t1").await.unwrap().is_none());
        assert!(db.get_teachers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrecognized_role_is_none() {
        ensure_logging();
        let db = mem_store();

        db.docs().set(USERS, "odd", json!({ "email": "o@school.test", "role": "janitor" }))
            .await.unwrap();
        db.docs().set(USERS, "bare", json!({ "email": "b@school.test" }))
            .await.unwrap();

        assert_eq!(db.get_user_role("odd").await.unwrap(), None);
        assert_eq!(db.get_user_role("bare").await.unwrap(), None);
    }
}
