/*!
Accounts held in process memory, keyed by email.
*/
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::*;

#[derive(Debug)]
struct Account {
    uid: String,
    salt: String,
    hash: String,
}

#[derive(Debug, Default)]
pub struct MemCredentials {
    accounts: RwLock<HashMap<String, Account>>,
    resets: RwLock<Vec<String>>,
}

impl MemCredentials {
    pub fn new() -> Self {
        log::trace!("MemCredentials::new() called.");
        Self::default()
    }

    /// Emails for which a reset has been requested, oldest first.
    pub async fn reset_requests(&self) -> Vec<String> {
        self.resets.read().await.clone()
    }
}

#[async_trait]
impl Credentials for MemCredentials {
    async fn add_account(&self, email: &str, password: &str) -> Result<String, AuthError> {
        log::trace!("MemCredentials::add_account( {:?}, [ password ] ) called.", email);
        check_new_account(email, password)?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(AuthError::EmailInUse);
        }

        let mut uid = crate::random_string(UID_LENGTH);
        while accounts.values().any(|a| a.uid == uid) {
            uid = crate::random_string(UID_LENGTH);
        }
        let salt = new_salt();
        let hash = hash_password(password, &salt);
        accounts.insert(email.to_owned(), Account { uid: uid.clone(), salt, hash });

        Ok(uid)
    }

    async fn check_password(&self, email: &str, password: &str) -> Result<AuthResult, AuthError> {
        log::trace!("MemCredentials::check_password( {:?}, [ password ] ) called.", email);

        let accounts = self.accounts.read().await;
        let res = match accounts.get(email) {
            None => AuthResult::NoSuchUser,
            Some(a) => if hash_password(password, &a.salt) == a.hash {
                AuthResult::Ok(a.uid.clone())
            } else {
                AuthResult::BadPassword
            },
        };

        Ok(res)
    }

    async fn request_reset(&self, email: &str) -> Result<(), AuthError> {
        log::trace!("MemCredentials::request_reset( {:?} ) called.", email);

        if !self.accounts.read().await.contains_key(email) {
            return Err(AuthError::UserNotFound);
        }
        self.resets.write().await.push(email.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[tokio::test]
    async fn accounts() {
        ensure_logging();
        let creds = MemCredentials::new();

        let uid = creds.add_account("t@school.test", "chalkboard").await.unwrap();
        assert_eq!(
            creds.check_password("t@school.test", "chalkboard").await.unwrap(),
            AuthResult::Ok(uid)
        );
        assert_eq!(
            creds.check_password("t@school.test", "whiteboard").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            creds.check_password("x@school.test", "chalkboard").await.unwrap(),
            AuthResult::NoSuchUser
        );

        assert_eq!(
            creds.add_account("t@school.test", "another1").await,
            Err(AuthError::EmailInUse)
        );
        assert_eq!(
            creds.add_account("not-an-email", "another1").await,
            Err(AuthError::InvalidEmail)
        );
        assert_eq!(
            creds.add_account("u@school.test", "short").await,
            Err(AuthError::WeakPassword)
        );
    }
}
