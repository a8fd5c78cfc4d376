/*!
Accounts in Postgres.

```sql
CREATE TABLE accounts (
    uid   TEXT PRIMARY KEY,
    email TEXT UNIQUE NOT NULL,
    salt  TEXT NOT NULL,
    hash  TEXT NOT NULL
);

CREATE TABLE password_resets (
    email     TEXT NOT NULL REFERENCES accounts(email) ON DELETE CASCADE,
    requested TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
);
```
*/
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};

use super::*;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'accounts'",
        "CREATE TABLE accounts (
            uid   TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            salt  TEXT NOT NULL,
            hash  TEXT NOT NULL
        )",
        "DROP TABLE accounts",
    ),
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'password_resets'",
        "CREATE TABLE password_resets (
            email     TEXT NOT NULL REFERENCES accounts(email) ON DELETE CASCADE,
            requested TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
        )",
        "DROP TABLE password_resets",
    ),
];

pub struct Db {
    connection_string: String,
}

impl Db {
    pub fn new(connection_string: String) -> Self {
        log::trace!("auth::Db::new( {:?} ) called.", &connection_string);
        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, AuthError> {
        log::trace!(
            "auth::Db::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let err = AuthError::from(e);
                log::trace!("    ...connection failed: {:?}", &err);
                Err(err)
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &AuthError::from(e));
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

#[async_trait]
impl Credentials for Db {
    async fn add_account(&self, email: &str, password: &str) -> Result<String, AuthError> {
        log::trace!("auth::Db::add_account( {:?}, [ password ] ) called.", email);
        check_new_account(email, password)?;

        let client = self.connect().await?;
        let salt = new_salt();
        let hash = hash_password(password, &salt);

        loop {
            let uid = crate::random_string(UID_LENGTH);
            let n = client.execute(
                "INSERT INTO accounts (uid, email, salt, hash)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT DO NOTHING",
                &[&uid, &email, &salt, &hash]
            ).await?;

            if n == 1 {
                return Ok(uid);
            }

            // Either the email is taken or, improbably, the uid is.
            if client.query_opt(
                "SELECT uid FROM accounts WHERE email = $1",
                &[&email]
            ).await?.is_some() {
                return Err(AuthError::EmailInUse);
            }
            log::warn!("Generated uid {:?} collided; retrying.", &uid);
        }
    }

    async fn check_password(&self, email: &str, password: &str) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_password( {:?}, [ password ] ) called.", email);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT uid, salt, hash FROM accounts WHERE email = $1",
            &[&email]
        ).await? {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(row) => row,
        };

        let uid: String = row.try_get("uid")?;
        let salt: &str = row.try_get("salt")?;
        let hash: &str = row.try_get("hash")?;

        if hash_password(password, salt) == hash {
            Ok(AuthResult::Ok(uid))
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    async fn request_reset(&self, email: &str) -> Result<(), AuthError> {
        log::trace!("auth::Db::request_reset( {:?} ) called.", email);

        let client = self.connect().await?;
        let n = client.execute(
            "INSERT INTO password_resets (email)
                SELECT email FROM accounts WHERE email = $1",
            &[&email]
        ).await?;

        if n == 0 {
            Err(AuthError::UserNotFound)
        } else {
            Ok(())
        }
    }
}
