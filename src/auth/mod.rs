/*!
Login accounts and signed-in sessions.

A [`Credentials`] backend holds accounts (email, salt, password hash) and
knows nothing about sessions. An [`AuthClient`] is one named session over a
shared backend; any number of tasks can watch its session state.

Clients made with [`AuthClient::scoped()`] share the backend but keep their
own session, so signing one in or out never touches the others.
*/
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

pub mod db;
pub mod mem;

pub use db::Db;
pub use mem::MemCredentials;

/// Name of the client made by [`AuthClient::new()`].
pub const DEFAULT_CLIENT: &str = "[DEFAULT]";

/// Length of generated account uids.
pub const UID_LENGTH: usize = 28;
const SALT_LENGTH: usize = 16;
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no account with that email")]
    UserNotFound,
    #[error("email address already in use")]
    EmailInUse,
    #[error("badly formatted email address")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("an auth client named {0:?} already exists")]
    DuplicateClient(String),
    #[error("auth client {0:?} has been disposed")]
    ClientDisposed(String),
    #[error("auth backend: {0}")]
    Backend(String),
}

impl From<tokio_postgres::Error> for AuthError {
    fn from(e: tokio_postgres::Error) -> AuthError {
        let mut s = format!("Auth DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            s = format!("{}; {}", s, dbe);
        }
        AuthError::Backend(s)
    }
}

/// Outcome of checking a password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthResult {
    /// Holds the account's uid.
    Ok(String),
    BadPassword,
    NoSuchUser,
}

#[async_trait]
pub trait Credentials: Send + Sync {
    /// Create an account and return its freshly generated uid.
    async fn add_account(&self, email: &str, password: &str) -> Result<String, AuthError>;

    async fn check_password(&self, email: &str, password: &str) -> Result<AuthResult, AuthError>;

    /// Record a password reset request. Errs with `UserNotFound` for an
    /// unknown email.
    async fn request_reset(&self, email: &str) -> Result<(), AuthError>;
}

/// Reject account details no backend should store.
pub fn check_new_account(email: &str, password: &str) -> Result<(), AuthError> {
    if !email.contains('@') {
        return Err(AuthError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

pub(crate) fn new_salt() -> String { crate::random_string(SALT_LENGTH) }

/// Hex-encoded SHA-256 of the salt followed by the password.
pub(crate) fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// A signed-in account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
}

/**
One named session over a credential backend.

Session state is published on a `watch` channel; [`AuthClient::subscribe()`]
receivers see the current state first, then every change. They see the
channel close when the client is dropped.
*/
pub struct AuthClient {
    name: String,
    creds: Arc<dyn Credentials>,
    /// Names of every live client over `creds`.
    names: Arc<Mutex<HashSet<String>>>,
    session: watch::Sender<Option<Session>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("name", &self.name)
            .field("session", &*self.session.borrow())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl AuthClient {
    /// The primary client over `creds`, named [`DEFAULT_CLIENT`].
    pub fn new(creds: Arc<dyn Credentials>) -> Self {
        log::trace!("AuthClient::new( [ Credentials ] ) called.");

        let mut names = HashSet::new();
        names.insert(DEFAULT_CLIENT.to_owned());
        Self::with_registry(DEFAULT_CLIENT.to_owned(), creds, Arc::new(Mutex::new(names)))
    }

    fn with_registry(
        name: String,
        creds: Arc<dyn Credentials>,
        names: Arc<Mutex<HashSet<String>>>,
    ) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            name,
            creds,
            names,
            session,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    fn check_live(&self) -> Result<(), AuthError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(AuthError::ClientDisposed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /**
    Make another client over the same backend, with its own empty session.

    Fails if this client has been disposed or if a live client already goes
    by `name`. The new client's name is released when it is disposed.
    */
    pub fn scoped(&self, name: &str) -> Result<AuthClient, AuthError> {
        log::trace!("AuthClient[{}]::scoped( {:?} ) called.", &self.name, name);
        self.check_live()?;

        let mut names = self.names.lock()
            .map_err(|e| AuthError::Backend(format!("client registry: {}", &e)))?;
        if !names.insert(name.to_owned()) {
            return Err(AuthError::DuplicateClient(name.to_owned()));
        }

        Ok(Self::with_registry(
            name.to_owned(),
            self.creds.clone(),
            self.names.clone(),
        ))
    }

    /// Release this client's name. Every later call on it fails with
    /// `ClientDisposed`.
    pub fn dispose(&self) -> Result<(), AuthError> {
        log::trace!("AuthClient[{}]::dispose() called.", &self.name);

        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(AuthError::ClientDisposed(self.name.clone()));
        }
        let mut names = self.names.lock()
            .map_err(|e| AuthError::Backend(format!("client registry: {}", &e)))?;
        names.remove(&self.name);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool { self.disposed.load(Ordering::SeqCst) }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub fn current_user(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    /// A failed attempt leaves the current session as it was.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        log::trace!("AuthClient[{}]::sign_in( {:?}, [ password ] ) called.", &self.name, email);
        self.check_live()?;

        match self.creds.check_password(email, password).await? {
            AuthResult::Ok(uid) => {
                let sess = Session { uid, email: email.to_owned() };
                self.session.send_replace(Some(sess.clone()));
                Ok(sess)
            },
            AuthResult::BadPassword | AuthResult::NoSuchUser => {
                log::trace!("    ...sign-in for {:?} rejected.", email);
                Err(AuthError::InvalidCredentials)
            },
        }
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        log::trace!("AuthClient[{}]::sign_out() called.", &self.name);
        self.check_live()?;

        self.session.send_replace(None);
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        log::trace!("AuthClient[{}]::send_password_reset( {:?} ) called.", &self.name, email);
        self.check_live()?;

        self.creds.request_reset(email).await
    }

    /// Create an account and sign this client in as it.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        log::trace!("AuthClient[{}]::create_user( {:?}, [ password ] ) called.", &self.name, email);
        self.check_live()?;

        let uid = self.creds.add_account(email, password).await?;
        let sess = Session { uid, email: email.to_owned() };
        self.session.send_replace(Some(sess.clone()));
        Ok(sess)
    }
}
