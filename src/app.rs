/*!
The application face: session gating, role checks, and staff provisioning
over an [`AuthClient`] and a [`Store`].

Record operations live on [`Store`]; reach them through [`App::store()`].
*/
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

use crate::{
    auth::{AuthClient, AuthError, Session},
    render::Page,
    store::{DbError, Store},
    user::Role,
};

/// Distinguishes secondary clients made in the same millisecond.
static SECONDARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Page unauthenticated visitors get sent to by default.
pub const DEFAULT_LOGIN_PAGE: &str = "index.html";
/// Page users without the right role get sent to by default.
pub const DEFAULT_HOME_PAGE: &str = "index.html";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not initialized")]
    NotInitialized(&'static str),
    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("unable to set up secondary auth client: {0}")]
    SecondaryInit(#[source] AuthError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl Error {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Error::NotFound { kind, id: id.to_owned() }
    }
}

/// Assembles an [`App`]; both collaborators are required.
#[derive(Debug, Default)]
pub struct AppBuilder {
    auth: Option<Arc<AuthClient>>,
    store: Option<Store>,
    login_page: Option<String>,
    home_page: Option<String>,
}

impl AppBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn auth(mut self, auth: Arc<AuthClient>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn login_page(mut self, page: &str) -> Self {
        self.login_page = Some(page.to_owned());
        self
    }

    pub fn home_page(mut self, page: &str) -> Self {
        self.home_page = Some(page.to_owned());
        self
    }

    pub fn build(self) -> Result<App, Error> {
        let auth = self.auth.ok_or(Error::NotInitialized("auth client"))?;
        let store = self.store.ok_or(Error::NotInitialized("document store"))?;
        let login_page = self.login_page
            .unwrap_or_else(|| DEFAULT_LOGIN_PAGE.to_owned());
        let home_page = self.home_page
            .unwrap_or_else(|| DEFAULT_HOME_PAGE.to_owned());

        Ok(App { auth, store, login_page, home_page })
    }
}

#[derive(Debug, Clone)]
pub struct App {
    auth: Arc<AuthClient>,
    store: Store,
    login_page: String,
    home_page: String,
}

impl App {
    pub fn builder() -> AppBuilder { AppBuilder::new() }

    pub fn auth(&self) -> &AuthClient { &self.auth }

    pub fn store(&self) -> &Store { &self.store }

    /// Where callers should point [`App::require_auth()`] and
    /// [`App::require_role()`] by default.
    pub fn login_page(&self) -> &str { &self.login_page }

    pub fn home_page(&self) -> &str { &self.home_page }

    pub async fn login_with_email(&self, email: &str, password: &str) -> Result<Session, Error> {
        Ok(self.auth.sign_in(email, password).await?)
    }

    pub async fn logout(&self) -> Result<(), Error> {
        Ok(self.auth.sign_out().await?)
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), Error> {
        Ok(self.auth.send_password_reset(email).await?)
    }

    pub async fn get_user_role(&self, uid: &str) -> Result<Option<Role>, Error> {
        self.store.get_user_role(uid).await
    }

    /// `None` when nobody is signed in.
    pub async fn get_current_user_role(&self) -> Result<Option<Role>, Error> {
        match self.auth.current_user() {
            None => Ok(None),
            Some(sess) => self.get_user_role(&sess.uid).await,
        }
    }

    /**
    Send `page` to `redirect_to` whenever nobody is signed in, unless it is
    already there.

    The returned task runs until the auth client goes away.
    */
    pub fn require_auth(&self, page: Arc<Page>, redirect_to: &str) -> JoinHandle<()> {
        log::trace!("App::require_auth( {:?}, {:?} ) called.", &page, redirect_to);

        let mut rx = self.auth.subscribe();
        let redirect_to = redirect_to.to_owned();

        tokio::spawn(async move {
            loop {
                let signed_in = rx.borrow_and_update().is_some();
                if !signed_in && !page.location().ends_with(&redirect_to) {
                    page.redirect(&redirect_to);
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
            log::trace!("require_auth guard for {:?} ends.", &redirect_to);
        })
    }

    /**
    Send `page` to `redirect_to` whenever nobody is signed in, and to the
    home page whenever the signed-in user doesn't have `role`.

    A user whose role can't be read counts as not having it.
    */
    pub fn require_role(&self, page: Arc<Page>, role: Role, redirect_to: &str) -> JoinHandle<()> {
        log::trace!("App::require_role( {:?}, {}, {:?} ) called.", &page, &role, redirect_to);

        let mut rx = self.auth.subscribe();
        let store = self.store.clone();
        let redirect_to = redirect_to.to_owned();
        let home_page = self.home_page.clone();

        tokio::spawn(async move {
            loop {
                let session = rx.borrow_and_update().clone();
                match session {
                    None => page.redirect(&redirect_to),
                    Some(sess) => match store.get_user_role(&sess.uid).await {
                        Ok(Some(r)) if r == role => {},
                        Ok(_) => page.redirect(&home_page),
                        Err(e) => {
                            log::error!("Unable to read role of {:?}: {}", &sess.uid, &e);
                            page.redirect(&home_page);
                        },
                    },
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
            log::trace!("require_role guard for {} ends.", &role);
        })
    }

    /**
    Create a login account with `role` without disturbing the current
    session, and return its uid.

    The account is made on a short-lived secondary client, which is signed
    out and disposed of afterward whether or not creation worked.
    */
    pub async fn create_user(&self, email: &str, password: &str, role: Role) -> Result<String, Error> {
        log::trace!("App::create_user( {:?}, [ password ], {} ) called.", email, &role);

        let millis = SystemTime::now().duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = SECONDARY_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("secondary-{}-{}", millis, seq);

        let secondary = self.auth.scoped(&name).map_err(|e| {
            log::error!("Failed to set up secondary auth client {:?}: {}", &name, &e);
            Error::SecondaryInit(e)
        })?;

        let res = self.provision(&secondary, email, password, role).await;

        if let Err(e) = secondary.sign_out().await {
            log::warn!("Error signing out secondary auth client {:?}: {}", &name, &e);
        }
        if let Err(e) = secondary.dispose() {
            log::warn!("Error disposing of secondary auth client {:?}: {}", &name, &e);
        }

        if let Err(e) = &res {
            log::error!("Error creating user {:?}: {}", email, e);
        }
        res
    }

    async fn provision(
        &self,
        secondary: &AuthClient,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<String, Error> {
        let sess = secondary.create_user(email, password).await?;
        self.store.set_user_record(&sess.uid, email, role).await?;
        Ok(sess.uid)
    }
}
