/*!
Configuration and bootstrapping.

```toml
backend = "postgres"        # or "memory"
auth_db_connect_string = "host=localhost user=schooldesk password='...' dbname=schooldesk_auth"
data_db_connect_string = "host=localhost user=schooldesk password='...' dbname=schooldesk_store"
admin_email = "office@school.example"
admin_password = "change me"
login_page = "index.html"
home_page = "index.html"
template_dir = "templates/"
```

Every key is optional; missing ones take the values in `Cfg::default()`.
*/
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::{
    app::{App, DEFAULT_HOME_PAGE, DEFAULT_LOGIN_PAGE},
    auth::{self, AuthClient, AuthResult, Credentials, MemCredentials},
    render,
    store::{Docs, MemDocs, PgDocs, Store},
    user::Role,
};

pub const DEFAULT_CONFIG_PATH: &str = "schooldesk.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    /// Nothing survives the process; for trying things out.
    Memory,
}

#[derive(Deserialize)]
struct ConfigFile {
    backend: Option<Backend>,
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    login_page: Option<String>,
    home_page: Option<String>,
    template_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Cfg {
    pub backend: Backend,
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub default_admin_email: String,
    pub default_admin_password: String,
    pub login_page: String,
    pub home_page: String,
    pub template_dir: Option<PathBuf>,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            backend: Backend::Postgres,
            auth_db_connect_string: "host=localhost user=schooldesk_test password='schooldesk_test' dbname=schooldesk_auth_test".to_owned(),
            data_db_connect_string: "host=localhost user=schooldesk_test password='schooldesk_test' dbname=schooldesk_store_test".to_owned(),
            default_admin_email: "admin@schooldesk.not.an.address".to_owned(),
            default_admin_password: "schooldesk".to_owned(),
            login_page: DEFAULT_LOGIN_PAGE.to_owned(),
            home_page: DEFAULT_HOME_PAGE.to_owned(),
            template_dir: None,
        }
    }
}

impl Cfg {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(text)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(b) = cf.backend {
            c.backend = b;
        }
        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.login_page {
            c.login_page = s;
        }
        if let Some(s) = cf.home_page {
            c.home_page = s;
        }
        if cf.template_dir.is_some() {
            c.template_dir = cf.template_dir;
        }

        Ok(c)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file {}: {}", path.display(), &e))?;
        Self::from_toml(&file_contents)
    }
}

/**
Make sure the default admin account exists with the configured password, and
that its `users` document gives it the admin role.

Returns the admin's uid, or `None` if the account exists but the configured
password doesn't open it (in which case its role document is left alone).
*/
pub async fn ensure_default_admin(
    creds: &dyn Credentials,
    store: &Store,
    email: &str,
    password: &str,
) -> Result<Option<String>, String> {
    log::trace!("ensure_default_admin( [ Credentials ], [ Store ], {:?}, [ password ] ) called.", email);

    let uid = match creds.check_password(email, password).await {
        Err(e) => {
            return Err(format!(
                "Error checking existence of default Admin ({}) with auth backend: {}",
                email, &e
            ));
        },
        Ok(AuthResult::BadPassword) => {
            log::warn!("Default Admin ({}) not using default password.", email);
            return Ok(None);
        },
        Ok(AuthResult::NoSuchUser) => {
            log::info!("Default Admin ({}) doesn't exist with auth backend; inserting.", email);
            creds.add_account(email, password).await
                .map_err(|e| format!("Error inserting default Admin into auth backend: {}", &e))?
        },
        Ok(AuthResult::Ok(uid)) => {
            log::trace!("Default Admin password check OK.");
            uid
        },
    };

    match store.get_user_role(&uid).await {
        Err(e) => {
            return Err(format!(
                "Error checking role of default Admin ({}) in data store: {}",
                email, &e
            ));
        },
        Ok(Some(Role::Admin)) => {
            log::trace!("Default Admin role OK in data store.");
        },
        Ok(other) => {
            log::info!(
                "Default Admin ({}) has role {:?} in data store; setting to admin.",
                email, &other
            );
            store.set_user_record(&uid, email, Role::Admin).await
                .map_err(|e| format!("Error writing default Admin role: {}", &e))?;
        },
    }

    Ok(Some(uid))
}

/// Build the backends `cfg` names, ensure their schemas and the default
/// admin, and assemble an [`App`] over them.
pub async fn bootstrap(cfg: &Cfg) -> Result<App, String> {
    log::trace!("bootstrap( {:?} ) called.", cfg);

    render::init(cfg.template_dir.as_deref())?;

    let (creds, docs): (Arc<dyn Credentials>, Arc<dyn Docs>) = match cfg.backend {
        Backend::Memory => {
            log::info!("Using in-memory backends; nothing will be saved.");
            (Arc::new(MemCredentials::new()), Arc::new(MemDocs::new()))
        },
        Backend::Postgres => {
            log::trace!("Checking state of auth DB...");
            let auth_db = auth::Db::new(cfg.auth_db_connect_string.clone());
            if let Err(e) = auth_db.ensure_db_schema().await {
                let estr = format!("Unable to ensure state of auth DB: {}", &e);
                return Err(estr);
            }
            log::trace!("...auth DB okay.");

            log::trace!("Checking state of data DB...");
            let data_db = PgDocs::new(cfg.data_db_connect_string.clone());
            if let Err(e) = data_db.ensure_db_schema().await {
                let estr = format!("Unable to ensure state of data DB: {}", &e);
                return Err(estr);
            }
            log::trace!("...data DB okay.");

            (Arc::new(auth_db), Arc::new(data_db))
        },
    };

    let store = Store::new(docs);
    ensure_default_admin(
        creds.as_ref(),
        &store,
        &cfg.default_admin_email,
        &cfg.default_admin_password,
    ).await?;

    App::builder()
        .auth(Arc::new(AuthClient::new(creds)))
        .store(store)
        .login_page(&cfg.login_page)
        .home_page(&cfg.home_page)
        .build()
        .map_err(|e| format!("Unable to assemble application: {}", &e))
}

/// Loads system configuration, ensures the backends are ready, and returns
/// the assembled [`App`].
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<App, String> {
    let cfg = Cfg::from_file(path.as_ref())?;
    log::info!("Configuration file read:\n{:#?}", &cfg);

    bootstrap(&cfg).await
}
