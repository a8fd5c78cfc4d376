/*!
Data access, session gating, and page rendering for a school office.

Every operation runs against two explicitly constructed collaborators: an
[`auth::AuthClient`] over some [`auth::Credentials`] backend, and a
[`store::Store`] over some [`store::Docs`] backend. [`app::App`] bundles the
two; [`config::load_configuration`] builds one from a config file.
*/
use rand::seq::SliceRandom;
use time::{format_description::FormatItem, macros::format_description};

pub mod app;
pub mod attendance;
pub mod auth;
pub mod class;
pub mod config;
pub mod dates;
pub mod fee;
pub mod render;
pub mod store;
pub mod student;
pub mod user;

pub use app::{App, AppBuilder, Error};

/// Calendar dates (attendance days, payment dates) on the wire.
pub const DATE_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

/// Write timestamps. Fixed width and always UTC, so they sort as strings.
pub const STAMP_FMT: &[FormatItem] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9][offset_hour sign:mandatory]:[offset_minute]"
);

const ID_CHARS: &[u8] =
b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A random alphanumeric string of `len` characters; used for document ids,
/// account uids, and password salts.
pub(crate) fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .filter_map(|_| ID_CHARS.choose(&mut rng))
        .map(|&b| b as char)
        .collect()
}

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("schooldesk")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }

    #[test]
    fn random_strings() {
        ensure_logging();

        let a = random_string(20);
        let b = random_string(20);
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
        assert_eq!(random_string(0), "");
    }
}
