/*!
Bootstraps the backends named in the config file and reports what's in them.

```bash
schooldesk [ path/to/schooldesk.toml ]
```
*/
use simplelog::{ColorChoice, TerminalMode, TermLogger};

use schooldesk::{config, App, Error};

async fn summarize(app: &App) -> Result<String, Error> {
    let store = app.store();
    let (students, classes, teachers, finance, fees) = tokio::try_join!(
        store.get_students(),
        store.get_classes(),
        store.get_teachers(),
        store.get_finance_users(),
        store.all_fee_records()
    )?;

    Ok(format!(
        "{} students, {} classes, {} teachers, {} finance staff, {} fee records",
        students.len(), classes.len(), teachers.len(), finance.len(), fees.len()
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("schooldesk")
        .build();
    if let Err(e) = TermLogger::init(
        schooldesk::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    let cfg_path = std::env::args().nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_owned());

    let app = match config::load_configuration(&cfg_path).await {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", &e);
            eprintln!("{}", &e);
            std::process::exit(1);
        },
    };

    match summarize(&app).await {
        Ok(summary) => {
            log::info!("{}", &summary);
            println!("{}", &summary);
        },
        Err(e) => {
            log::error!("Error reading data store: {}", &e);
            std::process::exit(1);
        },
    }
}
