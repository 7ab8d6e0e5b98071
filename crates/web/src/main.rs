use std::process::ExitCode;

use database::{DatabaseConnectionInfo, PgDatabase};
use locator::{client::Client, config::LocatorConfig};
use web::{start_web_server, WebState};

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init();

    // database
    let Some(database_url) = DatabaseConnectionInfo::url_from_env() else {
        log::error!("expected database connection info in env.");
        return ExitCode::FAILURE;
    };
    let database = match PgDatabase::connect(&database_url).await {
        Ok(database) => database,
        Err(why) => {
            log::error!("could not connect to database: {}", why);
            return ExitCode::FAILURE;
        }
    };

    // web server
    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let state = WebState {
        client: Client::new(database.clone(), LocatorConfig::from_env()),
    };
    let result = start_web_server(state, port).await;

    database.close().await;
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(why) => {
            log::error!("web server stopped: {}", why);
            ExitCode::FAILURE
        }
    }
}
