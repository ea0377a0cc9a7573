use crate::errors::AppError;

/// Server settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub seed_defaults_on_startup: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| AppError::configuration("DATABASE_URL not set"))?;

        let port = std::env::var("APP_PORT")
            .map(|val| val.parse::<u16>())
            .unwrap_or(Ok(8000))
            .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?;

        let seed_defaults_on_startup = match std::env::var("SEED_DEFAULTS_ON_STARTUP") {
            Ok(val) => parse_flag(&val)
                .ok_or_else(|| AppError::configuration("SEED_DEFAULTS_ON_STARTUP must be true or false"))?,
            Err(_) => false,
        };

        Ok(Self {
            database_url,
            port,
            seed_defaults_on_startup,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
