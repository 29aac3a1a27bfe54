use std::env;

use dotenvy::dotenv;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_MATCH_RADIUS_KM: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub match_radius_km: f64,
    /// Where customers edit their address ("Change location").
    pub profile_url: Option<Url>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv().ok();
        Config::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let match_radius_km = match lookup("MATCH_RADIUS_KM") {
            Some(raw) => {
                let radius = raw.trim().parse::<f64>().map_err(|e| ConfigError::Invalid {
                    name: "MATCH_RADIUS_KM",
                    reason: e.to_string(),
                })?;
                if radius <= 0.0 {
                    return Err(ConfigError::Invalid {
                        name: "MATCH_RADIUS_KM",
                        reason: "must be positive".to_string(),
                    });
                }
                radius
            }
            None => DEFAULT_MATCH_RADIUS_KM,
        };

        let profile_url = lookup("PROFILE_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    name: "PROFILE_URL",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Config {
            database_url,
            match_radius_km,
            profile_url,
        })
    }
}
