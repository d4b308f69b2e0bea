//! Persistence backend variants and the settings derived from them.
//!
//! The stack targets exactly one store per project. Everything that differs
//! between the two (service names, driver ids, credentials, env overrides,
//! the image extension) is derived here so callers only branch on
//! [`Persistence`] in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Composer package that provides the MongoDB driver for Laravel.
pub const MONGODB_DRIVER_PACKAGE: &str = "mongodb/laravel-mongodb";

/// Database name shared by both variants.
pub const DATABASE_NAME: &str = "laravel";

/// Mail-capture service host and SMTP port as seen from inside the network.
pub const MAIL_HOST: &str = "mailpit";
pub const MAIL_SMTP_PORT: u16 = 1025;

/// Persistence backend the stack is provisioned for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// MongoDB with mongo-express.
    #[default]
    Document,
    /// MySQL with phpMyAdmin.
    Relational,
}

/// Login for the database service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Persistence {
    pub const ALL: [Persistence; 2] = [Persistence::Document, Persistence::Relational];

    pub fn as_str(self) -> &'static str {
        match self {
            Persistence::Document => "document",
            Persistence::Relational => "relational",
        }
    }

    /// Laravel connection driver id (the `DB_CONNECTION` value).
    pub fn driver(self) -> &'static str {
        match self {
            Persistence::Document => "mongodb",
            Persistence::Relational => "mysql",
        }
    }

    /// Compose service name of the database.
    pub fn database_service(self) -> &'static str {
        match self {
            Persistence::Document => "mongodb",
            Persistence::Relational => "mysql",
        }
    }

    /// Compose service name of the database admin UI.
    pub fn admin_service(self) -> &'static str {
        match self {
            Persistence::Document => "mongo-express",
            Persistence::Relational => "phpmyadmin",
        }
    }

    pub fn database_image(self) -> &'static str {
        match self {
            Persistence::Document => "mongo:7",
            Persistence::Relational => "mysql:8.0",
        }
    }

    pub fn admin_image(self) -> &'static str {
        match self {
            Persistence::Document => "mongo-express:1",
            Persistence::Relational => "phpmyadmin:5",
        }
    }

    /// Port the database listens on inside the compose network.
    pub fn database_port(self) -> u16 {
        match self {
            Persistence::Document => 27017,
            Persistence::Relational => 3306,
        }
    }

    /// Port the admin UI listens on inside its container.
    pub fn admin_container_port(self) -> u16 {
        match self {
            Persistence::Document => 8081,
            Persistence::Relational => 80,
        }
    }

    /// Default host port for the admin UI.
    pub fn default_admin_port(self) -> u16 {
        match self {
            Persistence::Document => 8081,
            Persistence::Relational => 8080,
        }
    }

    /// Path inside the database container that the named volume backs.
    pub fn data_dir(self) -> &'static str {
        match self {
            Persistence::Document => "/data/db",
            Persistence::Relational => "/var/lib/mysql",
        }
    }

    /// Named volume holding database files.
    pub fn volume_name(self) -> &'static str {
        match self {
            Persistence::Document => "mongodb_data",
            Persistence::Relational => "mysql_data",
        }
    }

    pub fn credentials(self) -> Credentials {
        let username = match self {
            Persistence::Document => "root",
            Persistence::Relational => "laravel",
        };
        Credentials {
            username: username.to_string(),
            password: "secret".to_string(),
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persistence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "mongodb" | "mongo" => Ok(Persistence::Document),
            "relational" | "mysql" => Ok(Persistence::Relational),
            other => Err(format!(
                "unknown persistence '{other}' (expected 'document' or 'relational')"
            )),
        }
    }
}

/// Keys the backend reads to reach the other services, in write order.
pub const BACKEND_ENV_KEYS: [&str; 8] = [
    "DB_CONNECTION",
    "DB_HOST",
    "DB_PORT",
    "DB_DATABASE",
    "DB_USERNAME",
    "DB_PASSWORD",
    "MAIL_HOST",
    "MAIL_PORT",
];

/// Desired values for [`BACKEND_ENV_KEYS`] under `persistence`.
pub fn backend_env_overrides(persistence: Persistence) -> Vec<(&'static str, String)> {
    let credentials = persistence.credentials();
    let values = [
        persistence.driver().to_string(),
        persistence.database_service().to_string(),
        persistence.database_port().to_string(),
        DATABASE_NAME.to_string(),
        credentials.username,
        credentials.password,
        MAIL_HOST.to_string(),
        MAIL_SMTP_PORT.to_string(),
    ];
    BACKEND_ENV_KEYS.into_iter().zip(values).collect()
}

/// Connection profile registered in `config/database.php` for the document
/// store. Lines are relative to the profile key's indentation.
pub fn mongodb_connection_profile() -> Vec<&'static str> {
    vec![
        "'mongodb' => [",
        "    'driver' => 'mongodb',",
        "    'dsn' => env('DB_URI', 'mongodb://'.env('DB_USERNAME').':'.env('DB_PASSWORD').'@'.env('DB_HOST').':'.env('DB_PORT')),",
        "    'database' => env('DB_DATABASE', 'laravel'),",
        "],",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("Document".parse::<Persistence>(), Ok(Persistence::Document));
        assert_eq!("mongo".parse::<Persistence>(), Ok(Persistence::Document));
        assert_eq!("MySQL".parse::<Persistence>(), Ok(Persistence::Relational));
        let err = "sqlite".parse::<Persistence>().unwrap_err();
        assert!(err.contains("unknown persistence 'sqlite'"));
    }

    #[test]
    fn overrides_cover_every_key_in_order() {
        for persistence in Persistence::ALL {
            let keys: Vec<&str> = backend_env_overrides(persistence)
                .iter()
                .map(|(key, _)| *key)
                .collect();
            assert_eq!(keys, BACKEND_ENV_KEYS);
        }
    }

    #[test]
    fn relational_overrides_point_at_mysql() {
        let overrides = backend_env_overrides(Persistence::Relational);
        assert!(overrides.contains(&("DB_CONNECTION", "mysql".to_string())));
        assert!(overrides.contains(&("DB_HOST", "mysql".to_string())));
        assert!(overrides.contains(&("DB_PORT", "3306".to_string())));
        assert!(overrides.contains(&("DB_USERNAME", "laravel".to_string())));
        assert!(overrides.contains(&("MAIL_PORT", "1025".to_string())));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            persistence: Persistence,
        }
        let parsed: Wrapper = toml::from_str("persistence = \"relational\"").expect("parse");
        assert_eq!(parsed.persistence, Persistence::Relational);
    }
}
