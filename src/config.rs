use core::{fmt, time::Duration};

use crate::error::ConfigError;

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Database settings shared by every binary, flattened into their `Args`.
#[derive(Debug, Default, clap::Args)]
pub struct DbArgs {
    /// Database host name, or a directory holding the unix socket
    #[arg(long = "db-host", env = "DB_HOST")]
    pub host: Option<String>,
    #[arg(long = "db-user", env = "DB_USER")]
    pub user: Option<String>,
    #[arg(long = "db-password", env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long = "db-name", env = "DB_NAME")]
    pub dbname: Option<String>,
    #[arg(long = "db-port", env = "DB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Only used by programs holding a connection pool
    #[arg(long = "db-pool-size", env = "DB_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
    pub port: u16,
    pub pool_size: u32,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("dbname", &self.dbname)
            .field("port", &self.port)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|s| !s.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

impl TryFrom<DbArgs> for DbConfig {
    type Error = ConfigError;

    fn try_from(args: DbArgs) -> Result<Self, Self::Error> {
        let host = required(args.host, "DB_HOST")?;
        let user = required(args.user, "DB_USER")?;
        let dbname = required(args.dbname, "DB_NAME")?;
        if args.port == 0 {
            return Err(ConfigError::Invalid {
                field: "DB_PORT",
                reason: "port must be non-zero",
            });
        }
        if args.pool_size == 0 {
            return Err(ConfigError::Invalid {
                field: "DB_POOL_SIZE",
                reason: "pool must hold at least one connection",
            });
        }

        Ok(Self {
            host,
            user,
            password: args.password.filter(|s| !s.is_empty()),
            dbname,
            port: args.port,
            pool_size: args.pool_size,
        })
    }
}

impl DbConfig {
    #[must_use]
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname)
            .connect_timeout(CONNECTION_TIMEOUT);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn full_args() -> DbArgs {
        DbArgs {
            host: Some("localhost".to_owned()),
            user: Some("scraper".to_owned()),
            password: Some("hunter2".to_owned()),
            dbname: Some("crawl".to_owned()),
            port: 5433,
            pool_size: 2,
        }
    }

    #[test]
    fn builds_from_complete_args() {
        let config = DbConfig::try_from(full_args()).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5433);
        assert_eq!(config.password.as_deref(), Some("hunter2"));

        let pg = config.to_pg_config();
        assert_eq!(pg.get_user(), Some("scraper"));
        assert_eq!(pg.get_dbname(), Some("crawl"));
        assert_eq!(pg.get_ports(), &[5433]);
        assert_eq!(pg.get_connect_timeout(), Some(&CONNECTION_TIMEOUT));
    }

    #[test]
    fn names_the_first_missing_setting() {
        let args = DbArgs {
            user: None,
            ..full_args()
        };
        assert!(matches!(
            DbConfig::try_from(args),
            Err(ConfigError::Missing("DB_USER"))
        ));

        let args = DbArgs {
            host: Some("   ".to_owned()),
            ..full_args()
        };
        assert!(matches!(
            DbConfig::try_from(args),
            Err(ConfigError::Missing("DB_HOST"))
        ));
    }

    #[test]
    fn rejects_zero_port_and_pool() {
        let args = DbArgs {
            port: 0,
            ..full_args()
        };
        assert!(matches!(
            DbConfig::try_from(args),
            Err(ConfigError::Invalid { field: "DB_PORT", .. })
        ));

        let args = DbArgs {
            pool_size: 0,
            ..full_args()
        };
        assert!(matches!(
            DbConfig::try_from(args),
            Err(ConfigError::Invalid {
                field: "DB_POOL_SIZE",
                ..
            })
        ));
    }

    #[test]
    fn empty_password_means_none() {
        let args = DbArgs {
            password: Some(String::new()),
            ..full_args()
        };
        assert_eq!(DbConfig::try_from(args).unwrap().password, None);
    }

    #[test]
    fn debug_hides_password() {
        let config = DbConfig::try_from(full_args()).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn parses_from_command_line() {
        #[derive(Parser)]
        struct Cli {
            #[command(flatten)]
            db: DbArgs,
        }

        let cli = Cli::try_parse_from([
            "test",
            "--db-host",
            "/var/run/postgresql",
            "--db-user",
            "postgres",
            "--db-name",
            "postgres",
            "--db-port",
            "6543",
        ])
        .unwrap();
        let config = DbConfig::try_from(cli.db).unwrap();
        assert_eq!(config.host, "/var/run/postgresql");
        assert_eq!(config.port, 6543);
    }
}
