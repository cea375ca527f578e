pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        pub jwt_secret: String,
        /// Marks the session cookie `Secure`. Enable when served over HTTPS.
        #[serde(default)]
        pub secure_cookies: bool,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn can_deserialize_with_defaults() {
            let settings = config::Config::builder()
                .set_override("db_url", "sqlite::memory:")
                .unwrap()
                .set_override("jwt_secret", "secret")
                .unwrap()
                .build()
                .unwrap();

            let config: Config = settings.try_deserialize().unwrap();

            assert_eq!(config.db_url, "sqlite::memory:");
            assert_eq!(config.port, 8080);
            assert_eq!(config.jwt_secret, "secret");
            assert!(!config.secure_cookies);
        }
    }
}

pub mod auth;
pub mod entities;
pub mod form;
pub mod task;
pub mod user;
pub mod web;
