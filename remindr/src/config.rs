use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_email_host")]
    pub email_host: String,
    #[serde(default = "default_email_port")]
    pub email_port: u16,
    #[serde(default)]
    pub email_user: String,
    #[serde(default)]
    pub email_pass: String,
    #[serde(default)]
    pub email_from: Option<String>,
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default)]
    pub email_debug: bool,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    /// Loads configuration from the given environment source.
    pub fn from_environment(environment: config::Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(environment)
            .build()?;

        let config: Config = settings.try_deserialize()?;
        anyhow::ensure!(
            config.check_interval_secs > 0,
            "CHECK_INTERVAL_SECS must be at least 1"
        );
        Ok(config)
    }

    /// Address reminders go to when a task carries no recipient of its own.
    pub fn fallback_recipient(&self) -> Option<String> {
        non_blank(self.email_to.as_deref())
    }

    /// The `From` address of outgoing mail.
    pub fn sender(&self) -> String {
        non_blank(self.email_from.as_deref()).unwrap_or_else(|| self.email_user.clone())
    }

    pub fn has_email_credentials(&self) -> bool {
        !self.email_user.trim().is_empty() && !self.email_pass.is_empty()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn default_database_url() -> String {
    "sqlite://remindr.db?mode=rwc".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_email_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_email_port() -> u16 {
    587
}

fn default_check_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let source = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        config::Environment::default().source(Some(source))
    }

    #[test]
    fn can_load_defaults_from_empty_environment() {
        let config = Config::from_environment(environment(&[])).unwrap();

        assert_eq!(config.database_url, "sqlite://remindr.db?mode=rwc");
        assert_eq!(config.port, 8080);
        assert_eq!(config.email_host, "smtp.gmail.com");
        assert_eq!(config.email_port, 587);
        assert_eq!(config.check_interval_secs, 60);
        assert!(!config.email_debug);
        assert!(!config.has_email_credentials());
        assert_eq!(config.fallback_recipient(), None);
    }

    #[test]
    fn can_load_email_settings_from_environment() {
        let config = Config::from_environment(environment(&[
            ("DATABASE_URL", "postgres://localhost/remindr"),
            ("EMAIL_USER", "me@example.com"),
            ("EMAIL_PASS", "app-password"),
            ("EMAIL_TO", "team@example.com"),
            ("EMAIL_PORT", "465"),
            ("EMAIL_DEBUG", "true"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/remindr");
        assert_eq!(config.email_port, 465);
        assert!(config.email_debug);
        assert!(config.has_email_credentials());
        assert_eq!(
            config.fallback_recipient(),
            Some("team@example.com".to_string())
        );
    }

    #[test]
    fn rejects_zero_check_interval() {
        let result = Config::from_environment(environment(&[("CHECK_INTERVAL_SECS", "0")]));

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "CHECK_INTERVAL_SECS must be at least 1");
    }

    #[test]
    fn sender_falls_back_to_email_user() {
        let config = Config::from_environment(environment(&[
            ("EMAIL_USER", "me@example.com"),
            ("EMAIL_FROM", "  "),
        ]))
        .unwrap();

        assert_eq!(config.sender(), "me@example.com");
    }

    #[test]
    fn sender_prefers_email_from() {
        let config = Config::from_environment(environment(&[
            ("EMAIL_USER", "me@example.com"),
            ("EMAIL_FROM", "Reminders <reminders@example.com>"),
        ]))
        .unwrap();

        assert_eq!(config.sender(), "Reminders <reminders@example.com>");
    }
}
