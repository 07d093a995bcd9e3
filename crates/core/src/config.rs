use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::domain::{MatchPolicy, Position, TeamId};
use crate::events::MatchObserver;
use crate::observers::{AnalystObserver, CoachObserver, PlayerObserver};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// -----------------------------------------------------------------------------
// AppConfig (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
    #[serde(default)]
    pub policy: MatchPolicy,
    #[serde(default)]
    pub observers: Vec<ObserverConfig>,
}

impl AppConfig {
    /// Loads `path` (TOML, optional) and layers `VOLLEYSTAT__SECTION__KEY`
    /// environment variables on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("VOLLEYSTAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.sets_to_win == 0 {
            return Err(ConfigError::Invalid("policy.sets_to_win must be positive".into()));
        }
        for observer in &self.observers {
            observer.build()?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// DatabaseConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "volleystat.db".to_string()
}

// -----------------------------------------------------------------------------
// SheetsConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    /// Service-account key file downloaded from the cloud console.
    pub credentials_file: PathBuf,
    pub spreadsheet_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Overrides the token endpoint named in the credentials file.
    #[serde(default)]
    pub token_uri: Option<String>,
}

fn default_api_base() -> String {
    "https://sheets.googleapis.com".to_string()
}

// -----------------------------------------------------------------------------
// ObserverConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverRole {
    Coach,
    Player,
    Analyst,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    pub role: ObserverRole,
    pub name: String,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub player_id: Option<i64>,
}

impl ObserverConfig {
    pub fn build(&self) -> Result<Rc<dyn MatchObserver>, ConfigError> {
        let team_id = || {
            self.team_id.ok_or_else(|| {
                ConfigError::Invalid(format!("observer {:?} needs a team_id", self.name))
            })
        };

        let observer: Rc<dyn MatchObserver> = match self.role {
            ObserverRole::Coach => Rc::new(CoachObserver::new(&self.name, team_id()?)),
            ObserverRole::Player => {
                let position: Position = self
                    .position
                    .as_deref()
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!("player observer {:?} needs a position", self.name))
                    })?
                    .parse()
                    .map_err(|e| ConfigError::Invalid(format!("observer {:?}: {e}", self.name)))?;
                let observer = PlayerObserver::new(&self.name, position, team_id()?);
                match self.player_id {
                    Some(id) => Rc::new(observer.for_player(id)),
                    None => Rc::new(observer),
                }
            }
            ObserverRole::Analyst => Rc::new(AnalystObserver::new(&self.name)),
        };
        Ok(observer)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(&tmp.path().join("volleystat.toml")).unwrap();
        assert_eq!(config.database.path, "volleystat.db");
        assert!(config.sheets.is_none());
        assert_eq!(config.policy, MatchPolicy::default());
        assert!(config.observers.is_empty());
    }

    #[test]
    fn loads_full_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("volleystat.toml");
        fs::write(
            &path,
            r#"
[database]
path = "season.db"

[sheets]
credentials_file = "creds.json"
spreadsheet_id = "abc123"

[policy]
min_sets_played = 2
sets_to_win = 2

[[observers]]
role = "coach"
name = "John Smith"
team_id = 1

[[observers]]
role = "player"
name = "Emma Davis"
team_id = 1
position = "Setter"

[[observers]]
role = "analyst"
name = "Sarah Wilson"
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.path, "season.db");
        let sheets = config.sheets.unwrap();
        assert_eq!(sheets.spreadsheet_id, "abc123");
        assert_eq!(sheets.api_base, "https://sheets.googleapis.com");
        assert_eq!(config.policy.sets_to_win, 2);
        assert_eq!(config.observers.len(), 3);
        assert_eq!(config.observers[0].role, ObserverRole::Coach);
    }

    #[test]
    fn coach_without_team_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("volleystat.toml");
        fs::write(&path, "[[observers]]\nrole = \"coach\"\nname = \"Nobody\"\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn player_observer_needs_known_position() {
        let cfg = ObserverConfig {
            role: ObserverRole::Player,
            name: "Michael Johnson".into(),
            team_id: Some(1),
            position: Some("Point Guard".into()),
            player_id: None,
        };
        assert!(cfg.build().is_err());
    }
}
