use anyhow::Context;

use crate::blend::QuickCheckWeighting;
use crate::engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub semester: String,
    pub actor: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = match lookup("MASTERY_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .with_context(|| format!("MASTERY_MAX_CONNECTIONS is not a number: {value}"))?,
            None => 5,
        };

        Ok(Self {
            database_url,
            max_connections,
            semester: lookup("MASTERY_SEMESTER").unwrap_or_else(|| "fall".to_string()),
            actor: lookup("MASTERY_ACTOR").unwrap_or_else(|| "mastery-engine".to_string()),
        })
    }

    pub fn engine_config(&self, semester: Option<&str>) -> EngineConfig {
        EngineConfig {
            semester: semester.unwrap_or(&self.semester).to_string(),
            actor: self.actor.clone(),
            weighting: QuickCheckWeighting::PerMark,
        }
    }
}
