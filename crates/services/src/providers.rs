use async_trait::async_trait;
use picker_models::{FactorKind, FactorPayload, TeamId};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactorError {
    #[error("{kind} provider does not know team {team}")]
    UnknownTeam { kind: FactorKind, team: TeamId },

    #[error("{kind} provider timed out for {team} after {timeout:?}")]
    Timeout {
        kind: FactorKind,
        team: TeamId,
        timeout: Duration,
    },

    #[error("{kind} provider unavailable for {team}: {reason}")]
    Unavailable {
        kind: FactorKind,
        team: TeamId,
        reason: String,
    },
}

/// Source of one kind of team-comparison input.
#[async_trait]
pub trait FactorProvider: Send + Sync {
    fn kind(&self) -> FactorKind;

    async fn fetch(&self, team: &TeamId) -> Result<FactorPayload, FactorError>;
}

/// The four provider slots. Stats is always present.
#[derive(Clone)]
pub struct FactorProviders {
    pub stats: Arc<dyn FactorProvider>,
    pub injuries: Option<Arc<dyn FactorProvider>>,
    pub coaching: Option<Arc<dyn FactorProvider>>,
    pub special_teams: Option<Arc<dyn FactorProvider>>,
}

impl FactorProviders {
    pub fn new(stats: Arc<dyn FactorProvider>) -> Self {
        Self {
            stats,
            injuries: None,
            coaching: None,
            special_teams: None,
        }
    }

    pub fn with(mut self, provider: Arc<dyn FactorProvider>) -> Self {
        match provider.kind() {
            FactorKind::Stats => self.stats = provider,
            FactorKind::Injuries => self.injuries = Some(provider),
            FactorKind::Coaching => self.coaching = Some(provider),
            FactorKind::SpecialTeams => self.special_teams = Some(provider),
        }
        self
    }

    pub fn get(&self, kind: FactorKind) -> Option<Arc<dyn FactorProvider>> {
        match kind {
            FactorKind::Stats => Some(self.stats.clone()),
            FactorKind::Injuries => self.injuries.clone(),
            FactorKind::Coaching => self.coaching.clone(),
            FactorKind::SpecialTeams => self.special_teams.clone(),
        }
    }

    /// File-backed providers for every kind, reading `<root>/<kind>/<TEAM>.json`.
    pub fn from_directory(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut providers = Self::new(Arc::new(JsonFileProvider::new(FactorKind::Stats, &root)));
        for kind in FactorKind::ALL.into_iter().filter(|kind| !kind.is_mandatory()) {
            providers = providers.with(Arc::new(JsonFileProvider::new(kind, &root)));
        }
        providers
    }
}

/// Serves pre-collected snapshots from disk, one JSON document per team.
pub struct JsonFileProvider {
    kind: FactorKind,
    dir: PathBuf,
}

impl JsonFileProvider {
    pub fn new(kind: FactorKind, root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            dir: root.into().join(kind.as_str()),
        }
    }

    fn path_for(&self, team: &TeamId) -> PathBuf {
        self.dir.join(format!("{}.json", team.as_str()))
    }
}

#[async_trait]
impl FactorProvider for JsonFileProvider {
    fn kind(&self) -> FactorKind {
        self.kind
    }

    async fn fetch(&self, team: &TeamId) -> Result<FactorPayload, FactorError> {
        let path = self.path_for(team);
        debug!("Reading {} snapshot from {}", self.kind, path.display());

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(FactorError::UnknownTeam {
                    kind: self.kind,
                    team: team.clone(),
                })
            }
            Err(err) => {
                return Err(FactorError::Unavailable {
                    kind: self.kind,
                    team: team.clone(),
                    reason: err.to_string(),
                })
            }
        };

        serde_json::from_str(&raw).map_err(|err| FactorError::Unavailable {
            kind: self.kind,
            team: team.clone(),
            reason: format!("malformed snapshot: {err}"),
        })
    }
}
