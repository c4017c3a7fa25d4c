use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ModelError, Result};
use crate::team::{MatchupKey, TeamId};

/// Category of team-comparison input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Stats,
    Injuries,
    Coaching,
    SpecialTeams,
}

impl FactorKind {
    pub const ALL: [FactorKind; 4] = [
        FactorKind::Stats,
        FactorKind::Injuries,
        FactorKind::Coaching,
        FactorKind::SpecialTeams,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FactorKind::Stats => "stats",
            FactorKind::Injuries => "injuries",
            FactorKind::Coaching => "coaching",
            FactorKind::SpecialTeams => "special_teams",
        }
    }

    /// Stats are required for every analysis; the rest may be dropped.
    pub fn is_mandatory(self) -> bool {
        matches!(self, FactorKind::Stats)
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque structured snapshot returned by a factor provider.
pub type FactorPayload = serde_json::Value;

/// All factors gathered for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorBundle {
    pub team: TeamId,
    pub factors: BTreeMap<FactorKind, FactorPayload>,
}

impl FactorBundle {
    pub fn new(team: TeamId) -> Self {
        Self {
            team,
            factors: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, kind: FactorKind, payload: FactorPayload) {
        self.factors.insert(kind, payload);
    }

    pub fn get(&self, kind: FactorKind) -> Option<&FactorPayload> {
        self.factors.get(&kind)
    }

    pub fn contains(&self, kind: FactorKind) -> bool {
        self.factors.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = FactorKind> + '_ {
        self.factors.keys().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default = "enabled")]
    pub include_injuries: bool,
    #[serde(default = "enabled")]
    pub include_coaching: bool,
    #[serde(default = "enabled")]
    pub include_special_teams: bool,
}

fn enabled() -> bool {
    true
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl AnalysisOptions {
    pub fn all() -> Self {
        Self {
            include_injuries: true,
            include_coaching: true,
            include_special_teams: true,
        }
    }

    pub fn stats_only() -> Self {
        Self {
            include_injuries: false,
            include_coaching: false,
            include_special_teams: false,
        }
    }

    pub fn includes(&self, kind: FactorKind) -> bool {
        match kind {
            FactorKind::Stats => true,
            FactorKind::Injuries => self.include_injuries,
            FactorKind::Coaching => self.include_coaching,
            FactorKind::SpecialTeams => self.include_special_teams,
        }
    }

    /// Enabled factor kinds, stats first.
    pub fn enabled_factors(&self) -> Vec<FactorKind> {
        FactorKind::ALL
            .into_iter()
            .filter(|kind| self.includes(*kind))
            .collect()
    }
}

/// A validated request to compare two teams. `team_b` plays at home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub team_a: TeamId,
    pub team_b: TeamId,
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(team_a: TeamId, team_b: TeamId, options: AnalysisOptions) -> Result<Self> {
        if team_a.as_str().is_empty() || team_b.as_str().is_empty() {
            return Err(ModelError::MissingTeam);
        }
        if team_a == team_b {
            return Err(ModelError::SameTeam(team_a));
        }
        Ok(Self {
            team_a,
            team_b,
            options,
        })
    }

    pub fn home_team(&self) -> &TeamId {
        &self.team_b
    }

    pub fn away_team(&self) -> &TeamId {
        &self.team_a
    }

    pub fn matchup_key(&self) -> MatchupKey {
        MatchupKey::new(&self.team_a, &self.team_b)
    }

    pub fn enabled_factors(&self) -> Vec<FactorKind> {
        self.options.enabled_factors()
    }
}
