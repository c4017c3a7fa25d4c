use serde::{Deserialize, Serialize};
use std::fmt;

/// Case-normalized team code. Two ids are equal iff their normalized codes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TeamId(String);

impl TeamId {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TeamId {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for TeamId {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<TeamId> for String {
    fn from(id: TeamId) -> Self {
        id.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unordered pair of teams, used to key in-flight analyses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchupKey(TeamId, TeamId);

impl MatchupKey {
    pub fn new(a: &TeamId, b: &TeamId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }
}

impl fmt::Display for MatchupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: TeamId,
    pub name: String,
}

impl TeamInfo {
    /// Last word of the full name, e.g. "Chiefs" for "Kansas City Chiefs".
    pub fn nickname(&self) -> &str {
        self.name.split_whitespace().last().unwrap_or(&self.name)
    }
}

const NFL_TEAMS: [(&str, &str); 32] = [
    ("ARI", "Arizona Cardinals"),
    ("ATL", "Atlanta Falcons"),
    ("BAL", "Baltimore Ravens"),
    ("BUF", "Buffalo Bills"),
    ("CAR", "Carolina Panthers"),
    ("CHI", "Chicago Bears"),
    ("CIN", "Cincinnati Bengals"),
    ("CLE", "Cleveland Browns"),
    ("DAL", "Dallas Cowboys"),
    ("DEN", "Denver Broncos"),
    ("DET", "Detroit Lions"),
    ("GB", "Green Bay Packers"),
    ("HOU", "Houston Texans"),
    ("IND", "Indianapolis Colts"),
    ("JAX", "Jacksonville Jaguars"),
    ("KC", "Kansas City Chiefs"),
    ("LV", "Las Vegas Raiders"),
    ("LAC", "Los Angeles Chargers"),
    ("LAR", "Los Angeles Rams"),
    ("MIA", "Miami Dolphins"),
    ("MIN", "Minnesota Vikings"),
    ("NE", "New England Patriots"),
    ("NO", "New Orleans Saints"),
    ("NYG", "New York Giants"),
    ("NYJ", "New York Jets"),
    ("PHI", "Philadelphia Eagles"),
    ("PIT", "Pittsburgh Steelers"),
    ("SF", "San Francisco 49ers"),
    ("SEA", "Seattle Seahawks"),
    ("TB", "Tampa Bay Buccaneers"),
    ("TEN", "Tennessee Titans"),
    ("WAS", "Washington Commanders"),
];

/// Known teams, resolvable by abbreviation or full name.
#[derive(Debug, Clone)]
pub struct TeamDirectory {
    teams: Vec<TeamInfo>,
}

impl TeamDirectory {
    pub fn new<'a>(teams: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            teams: teams
                .into_iter()
                .map(|(code, name)| TeamInfo {
                    id: TeamId::new(code),
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn nfl() -> Self {
        Self::new(NFL_TEAMS)
    }

    /// Resolves an abbreviation or a full team name (case-insensitive).
    pub fn resolve(&self, input: &str) -> Option<TeamId> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let code = TeamId::new(input);
        self.teams
            .iter()
            .find(|team| team.id == code || team.name.eq_ignore_ascii_case(input))
            .map(|team| team.id.clone())
    }

    pub fn get(&self, id: &TeamId) -> Option<&TeamInfo> {
        self.teams.iter().find(|team| &team.id == id)
    }

    pub fn contains(&self, id: &TeamId) -> bool {
        self.get(id).is_some()
    }

    /// Display name for a team, falling back to its code.
    pub fn name_of<'a>(&'a self, id: &'a TeamId) -> &'a str {
        self.get(id).map_or(id.as_str(), |team| team.name.as_str())
    }

    pub fn teams(&self) -> &[TeamInfo] {
        &self.teams
    }
}

impl Default for TeamDirectory {
    fn default() -> Self {
        Self::nfl()
    }
}
