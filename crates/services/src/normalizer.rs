//! Turns free-form reasoning output into a validated verdict.
//!
//! Structured verdict fields win; labeled lines in the narrative
//! (`Winner: ...`, `Score: ...`) are the fallback.

use picker_models::{clamp_confidence, PredictedScore, TeamId, TeamInfo, MAX_KEY_FACTORS};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use thiserror::Error;

use crate::reasoning::ReasoningResponse;

const WINNER_FIELDS: [&str; 2] = ["winner", "predicted_winner"];
const SCORE_FIELDS: [&str; 3] = ["score", "predicted_score", "final_score"];
const CONFIDENCE_FIELDS: [&str; 2] = ["confidence", "confidence_level"];

const WINNER_LABELS: [&str; 4] = ["predicted winner", "winner", "will win", "pick"];
const SCORE_LABELS: [&str; 3] = ["predicted score", "final score", "score"];
const CONFIDENCE_LABELS: [&str; 2] = ["confidence", "confidence level"];
const FACTOR_LABELS: [&str; 3] = ["key factors", "key matchups", "important factors"];

const MIN_FACTOR_LEN: usize = 10;

/// "72% confidence" or "confidence of 72%" anywhere in the narrative.
static INLINE_CONFIDENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s+confidence|confidence\s+(?:of\s+)?(\d+(?:\.\d+)?)\s*%").ok()
});

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Could not normalize reasoning output: {reason}")]
pub struct NormalizationError {
    pub reason: String,
    /// Unmodified reasoning output, kept for diagnosis.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVerdict {
    pub winner: TeamId,
    pub score: PredictedScore,
    pub confidence: f64,
    pub key_factors: Vec<String>,
    pub analysis: String,
}

pub fn normalize(
    response: &ReasoningResponse,
    team_a: &TeamInfo,
    team_b: &TeamInfo,
) -> Result<NormalizedVerdict, NormalizationError> {
    let fail = |reason: String| NormalizationError {
        reason,
        raw: raw_payload(response),
    };
    let teams = [team_a, team_b];

    let winner_text = field_text(&response.verdict, &WINNER_FIELDS)
        .or_else(|| labeled(&response.narrative, &WINNER_LABELS))
        .ok_or_else(|| fail("no predicted winner".to_string()))?;
    let winner = match_team(&winner_text, teams).map_err(fail)?;

    let score_value = field(&response.verdict, &SCORE_FIELDS)
        .cloned()
        .or_else(|| labeled(&response.narrative, &SCORE_LABELS).map(Value::String))
        .ok_or_else(|| fail("no predicted score".to_string()))?;
    let score = parse_score(&score_value, teams).map_err(fail)?;

    let confidence_value = field(&response.verdict, &CONFIDENCE_FIELDS)
        .cloned()
        .or_else(|| labeled(&response.narrative, &CONFIDENCE_LABELS).map(Value::String))
        .or_else(|| inline_confidence(&response.narrative).map(Value::String))
        .ok_or_else(|| fail("no confidence".to_string()))?;
    let confidence = parse_confidence(&confidence_value).map_err(fail)?;

    let key_factors = match response.verdict.get("key_factors").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|factor| !factor.is_empty())
            .map(str::to_string)
            .take(MAX_KEY_FACTORS)
            .collect(),
        None => factors_from_narrative(&response.narrative),
    };

    Ok(NormalizedVerdict {
        winner: winner.id.clone(),
        score,
        confidence,
        key_factors,
        analysis: response.narrative.trim().to_string(),
    })
}

fn raw_payload(response: &ReasoningResponse) -> String {
    json!({ "verdict": response.verdict, "narrative": response.narrative }).to_string()
}

fn field<'a>(verdict: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| verdict.get(name))
        .find(|value| !value.is_null())
}

fn field_text(verdict: &Value, names: &[&str]) -> Option<String> {
    match field(verdict, names)? {
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn strip_markup(text: &str) -> &str {
    text.trim()
        .trim_start_matches(|c: char| c == '#' || c == '-' || c == '•' || c.is_whitespace())
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
}

/// Splits `**Label:** value` into its lowercase label and value.
fn split_label(line: &str) -> Option<(String, &str)> {
    let (label, value) = strip_markup(line).split_once(':')?;
    let label = strip_markup(label).to_lowercase();
    Some((label, strip_markup(value)))
}

/// Value of the first narrative line whose label is, or ends with, one of `labels`.
fn labeled(narrative: &str, labels: &[&str]) -> Option<String> {
    narrative.lines().find_map(|line| {
        let (label, value) = split_label(line)?;
        let matches = labels.iter().any(|wanted| {
            label == *wanted
                || label
                    .strip_suffix(*wanted)
                    .is_some_and(|head| head.ends_with(' '))
        });
        (matches && !value.is_empty()).then(|| value.to_string())
    })
}

fn inline_confidence(narrative: &str) -> Option<String> {
    let captures = INLINE_CONFIDENCE.as_ref()?.captures(narrative)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|found| found.as_str().to_string())
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
}

fn mentions(text: &str, team: &TeamInfo) -> bool {
    let lower = text.to_lowercase();
    let name = team.name.to_lowercase();
    let nickname = team.nickname().to_lowercase();

    words(text).any(|word| word == team.id.as_str())
        || words(&lower).any(|word| word == nickname)
        || lower.contains(&name)
        || (lower.len() >= 3 && name.contains(lower.trim()))
}

/// Resolves free text to exactly one of the two teams.
fn match_team<'a>(text: &str, teams: [&'a TeamInfo; 2]) -> Result<&'a TeamInfo, String> {
    let text = strip_markup(text);
    if text.is_empty() {
        return Err("empty predicted winner".to_string());
    }

    let exact = TeamId::new(text);
    if let Some(team) = teams
        .iter()
        .find(|team| team.id == exact || team.name.eq_ignore_ascii_case(text))
    {
        return Ok(*team);
    }

    match teams.map(|team| mentions(text, team)) {
        [true, false] => Ok(teams[0]),
        [false, true] => Ok(teams[1]),
        [true, true] => Err(format!("winner {text:?} matches both teams")),
        [false, false] => Err(format!("winner {text:?} matches neither team")),
    }
}

fn points(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Removes team names so digits inside them ("49ers") never read as points.
fn strip_team_names(text: &str, teams: [&TeamInfo; 2]) -> String {
    let mut names: Vec<String> = teams
        .iter()
        .flat_map(|team| [team.name.to_lowercase(), team.nickname().to_lowercase()])
        .collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));

    let mut text = text.to_lowercase();
    for name in names {
        text = text.replace(&name, " ");
    }
    text
}

fn numbers(text: &str) -> Vec<u64> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|digits| !digits.is_empty())
        .filter_map(|digits| digits.parse().ok())
        .collect()
}

fn parse_score(value: &Value, teams: [&TeamInfo; 2]) -> Result<PredictedScore, String> {
    let (first, second) = match value {
        Value::Array(items) if items.len() == 2 => (points(&items[0]), points(&items[1])),
        Value::Object(map) => (
            map.get("winner").and_then(points),
            map.get("loser").and_then(points),
        ),
        Value::String(text) => {
            let found = numbers(&strip_team_names(text, teams));
            let point = |i: usize| found.get(i).and_then(|n| u32::try_from(*n).ok());
            (point(0), point(1))
        }
        _ => (None, None),
    };

    match (first, second) {
        (Some(a), Some(b)) if a == b => Err(format!("tied predicted score {value}")),
        // first number is the winner's; a reversed pair is reordered
        (Some(a), Some(b)) => Ok(PredictedScore::new(a.max(b), a.min(b))),
        _ => Err(format!("unreadable predicted score {value}")),
    }
}

fn confidence_word(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    if lower.contains("high") {
        Some(85.0)
    } else if lower.contains("medium") || lower.contains("moderate") {
        Some(70.0)
    } else if lower.contains("low") {
        Some(60.0)
    } else {
        None
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse().ok()
}

fn parse_confidence(value: &Value) -> Result<f64, String> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim().trim_end_matches('%').trim();
            trimmed
                .parse::<f64>()
                .ok()
                .or_else(|| leading_number(text))
                .or_else(|| confidence_word(text))
        }
        _ => None,
    }
    .ok_or_else(|| format!("unreadable confidence {value}"))?;

    if !raw.is_finite() {
        return Err(format!("non-finite confidence {value}"));
    }
    Ok(clamp_confidence(raw))
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            return rest.trim();
        }
    }
    line.trim().trim_matches('*').trim()
}

/// Bullet lines under a "Key factors:" heading, up to the next blank line.
fn factors_from_narrative(narrative: &str) -> Vec<String> {
    let mut lines = narrative.lines();
    let mut collected = Vec::new();

    let inline = lines.by_ref().find_map(|line| {
        let (label, value) = split_label(line)?;
        FACTOR_LABELS.contains(&label.as_str()).then_some(value)
    });
    let Some(inline) = inline else {
        return collected;
    };

    let section = std::iter::once(inline).chain(lines.take_while(|line| !line.trim().is_empty()));
    for line in section {
        let factor = strip_bullet(line);
        if factor.chars().count() >= MIN_FACTOR_LEN {
            collected.push(factor.to_string());
        }
        if collected.len() == MAX_KEY_FACTORS {
            break;
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use picker_models::TeamDirectory;
    use proptest::prelude::*;

    fn team(code: &str) -> TeamInfo {
        TeamDirectory::nfl().get(&TeamId::new(code)).unwrap().clone()
    }

    fn verdict(value: Value) -> ReasoningResponse {
        ReasoningResponse {
            narrative: "Chiefs control the line of scrimmage.".to_string(),
            verdict: value,
        }
    }

    #[test]
    fn test_structured_verdict() {
        let response = verdict(json!({
            "winner": "Kansas City Chiefs",
            "score": "27-24",
            "confidence": 72,
            "key_factors": ["Chiefs pass rush vs. Patriots tackles", "Home field in December"]
        }));

        let normalized = normalize(&response, &team("NE"), &team("KC")).unwrap();
        assert_eq!(normalized.winner, TeamId::new("KC"));
        assert_eq!(normalized.score, PredictedScore::new(27, 24));
        assert_eq!(normalized.confidence, 72.0);
        assert_eq!(normalized.key_factors.len(), 2);
        assert_eq!(normalized.analysis, "Chiefs control the line of scrimmage.");
    }

    #[test]
    fn test_winner_fuzzy_matching() {
        let (ne, kc) = (team("NE"), team("KC"));
        assert_eq!(match_team("KC", [&ne, &kc]).unwrap().id.as_str(), "KC");
        assert_eq!(match_team("the Chiefs by a field goal", [&ne, &kc]).unwrap().id.as_str(), "KC");
        assert_eq!(match_team("New England", [&ne, &kc]).unwrap().id.as_str(), "NE");
        assert_eq!(match_team("**Patriots**", [&ne, &kc]).unwrap().id.as_str(), "NE");

        assert!(match_team("Chiefs over Patriots", [&ne, &kc]).is_err());
        assert!(match_team("Buffalo Bills", [&ne, &kc]).is_err());
    }

    #[test]
    fn test_abbreviation_requires_whole_word() {
        let (no, kc) = (team("NO"), team("KC"));
        // lowercase "no" is a word, not the Saints
        assert_eq!(match_team("no doubt, Chiefs", [&no, &kc]).unwrap().id.as_str(), "KC");
    }

    #[test]
    fn test_score_shapes() {
        let (ne, kc) = (team("NE"), team("KC"));
        let teams = [&ne, &kc];
        let expected = PredictedScore::new(27, 24);

        assert_eq!(parse_score(&json!("27-24"), teams), Ok(expected));
        assert_eq!(parse_score(&json!("Chiefs 27, Patriots 24"), teams), Ok(expected));
        assert_eq!(parse_score(&json!([27, 24]), teams), Ok(expected));
        assert_eq!(parse_score(&json!({"winner": 27, "loser": 24}), teams), Ok(expected));
        assert!(parse_score(&json!("a close one"), teams).is_err());
        assert!(parse_score(&json!("24-24"), teams).is_err());
        assert!(parse_score(&json!([17, 17]), teams).is_err());
    }

    #[test]
    fn test_score_ignores_digits_in_team_names() {
        let (sf, sea) = (team("SF"), team("SEA"));
        let score = parse_score(&json!("San Francisco 49ers 24, Seattle Seahawks 17"), [&sf, &sea]);
        assert_eq!(score, Ok(PredictedScore::new(24, 17)));

        let score = parse_score(&json!("49ers 31 - Seahawks 20"), [&sf, &sea]);
        assert_eq!(score, Ok(PredictedScore::new(31, 20)));
    }

    #[test]
    fn test_confidence_forms() {
        assert_eq!(parse_confidence(&json!(72)), Ok(72.0));
        assert_eq!(parse_confidence(&json!("72%")), Ok(72.0));
        assert_eq!(parse_confidence(&json!("68.5")), Ok(68.5));
        assert_eq!(parse_confidence(&json!("High")), Ok(85.0));
        assert_eq!(parse_confidence(&json!("moderate")), Ok(70.0));
        assert_eq!(parse_confidence(&json!("low confidence")), Ok(60.0));
        assert_eq!(parse_confidence(&json!(140)), Ok(100.0));
        assert_eq!(parse_confidence(&json!(-5)), Ok(0.0));
        assert!(parse_confidence(&json!("unsure")).is_err());
        assert!(parse_confidence(&json!(null)).is_err());
        assert!(parse_confidence(&json!("inf")).is_err());
    }

    #[test]
    fn test_labeled_narrative_fallback() {
        let response = ReasoningResponse {
            narrative: "## Prediction\n\
                        **Predicted Winner:** Kansas City Chiefs\n\
                        **Final Score:** Chiefs 27, Patriots 24\n\
                        Confidence Level: 72%\n\
                        \n\
                        Key Factors:\n\
                        1. Mahomes against a young secondary\n\
                        - Short\n\
                        - Patriots run game stalls on early downs\n\
                        \n\
                        Other notes that are not factors.\n"
                .to_string(),
            verdict: Value::Null,
        };

        let normalized = normalize(&response, &team("NE"), &team("KC")).unwrap();
        assert_eq!(normalized.winner, TeamId::new("KC"));
        assert_eq!(normalized.score.to_string(), "27-24");
        assert_eq!(normalized.confidence, 72.0);
        assert_eq!(
            normalized.key_factors,
            vec![
                "Mahomes against a young secondary".to_string(),
                "Patriots run game stalls on early downs".to_string(),
            ]
        );
    }

    #[test]
    fn test_narrative_factors_are_capped() {
        let narrative = format!(
            "Key factors:\n{}",
            (1..=8)
                .map(|i| format!("- Factor number {i} matters"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        assert_eq!(factors_from_narrative(&narrative).len(), MAX_KEY_FACTORS);
    }

    #[test]
    fn test_failure_keeps_raw_payload() {
        let response = verdict(json!({"winner": "Chiefs", "score": "27-24"}));
        let err = normalize(&response, &team("NE"), &team("KC")).unwrap_err();
        assert_eq!(err.reason, "no confidence");
        assert!(err.raw.contains("27-24"));
        assert!(err.raw.contains("line of scrimmage"));
    }

    #[test]
    fn test_ambiguous_winner_is_rejected() {
        let response = verdict(json!({"winner": "either", "score": "27-24", "confidence": 60}));
        assert!(normalize(&response, &team("NE"), &team("KC")).is_err());
    }

    proptest! {
        #[test]
        fn prop_structured_verdict_is_bounded(a in 0u32..70, b in 0u32..70, confidence in -50i64..250) {
            prop_assume!(a != b);
            let response = verdict(json!({
                "winner": "Chiefs",
                "score": format!("{a}-{b}"),
                "confidence": confidence,
            }));
            let normalized = normalize(&response, &team("NE"), &team("KC")).unwrap();
            prop_assert!(normalized.score.winner >= normalized.score.loser);
            prop_assert_eq!(normalized.score.winner, a.max(b));
            prop_assert!((0.0..=100.0).contains(&normalized.confidence));
        }
    }

    #[test]
    fn test_inline_confidence_phrases() {
        assert_eq!(inline_confidence("I have 72% confidence in this pick."), Some("72".to_string()));
        assert_eq!(inline_confidence("We give it a confidence of 65%."), Some("65".to_string()));
        assert_eq!(inline_confidence("Confidence 80% given the matchup"), Some("80".to_string()));
        assert_eq!(inline_confidence("No numbers here"), None);
    }

    #[test]
    fn test_plain_text_reply_with_inline_confidence() {
        let response = ReasoningResponse {
            narrative: "Predicted Winner: Kansas City Chiefs\n\
                        Final Score: Chiefs 27, Patriots 24\n\
                        I have 72% confidence in this pick."
                .to_string(),
            verdict: Value::Null,
        };

        let normalized = normalize(&response, &team("NE"), &team("KC")).unwrap();
        assert_eq!(normalized.winner, TeamId::new("KC"));
        assert_eq!(normalized.score, PredictedScore::new(27, 24));
        assert_eq!(normalized.confidence, 72.0);
    }

    #[test]
    fn test_will_win_label() {
        assert_eq!(labeled("Who will win: the Chiefs", &WINNER_LABELS), Some("the Chiefs".to_string()));
        assert_eq!(labeled("Will win: Patriots", &WINNER_LABELS), Some("Patriots".to_string()));
        assert_eq!(labeled("Winnerless: nobody", &WINNER_LABELS), None);

        let response = ReasoningResponse {
            narrative: "Who will win: New England Patriots\nScore: 23-20\nConfidence: medium".to_string(),
            verdict: Value::Null,
        };
        let normalized = normalize(&response, &team("NE"), &team("KC")).unwrap();
        assert_eq!(normalized.winner, TeamId::new("NE"));
        assert_eq!(normalized.confidence, 70.0);
    }

    #[test]
    fn test_tied_score_is_rejected() {
        let response = verdict(json!({"winner": "Chiefs", "score": "24-24", "confidence": 60}));
        let err = normalize(&response, &team("NE"), &team("KC")).unwrap_err();
        assert!(err.reason.starts_with("tied predicted score"));
    }
}
