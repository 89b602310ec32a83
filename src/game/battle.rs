//! Debate outcome: judge balance parsing and the final verdict.

use serde::Serialize;

use super::assessment::TraderCode;

/// Health at or above which the user wins.
pub const VICTORY_THRESHOLD: u8 = 60;
/// Health at or below which the user loses.
pub const DEFEAT_THRESHOLD: u8 = 40;

const PROPONENT_MARKERS: [&str; 2] = ["正方", "proponent"];

/// Separators allowed between a marker and its percentage.
const MARKER_SEPARATORS: [char; 4] = [':', '：', '=', '-'];

/// Extract the proponent percentage from a judge verdict.
///
/// The judge ends each ruling with a line such as
/// `当前倾向：正方62% / 反方38%`. A proponent marker must be followed,
/// after optional separators, by an integer and a percent sign. When a
/// text carries several rulings the last one wins. Values clamp to `100`.
///
/// ```
/// use mirror_debate_gateway::game::parse_judge_balance;
///
/// assert_eq!(parse_judge_balance("当前倾向：正方62% / 反方38%"), Some(62));
/// assert_eq!(parse_judge_balance("Proponent: 55%"), Some(55));
/// assert_eq!(parse_judge_balance("This approach 30% of the time fails."), None);
/// assert_eq!(parse_judge_balance("no ruling yet"), None);
/// ```
#[must_use]
pub fn parse_judge_balance(text: &str) -> Option<u8> {
    let lower = text.to_lowercase();
    PROPONENT_MARKERS
        .iter()
        .flat_map(|marker| {
            lower
                .match_indices(marker)
                .filter_map(|(idx, m)| percentage(&lower[idx + m.len()..]).map(|v| (idx, v)))
                .collect::<Vec<_>>()
        })
        .max_by_key(|(idx, _)| *idx)
        .map(|(_, value)| value)
}

/// `N%` directly after a marker, allowing whitespace and separators first.
fn percentage(rest: &str) -> Option<u8> {
    let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || MARKER_SEPARATORS.contains(&c));
    let digits_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits_len == 0 {
        return None;
    }
    let (digits, tail) = rest.split_at(digits_len);
    if !tail.trim_start().starts_with(['%', '％']) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    u8::try_from(value.min(100)).ok()
}

/// Final outcome for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Victory,
    Draw,
    Defeat,
}

impl Verdict {
    #[must_use]
    pub fn from_health(health: u8) -> Self {
        if health >= VICTORY_THRESHOLD {
            Self::Victory
        } else if health <= DEFEAT_THRESHOLD {
            Self::Defeat
        } else {
            Self::Draw
        }
    }
}

/// End-of-debate summary.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictReport {
    pub session_id: String,
    pub user_code: Option<TraderCode>,
    pub mirror_code: Option<TraderCode>,
    pub asset: Option<String>,
    pub rounds: u32,
    pub health: u8,
    pub verdict: Verdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chinese_marker() {
        assert_eq!(parse_judge_balance("当前倾向：正方 70% / 反方 30%"), Some(70));
        assert_eq!(
            parse_judge_balance("裁判点评……\n当前倾向：正方45% / 反方55%"),
            Some(45)
        );
    }

    #[test]
    fn test_parse_english_marker() {
        assert_eq!(parse_judge_balance("Balance: PROPONENT 33% / opponent 67%"), Some(33));
        assert_eq!(parse_judge_balance("proponent - 80 ％"), Some(80));
        assert_eq!(parse_judge_balance("proponent 80 / opponent 20"), None);
    }

    #[test]
    fn test_ordinary_text_is_not_a_ruling() {
        assert_eq!(parse_judge_balance("This approach 30% of the time fails."), None);
        assert_eq!(parse_judge_balance("The problem: 3 red candles."), None);
        assert_eq!(parse_judge_balance("Pro traders lose 70% of the time."), None);
        assert_eq!(parse_judge_balance("正方 argued 3 points, 反方 2."), None);
    }

    #[test]
    fn test_last_ruling_wins() {
        let text = "上一轮：正方70% / 反方30%\n本轮：当前倾向：正方45% / 反方55%";
        assert_eq!(parse_judge_balance(text), Some(45));
        assert_eq!(
            parse_judge_balance("正方60% / 反方40% ... proponent 20% overall"),
            Some(20)
        );
    }

    #[test]
    fn test_parse_clamps_and_rejects() {
        assert_eq!(parse_judge_balance("正方150%"), Some(100));
        assert_eq!(parse_judge_balance("反方38%"), None);
        assert_eq!(parse_judge_balance(""), None);
        assert_eq!(parse_judge_balance("the proponent argued well"), None);
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(Verdict::from_health(100), Verdict::Victory);
        assert_eq!(Verdict::from_health(60), Verdict::Victory);
        assert_eq!(Verdict::from_health(59), Verdict::Draw);
        assert_eq!(Verdict::from_health(41), Verdict::Draw);
        assert_eq!(Verdict::from_health(40), Verdict::Defeat);
        assert_eq!(Verdict::from_health(0), Verdict::Defeat);
    }
}
