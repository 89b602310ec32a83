//! Trader archetype assessment.
//!
//! Four binary dimensions (E/I, S/N, T/F, J/P) are scored from questionnaire
//! answers into a four-letter [`TraderCode`]. The opponent persona uses the
//! [mirror](TraderCode::mirror) of the user's code.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GatewayError;

/// One of the four scored dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dimension {
    /// Information source: crowd sentiment (E) or independent research (I).
    EnergySource,
    /// Signal type: price action (S) or macro narrative (N).
    Perception,
    /// Decision basis: quantified logic (T) or conviction (F).
    Judgment,
    /// Execution: strict rules (J) or flexible adjustment (P).
    Execution,
}

impl Dimension {
    pub const ALL: [Self; 4] = [
        Self::EnergySource,
        Self::Perception,
        Self::Judgment,
        Self::Execution,
    ];

    /// Letter pair; the first letter is option `A`.
    #[must_use]
    pub fn letters(self) -> (char, char) {
        match self {
            Self::EnergySource => ('E', 'I'),
            Self::Perception => ('S', 'N'),
            Self::Judgment => ('T', 'F'),
            Self::Execution => ('J', 'P'),
        }
    }

    /// Questionnaire id of the primary question for this dimension.
    #[must_use]
    pub fn question_id(self) -> &'static str {
        match self {
            Self::EnergySource => "q1",
            Self::Perception => "q2",
            Self::Judgment => "q3",
            Self::Execution => "q4",
        }
    }

    /// Dimension addressed by an answer id.
    ///
    /// Accepts the questionnaire ids (`q1`..`q4`) and pair-prefixed ids such
    /// as `EI_01` or `jp_3`.
    #[must_use]
    pub fn for_answer_id(id: &str) -> Option<Self> {
        let id = id.trim();
        if let Some(dim) = Self::ALL.into_iter().find(|d| d.question_id() == id) {
            return Some(dim);
        }
        let (prefix, _) = id.split_once('_')?;
        let prefix = prefix.to_ascii_uppercase();
        Self::ALL.into_iter().find(|d| {
            let (a, b) = d.letters();
            prefix == format!("{a}{b}")
        })
    }

    fn label(self) -> String {
        let (a, b) = self.letters();
        format!("{a}/{b}")
    }
}

/// A validated four-letter trader archetype code, e.g. `INTJ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraderCode([char; 4]);

impl TraderCode {
    /// Letter chosen for a dimension.
    #[must_use]
    pub fn letter(&self, dim: Dimension) -> char {
        let idx = Dimension::ALL.iter().position(|d| *d == dim).unwrap_or(0);
        self.0[idx]
    }

    /// Opponent code: every letter flipped to the other side of its pair.
    #[must_use]
    pub fn mirror(&self) -> Self {
        let mut letters = self.0;
        for (letter, dim) in letters.iter_mut().zip(Dimension::ALL) {
            let (a, b) = dim.letters();
            *letter = if *letter == a { b } else { a };
        }
        Self(letters)
    }

    /// Temperament group of the code.
    #[must_use]
    pub fn group(&self) -> TraderGroup {
        match (
            self.letter(Dimension::Perception),
            self.letter(Dimension::Judgment),
            self.letter(Dimension::Execution),
        ) {
            ('N', 'T', _) => TraderGroup::Analyst,
            ('N', _, _) => TraderGroup::Diplomat,
            (_, _, 'J') => TraderGroup::Sentinel,
            _ => TraderGroup::Explorer,
        }
    }
}

impl fmt::Display for TraderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

impl FromStr for TraderCode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let chars: Vec<char> = upper.chars().collect();
        if chars.len() != 4 {
            return Err(GatewayError::InvalidTraderCode(s.to_string()));
        }

        let mut letters = ['?'; 4];
        for ((slot, c), dim) in letters.iter_mut().zip(chars).zip(Dimension::ALL) {
            let (a, b) = dim.letters();
            if c != a && c != b {
                return Err(GatewayError::InvalidTraderCode(s.to_string()));
            }
            *slot = c;
        }
        Ok(Self(letters))
    }
}

impl Serialize for TraderCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraderCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Temperament group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraderGroup {
    /// NT
    Analyst,
    /// NF
    Diplomat,
    /// SJ
    Sentinel,
    /// SP
    Explorer,
}

/// One questionnaire option.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionOption {
    pub id: &'static str,
    pub text: &'static str,
}

/// One questionnaire question.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: &'static str,
    pub dimension: String,
    pub question: &'static str,
    pub options: [QuestionOption; 2],
}

/// The assessment questionnaire.
#[derive(Debug, Clone, Serialize)]
pub struct Questionnaire {
    pub title: &'static str,
    pub version: &'static str,
    pub questions: Vec<Question>,
}

/// Build the questionnaire served to the assessment screen.
#[must_use]
pub fn questionnaire() -> Questionnaire {
    let texts: [(&str, &str, &str); 4] = [
        (
            "Which source do you lean on when making a trading decision?",
            "Community and market sentiment",
            "Independent research and data validation",
        ),
        (
            "Which signals do you rely on to form a view?",
            "Price action, technicals and order flow",
            "Macro trends, fundamentals and long-term narrative",
        ),
        (
            "What matters most when you decide?",
            "Quantifiable metrics and logical consistency",
            "Intuition and situational judgment",
        ),
        (
            "How do you execute?",
            "Strictly follow preset rules and stops",
            "Adjust positions and strategy flexibly",
        ),
    ];

    let questions = Dimension::ALL
        .into_iter()
        .zip(texts)
        .map(|(dim, (question, a, b))| Question {
            id: dim.question_id(),
            dimension: dim.label(),
            question,
            options: [
                QuestionOption { id: "A", text: a },
                QuestionOption { id: "B", text: b },
            ],
        })
        .collect();

    Questionnaire {
        title: "Trader archetype questionnaire",
        version: "v1",
        questions,
    }
}

/// A submitted answer.
#[derive(Debug, Clone, Deserialize)]
pub struct Answer {
    pub id: String,
    pub choice: Choice,
}

/// Answer choice, either a bare id (`"A"`, `"B: ..."`) or an option object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Choice {
    Text(String),
    Option { id: String },
}

impl Choice {
    /// Whether the answer selects option `A`.
    ///
    /// Only the leading token is read: `"A"`, `"a"`, `"A: ..."`, `"(A) ..."`
    /// and `"Option A"` select `A`. Anything else selects `B`.
    #[must_use]
    pub fn is_a(&self) -> bool {
        let raw = match self {
            Self::Text(s) | Self::Option { id: s } => s,
        };
        let upper = raw.trim().to_uppercase();
        let token = upper
            .strip_prefix("OPTION")
            .map_or(upper.as_str(), str::trim_start)
            .trim_start_matches('(');
        let mut chars = token.chars();
        chars.next() == Some('A') && !chars.next().is_some_and(char::is_alphanumeric)
    }
}

/// Traits derived from a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraderTraits {
    pub decision_driver: &'static str,
    pub risk_appetite: &'static str,
    pub time_horizon: &'static str,
    pub frequency: &'static str,
}

impl TraderTraits {
    #[must_use]
    pub fn for_code(code: TraderCode) -> Self {
        let rule_based = code.letter(Dimension::Execution) == 'J';
        Self {
            decision_driver: if code.letter(Dimension::Judgment) == 'T' {
                "data and logic"
            } else {
                "conviction and intuition"
            },
            risk_appetite: if rule_based { "medium" } else { "medium-high" },
            time_horizon: if rule_based {
                "swing / mid-term"
            } else {
                "intraday / swing"
            },
            frequency: if rule_based {
                "mid-frequency"
            } else {
                "high-frequency"
            },
        }
    }
}

/// Result of scoring a questionnaire.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub code: TraderCode,
    pub mirror: TraderCode,
    pub group: TraderGroup,
    /// Answer count per letter.
    pub scores: BTreeMap<char, u32>,
    /// `q1→E` style trail of the resolved letters.
    pub evidence: Vec<String>,
    pub traits: TraderTraits,
}

impl Assessment {
    /// One-paragraph profile used as the profile prompt.
    #[must_use]
    pub fn profile_prompt(&self) -> String {
        let t = &self.traits;
        format!(
            "Trader profile: {code} ({group:?}). Trading style: {freq}, {horizon}, \
             leaning on trend and volatility strategies. Risk appetite: {risk}, with \
             disciplined drawdown control. Decision driver: {driver}.",
            code = self.code,
            group = self.group,
            freq = t.frequency,
            horizon = t.time_horizon,
            risk = t.risk_appetite,
            driver = t.decision_driver,
        )
    }
}

/// Score answers into an [`Assessment`].
///
/// Each answer counts one point toward a letter of its dimension. A
/// dimension resolves to its first letter on a tie, including when it has no
/// answers at all.
#[must_use]
pub fn score_answers(answers: &[Answer]) -> Assessment {
    let mut scores: BTreeMap<char, u32> = Dimension::ALL
        .iter()
        .flat_map(|d| {
            let (a, b) = d.letters();
            [(a, 0), (b, 0)]
        })
        .collect();

    for answer in answers {
        let Some(dim) = Dimension::for_answer_id(&answer.id) else {
            tracing::debug!(answer_id = %answer.id, "Ignoring answer for unknown question");
            continue;
        };
        let (a, b) = dim.letters();
        let letter = if answer.choice.is_a() { a } else { b };
        *scores.entry(letter).or_default() += 1;
    }

    let mut letters = ['?'; 4];
    let mut evidence = Vec::with_capacity(4);
    for (slot, dim) in letters.iter_mut().zip(Dimension::ALL) {
        let (a, b) = dim.letters();
        let count = |c: char| scores.get(&c).copied().unwrap_or_default();
        *slot = if count(a) >= count(b) { a } else { b };
        evidence.push(format!("{}→{}", dim.question_id(), slot));
    }

    let code = TraderCode(letters);
    Assessment {
        code,
        mirror: code.mirror(),
        group: code.group(),
        scores,
        evidence,
        traits: TraderTraits::for_code(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(id: &str, choice: &str) -> Answer {
        Answer {
            id: id.to_string(),
            choice: Choice::Text(choice.to_string()),
        }
    }

    #[test]
    fn test_scores_questionnaire_ids() {
        let answers = vec![
            answer("q1", "B"),
            answer("q2", "b"),
            answer("q3", "A"),
            answer("q4", "A"),
        ];
        let result = score_answers(&answers);
        assert_eq!(result.code.to_string(), "INTJ");
        assert_eq!(result.mirror.to_string(), "ESFP");
        assert_eq!(result.group, TraderGroup::Analyst);
        assert_eq!(result.evidence, vec!["q1→I", "q2→N", "q3→T", "q4→J"]);
    }

    #[test]
    fn test_missing_answers_default_to_first_letter() {
        let result = score_answers(&[]);
        assert_eq!(result.code.to_string(), "ESTJ");
        assert_eq!(result.group, TraderGroup::Sentinel);
    }

    #[test]
    fn test_pair_prefixed_ids_are_counted() {
        let answers = vec![
            answer("EI_01", "A: crowd"),
            answer("EI_02", "Option B"),
            answer("EI_03", "(B) research"),
            answer("SN_01", "A"),
            answer("TF_01", "B"),
            answer("JP_01", "B"),
            answer("XX_01", "B"),
        ];
        let result = score_answers(&answers);
        assert_eq!(result.scores[&'E'], 1);
        assert_eq!(result.scores[&'I'], 2);
        assert_eq!(result.code.to_string(), "ISFP");
        assert_eq!(result.group, TraderGroup::Explorer);
    }

    #[test]
    fn test_unrecognised_choice_selects_second_letter() {
        let result = score_answers(&[answer("q1", "C")]);
        assert_eq!(result.code.to_string(), "ISTJ");

        let result = score_answers(&[answer("q1", "Always")]);
        assert_eq!(result.code.letter(Dimension::EnergySource), 'I');
    }

    #[test]
    fn test_only_leading_token_is_read() {
        assert!(Choice::Text("A (not B)".into()).is_a());
        assert!(Choice::Text(" a ".into()).is_a());
        assert!(Choice::Text("(A) crowd".into()).is_a());
        assert!(Choice::Text("option a".into()).is_a());
        assert!(!Choice::Text("B (not A)".into()).is_a());
        assert!(!Choice::Text("Aggressive".into()).is_a());
        assert!(!Choice::Text("".into()).is_a());

        let result = score_answers(&[answer("q1", "A (not B)")]);
        assert_eq!(result.code.letter(Dimension::EnergySource), 'E');
    }

    #[test]
    fn test_option_object_choice() {
        let answers: Vec<Answer> = serde_json::from_value(serde_json::json!([
            { "id": "q3", "choice": { "id": "B", "text": "intuition" } }
        ]))
        .unwrap();
        let result = score_answers(&answers);
        assert_eq!(result.code.letter(Dimension::Judgment), 'F');
        assert_eq!(result.traits.decision_driver, "conviction and intuition");
    }

    #[test]
    fn test_code_parsing() {
        let code: TraderCode = "enfp".parse().unwrap();
        assert_eq!(code.to_string(), "ENFP");
        assert_eq!(code.group(), TraderGroup::Diplomat);
        assert_eq!(code.mirror().mirror(), code);
        assert!("ENF".parse::<TraderCode>().is_err());
        assert!("SNFP".parse::<TraderCode>().is_err());
        assert!("ENFPX".parse::<TraderCode>().is_err());
    }

    #[test]
    fn test_profile_prompt_mentions_code() {
        let result = score_answers(&[answer("q4", "B")]);
        let prompt = result.profile_prompt();
        assert!(prompt.contains("ESTP"));
        assert!(prompt.contains("high-frequency"));
    }

    #[test]
    fn test_questionnaire_shape() {
        let q = questionnaire();
        assert_eq!(q.questions.len(), 4);
        assert_eq!(q.questions[0].id, "q1");
        assert_eq!(q.questions[0].dimension, "E/I");
        assert_eq!(q.questions[3].dimension, "J/P");
    }
}
