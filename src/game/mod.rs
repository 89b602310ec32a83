//! Debate game rules.
//!
//! - [`assessment`]: questionnaire scoring into a [`TraderCode`] and its mirror
//! - [`battle`]: judge balance parsing and the final [`Verdict`]

pub mod assessment;
pub mod battle;

pub use assessment::{
    Answer, Assessment, Choice, Dimension, Questionnaire, TraderCode, TraderGroup, TraderTraits,
    questionnaire, score_answers,
};
pub use battle::{Verdict, VerdictReport, parse_judge_balance};
