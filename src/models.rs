use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Starting ease factor for a card that has never been reviewed.
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// Hard floor for the ease factor; intervals never shrink faster than this.
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Number of quiz results retained in history before the oldest are evicted.
pub const QUIZ_HISTORY_LIMIT: usize = 1000;

/// Spaced-repetition state for a single flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSchedulingState {
    pub card_id: String,
    pub ease_factor: f64,
    pub interval: u32, // days until the next review
    pub repetitions: u32, // consecutive reviews rated >= 3
    pub next_review_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl CardSchedulingState {
    /// State for a card that is studied for the first time at `now`.
    pub fn new(card_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            card_id: card_id.into(),
            ease_factor: DEFAULT_EASE_FACTOR,
            interval: 0,
            repetitions: 0,
            next_review_at: now,
            last_reviewed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_review_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainProgress {
    pub flashcards_studied: u32,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub mastery_level: u32, // derived, 0-100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub question_id: String,
    pub correct: bool,
    pub selected_answer: usize,
    pub timestamp: DateTime<Utc>,
}

/// The whole persisted progress record for one learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProgress {
    pub total_flashcards_studied: u32,
    pub total_questions_answered: u32,
    pub correct_answers: u32,
    pub domain_progress: HashMap<String, DomainProgress>,
    pub card_progress: HashMap<String, CardSchedulingState>,
    pub study_streak: u32,
    pub last_study_date: Option<NaiveDate>,
    pub quiz_history: Vec<QuizResult>,
}

impl UserProgress {
    /// Appends a result, evicting the oldest entries beyond the retention limit.
    pub fn push_quiz_result(&mut self, result: QuizResult) {
        self.quiz_history.push(result);
        if self.quiz_history.len() > QUIZ_HISTORY_LIMIT {
            let excess = self.quiz_history.len() - QUIZ_HISTORY_LIMIT;
            self.quiz_history.drain(..excess);
        }
    }
}

/// Coarse recall buckets offered by the flashcard UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityTier {
    Hard,
    Medium,
    Easy,
}

impl QualityTier {
    /// Buckets a raw 0-5 rating. Ratings below 0 count as `Hard`, above 5 as `Easy`.
    pub fn from_quality(quality: i32) -> Self {
        match quality {
            i32::MIN..=1 => QualityTier::Hard,
            2..=3 => QualityTier::Medium,
            _ => QualityTier::Easy,
        }
    }

    pub fn representative_quality(self) -> i32 {
        match self {
            QualityTier::Hard => 1,
            QualityTier::Medium => 3,
            QualityTier::Easy => 5,
        }
    }
}

/// Dashboard snapshot derived from `UserProgress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_flashcards_studied: u32,
    pub total_questions_answered: u32,
    pub correct_answers: u32,
    pub overall_accuracy: u32,
    pub overall_mastery: u32,
    pub study_streak: u32,
    pub last_study_date: Option<NaiveDate>,
    pub cards_due: usize,
    pub domain_mastery: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyFlashcardRequest {
    pub domain_id: String,
    pub quality: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerQuestionRequest {
    pub domain_id: String,
    pub correct: bool,
    pub selected_answer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallMastery {
    pub overall: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMastery {
    pub domain_id: String,
    pub mastery: u32,
}
