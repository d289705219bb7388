use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use crate::models::*;
use crate::scheduler::Sm2Scheduler;
use crate::store::ProgressGateway;

// Import logging macros
use crate::{log_service_start, log_service_success};

const SERVICE: &str = "progress_tracker";

/// Flashcard score awarded per distinct card studied in a domain.
pub const FLASHCARD_POINTS: u32 = 5;
/// Weight of flashcard coverage in the mastery blend; quiz accuracy gets the rest.
pub const FLASHCARD_WEIGHT: f64 = 0.4;
pub const QUIZ_WEIGHT: f64 = 0.6;

/// Mastery (0-100) for a domain: capped flashcard coverage blended with quiz accuracy.
pub fn mastery_level(domain: &DomainProgress) -> u32 {
    let flashcard_score = domain
        .flashcards_studied
        .saturating_mul(FLASHCARD_POINTS)
        .min(100);
    let quiz_accuracy = percentage(domain.correct_answers, domain.questions_answered);

    // min(100) keeps loaded records with correct > answered in range
    (f64::from(flashcard_score) * FLASHCARD_WEIGHT + quiz_accuracy * QUIZ_WEIGHT)
        .round()
        .min(100.0) as u32
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole) * 100.0
    }
}

/// Counts `today` towards the study streak. Repeated calls on the same day are no-ops.
pub fn apply_study_streak(progress: &mut UserProgress, today: NaiveDate) {
    match progress.last_study_date {
        Some(last) if last == today => return,
        Some(last) if Some(last) == today.pred_opt() => progress.study_streak += 1,
        _ => progress.study_streak = 1,
    }
    progress.last_study_date = Some(today);
}

/// Owns the learner's progress record for the lifetime of a session.
///
/// The in-memory record is authoritative; every mutation is written through
/// to the gateway before the call returns.
pub struct ProgressTracker {
    progress: UserProgress,
    gateway: ProgressGateway,
    scheduler: Sm2Scheduler,
}

impl ProgressTracker {
    pub async fn load(gateway: ProgressGateway) -> Self {
        let progress = gateway.load().await;
        Self {
            progress,
            gateway,
            scheduler: Sm2Scheduler::new(),
        }
    }

    pub fn progress(&self) -> &UserProgress {
        &self.progress
    }

    pub async fn record_flashcard_study(
        &mut self,
        card_id: &str,
        domain_id: &str,
        quality: i32,
    ) -> CardSchedulingState {
        self.record_flashcard_study_at(card_id, domain_id, quality, Utc::now())
            .await
    }

    pub async fn record_flashcard_study_at(
        &mut self,
        card_id: &str,
        domain_id: &str,
        quality: i32,
        now: DateTime<Utc>,
    ) -> CardSchedulingState {
        log_service_start!(SERVICE, "record_flashcard_study", card_id = card_id, domain_id = domain_id);
        apply_study_streak(&mut self.progress, now.date_naive());

        // must be taken before the new state is stored
        let is_new_card = !self.progress.card_progress.contains_key(card_id);
        let current = self
            .progress
            .card_progress
            .get(card_id)
            .cloned()
            .unwrap_or_else(|| CardSchedulingState::new(card_id, now));

        let next = self.scheduler.compute_next_review(&current, quality, now);
        self.progress
            .card_progress
            .insert(card_id.to_string(), next.clone());

        if is_new_card {
            self.progress.total_flashcards_studied += 1;
        }
        let domain = self
            .progress
            .domain_progress
            .entry(domain_id.to_string())
            .or_default();
        if is_new_card {
            domain.flashcards_studied += 1;
        }
        domain.mastery_level = mastery_level(domain);
        let mastery = domain.mastery_level;

        self.gateway.save(&self.progress).await;
        log_service_success!(SERVICE, "record_flashcard_study", domain_id = domain_id, mastery = mastery);
        next
    }

    pub async fn record_quiz_answer(
        &mut self,
        question_id: &str,
        domain_id: &str,
        correct: bool,
        selected_answer: usize,
    ) -> QuizResult {
        self.record_quiz_answer_at(question_id, domain_id, correct, selected_answer, Utc::now())
            .await
    }

    pub async fn record_quiz_answer_at(
        &mut self,
        question_id: &str,
        domain_id: &str,
        correct: bool,
        selected_answer: usize,
        now: DateTime<Utc>,
    ) -> QuizResult {
        log_service_start!(SERVICE, "record_quiz_answer", question_id = question_id, domain_id = domain_id);
        apply_study_streak(&mut self.progress, now.date_naive());

        let result = QuizResult {
            question_id: question_id.to_string(),
            correct,
            selected_answer,
            timestamp: now,
        };
        self.progress.push_quiz_result(result.clone());

        self.progress.total_questions_answered += 1;
        if correct {
            self.progress.correct_answers += 1;
        }

        let domain = self
            .progress
            .domain_progress
            .entry(domain_id.to_string())
            .or_default();
        domain.questions_answered += 1;
        if correct {
            domain.correct_answers += 1;
        }
        domain.mastery_level = mastery_level(domain);
        let mastery = domain.mastery_level;

        self.gateway.save(&self.progress).await;
        log_service_success!(SERVICE, "record_quiz_answer", domain_id = domain_id, mastery = mastery);
        result
    }

    /// Unweighted mean of all recorded domain masteries, 0 when nothing is recorded.
    pub fn overall_mastery(&self) -> u32 {
        let domains = &self.progress.domain_progress;
        if domains.is_empty() {
            return 0;
        }
        let total: u32 = domains.values().map(|d| d.mastery_level).sum();
        (f64::from(total) / domains.len() as f64).round() as u32
    }

    pub fn domain_mastery(&self, domain_id: &str) -> u32 {
        self.progress
            .domain_progress
            .get(domain_id)
            .map(|d| d.mastery_level)
            .unwrap_or(0)
    }

    pub fn overall_accuracy(&self) -> u32 {
        percentage(
            self.progress.correct_answers,
            self.progress.total_questions_answered,
        )
        .round() as u32
    }

    pub fn card_state(&self, card_id: &str) -> Option<&CardSchedulingState> {
        self.progress.card_progress.get(card_id)
    }

    /// Cards whose next review is at or before `now`, most overdue first.
    pub fn due_cards(&self, now: DateTime<Utc>) -> Vec<CardSchedulingState> {
        let mut due: Vec<CardSchedulingState> = self
            .progress
            .card_progress
            .values()
            .filter(|card| card.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.next_review_at
                .cmp(&b.next_review_at)
                .then_with(|| a.card_id.cmp(&b.card_id))
        });
        due
    }

    /// Up to `limit` quiz results, newest first.
    pub fn recent_quiz_results(&self, limit: usize) -> Vec<QuizResult> {
        self.progress
            .quiz_history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> ProgressSummary {
        let domain_mastery: HashMap<String, u32> = self
            .progress
            .domain_progress
            .iter()
            .map(|(id, domain)| (id.clone(), domain.mastery_level))
            .collect();

        ProgressSummary {
            total_flashcards_studied: self.progress.total_flashcards_studied,
            total_questions_answered: self.progress.total_questions_answered,
            correct_answers: self.progress.correct_answers,
            overall_accuracy: self.overall_accuracy(),
            overall_mastery: self.overall_mastery(),
            study_streak: self.progress.study_streak,
            last_study_date: self.progress.last_study_date,
            cards_due: self.due_cards(now).len(),
            domain_mastery,
        }
    }

    /// Wipes stored progress and starts over from an empty record.
    pub async fn reset_progress(&mut self) {
        log_service_start!(SERVICE, "reset_progress");
        self.gateway.clear().await;
        self.progress = UserProgress::default();
        log_service_success!(SERVICE, "reset_progress", "progress reset to defaults");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::days(n)
    }

    fn domain(flashcards: u32, answered: u32, correct: u32) -> DomainProgress {
        DomainProgress {
            flashcards_studied: flashcards,
            questions_answered: answered,
            correct_answers: correct,
            mastery_level: 0,
        }
    }

    #[test]
    fn test_mastery_flashcards_only() {
        assert_eq!(mastery_level(&domain(10, 0, 0)), 20);
        assert_eq!(mastery_level(&domain(0, 0, 0)), 0);
    }

    #[test]
    fn test_mastery_blend() {
        assert_eq!(mastery_level(&domain(25, 10, 8)), 88);
        assert_eq!(mastery_level(&domain(20, 4, 4)), 100);
        assert_eq!(mastery_level(&domain(0, 3, 1)), 20);
    }

    #[test]
    fn test_flashcard_component_caps_at_twenty_cards() {
        for flashcards in [20, 21, 50, 10_000, u32::MAX] {
            assert_eq!(mastery_level(&domain(flashcards, 0, 0)), 40);
        }
    }

    #[test]
    fn test_mastery_bounds() {
        for flashcards in [0, 1, 7, 19, 20, 300] {
            for answered in [0u32, 1, 3, 10, 999] {
                for correct in [0, answered / 3, answered / 2, answered] {
                    let level = mastery_level(&domain(flashcards, answered, correct));
                    assert!(level <= 100, "mastery {} out of range", level);
                }
            }
        }
    }

    #[test]
    fn test_mastery_clamped_when_correct_exceeds_answered() {
        assert_eq!(mastery_level(&domain(20, 2, 9)), 100);
        assert_eq!(mastery_level(&domain(0, 1, u32::MAX)), 100);
    }

    #[test]
    fn test_streak_starts_at_one() {
        let mut progress = UserProgress::default();
        let today = day(0).date_naive();
        apply_study_streak(&mut progress, today);

        assert_eq!(progress.study_streak, 1);
        assert_eq!(progress.last_study_date, Some(today));
    }

    #[test]
    fn test_streak_same_day_is_idempotent() {
        let mut progress = UserProgress::default();
        let today = day(0).date_naive();
        apply_study_streak(&mut progress, today);
        progress.study_streak = 4;

        apply_study_streak(&mut progress, today);
        apply_study_streak(&mut progress, today);
        assert_eq!(progress.study_streak, 4);
    }

    #[test]
    fn test_streak_increments_from_yesterday() {
        let mut progress = UserProgress {
            study_streak: 3,
            last_study_date: Some(day(-1).date_naive()),
            ..UserProgress::default()
        };
        apply_study_streak(&mut progress, day(0).date_naive());

        assert_eq!(progress.study_streak, 4);
        assert_eq!(progress.last_study_date, Some(day(0).date_naive()));
    }

    #[test]
    fn test_streak_resets_after_gap() {
        for gap in [2, 3, 30] {
            let mut progress = UserProgress {
                study_streak: 12,
                last_study_date: Some(day(-gap).date_naive()),
                ..UserProgress::default()
            };
            apply_study_streak(&mut progress, day(0).date_naive());
            assert_eq!(progress.study_streak, 1);
        }
    }

    #[tokio::test]
    async fn test_new_card_counts_once() {
        let mut tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;

        tracker.record_flashcard_study_at("card-1", "d1", 4, day(0)).await;
        assert_eq!(tracker.progress().total_flashcards_studied, 1);
        assert_eq!(tracker.progress().domain_progress["d1"].flashcards_studied, 1);

        tracker.record_flashcard_study_at("card-1", "d1", 5, day(1)).await;
        assert_eq!(tracker.progress().total_flashcards_studied, 1);
        assert_eq!(tracker.progress().domain_progress["d1"].flashcards_studied, 1);

        tracker.record_flashcard_study_at("card-2", "d1", 1, day(1)).await;
        assert_eq!(tracker.progress().total_flashcards_studied, 2);
        assert_eq!(tracker.domain_mastery("d1"), 4);
    }

    #[tokio::test]
    async fn test_study_stores_scheduler_output() {
        let mut tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;

        let first = tracker.record_flashcard_study_at("card-1", "d1", 5, day(0)).await;
        assert_eq!(first.interval, 1);
        assert_eq!(tracker.card_state("card-1"), Some(&first));

        let second = tracker.record_flashcard_study_at("card-1", "d1", 5, day(1)).await;
        assert_eq!(second.interval, 6);
        assert_eq!(second.repetitions, 2);
        assert_eq!(second.next_review_at, day(7));
    }

    #[tokio::test]
    async fn test_quiz_answers_update_counters() {
        let mut tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;

        tracker.record_quiz_answer_at("q1", "d1", true, 0, day(0)).await;
        tracker.record_quiz_answer_at("q2", "d1", false, 3, day(0)).await;
        tracker.record_quiz_answer_at("q1", "d2", true, 1, day(0)).await;

        let progress = tracker.progress();
        assert_eq!(progress.total_questions_answered, 3);
        assert_eq!(progress.correct_answers, 2);
        assert_eq!(progress.domain_progress["d1"].questions_answered, 2);
        assert_eq!(progress.domain_progress["d1"].correct_answers, 1);
        assert_eq!(tracker.domain_mastery("d1"), 30);
        assert_eq!(tracker.domain_mastery("d2"), 60);
        assert_eq!(tracker.overall_mastery(), 45);
        assert_eq!(tracker.overall_accuracy(), 67);
        assert_eq!(progress.quiz_history.len(), 3);
        assert_eq!(progress.quiz_history[1].selected_answer, 3);
    }

    #[tokio::test]
    async fn test_masteries_default_to_zero() {
        let tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;
        assert_eq!(tracker.overall_mastery(), 0);
        assert_eq!(tracker.domain_mastery("unknown"), 0);
        assert_eq!(tracker.overall_accuracy(), 0);
    }

    #[tokio::test]
    async fn test_events_drive_streak() {
        let mut tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;

        tracker.record_flashcard_study_at("c1", "d1", 3, day(0)).await;
        tracker.record_quiz_answer_at("q1", "d1", true, 0, day(0)).await;
        assert_eq!(tracker.progress().study_streak, 1);

        tracker.record_quiz_answer_at("q2", "d1", true, 0, day(1)).await;
        assert_eq!(tracker.progress().study_streak, 2);

        tracker.record_flashcard_study_at("c2", "d1", 3, day(4)).await;
        assert_eq!(tracker.progress().study_streak, 1);
    }

    #[tokio::test]
    async fn test_due_cards_ordered_by_due_time() {
        let mut tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;

        tracker.record_flashcard_study_at("late", "d1", 5, day(0)).await;
        tracker.record_flashcard_study_at("late", "d1", 5, day(1)).await; // due day 7
        tracker.record_flashcard_study_at("soon", "d1", 0, day(2)).await; // due day 3
        tracker.record_flashcard_study_at("mid", "d1", 4, day(3)).await; // due day 4

        assert!(tracker.due_cards(day(2)).is_empty());

        let ids: Vec<String> = tracker
            .due_cards(day(5))
            .into_iter()
            .map(|card| card.card_id)
            .collect();
        assert_eq!(ids, vec!["soon".to_string(), "mid".to_string()]);
        assert_eq!(tracker.due_cards(day(7)).len(), 3);
        assert_eq!(tracker.summary(day(5)).cards_due, 2);
    }

    #[tokio::test]
    async fn test_recent_quiz_results_newest_first() {
        let mut tracker = ProgressTracker::load(ProgressGateway::in_memory()).await;
        for n in 0..5 {
            tracker
                .record_quiz_answer_at(&format!("q{}", n), "d1", n % 2 == 0, n, day(0))
                .await;
        }

        let recent = tracker.recent_quiz_results(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question_id, "q4");
        assert_eq!(recent[1].question_id, "q3");
        assert_eq!(tracker.recent_quiz_results(50).len(), 5);
    }

    #[tokio::test]
    async fn test_every_event_is_persisted() {
        let gateway = ProgressGateway::in_memory();
        let mut tracker = ProgressTracker::load(gateway.clone()).await;

        tracker.record_flashcard_study_at("c1", "d1", 5, day(0)).await;
        assert_eq!(&gateway.load().await, tracker.progress());

        tracker.record_quiz_answer_at("q1", "d1", false, 2, day(0)).await;
        assert_eq!(&gateway.load().await, tracker.progress());

        let reloaded = ProgressTracker::load(gateway).await;
        assert_eq!(reloaded.progress(), tracker.progress());
        assert_eq!(reloaded.domain_mastery("d1"), tracker.domain_mastery("d1"));
    }

    #[tokio::test]
    async fn test_reset_clears_memory_and_storage() {
        let gateway = ProgressGateway::in_memory();
        let mut tracker = ProgressTracker::load(gateway.clone()).await;
        tracker.record_flashcard_study_at("c1", "d1", 5, day(0)).await;
        tracker.record_quiz_answer_at("q1", "d1", true, 1, day(0)).await;

        tracker.reset_progress().await;

        assert_eq!(tracker.progress(), &UserProgress::default());
        assert_eq!(gateway.load().await, UserProgress::default());
        assert_eq!(tracker.overall_mastery(), 0);
    }
}
