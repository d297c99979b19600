//! Interview workflow tracker.
//!
//! Holds, per interview, which phase the dialogue is in, how many answers each
//! phase has consumed, which expected fields have been extracted, and which
//! phases were abandoned at the question cap. Advanced exactly once per answer.
//!
//! A phase completes when every expected key holds a value. A phase that is
//! still incomplete after `MAX_QUESTIONS_PER_PHASE` answers is recorded as
//! failed and the interview moves on regardless.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interview::phases::{
    default_phases, find_phase, first_phase, next_phase, phase_index, PhaseConfig,
};

pub const MAX_QUESTIONS_PER_PHASE: u32 = 3;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Interview is already finished")]
    AlreadyFinished,

    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),
}

/// Field values extracted from one answer by the assessor.
/// `None` means the answer did not supply that key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldAssessment {
    #[serde(default)]
    pub fields: HashMap<String, Option<String>>,
}

/// Persisted per-interview workflow record (stored as JSONB).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_phase_id: String,
    #[serde(default)]
    pub question_counts: BTreeMap<String, u32>,
    /// phase id -> expected key -> extracted value
    #[serde(default)]
    pub fulfilled: BTreeMap<String, BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub failed_phases: Vec<String>,
    #[serde(default)]
    pub finished: bool,
}

/// What one answer did to the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Still in the same phase; the next question should target `missing_keys`.
    FollowUp {
        phase_id: String,
        missing_keys: Vec<String>,
    },
    /// Moved to a new phase. `failed` is set when `from` hit the question cap.
    Advanced {
        from: String,
        to: String,
        failed: bool,
    },
    /// The last phase closed; no more questions.
    Finished { failed: bool },
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        let mut state = WorkflowState {
            current_phase_id: first_phase().id.to_string(),
            question_counts: BTreeMap::new(),
            fulfilled: BTreeMap::new(),
            failed_phases: Vec::new(),
            finished: false,
        };
        state.enter_phase(first_phase());
        state
    }

    pub fn current_phase(&self) -> Result<&'static PhaseConfig, WorkflowError> {
        find_phase(&self.current_phase_id)
            .ok_or_else(|| WorkflowError::UnknownPhase(self.current_phase_id.clone()))
    }

    pub fn question_count(&self, phase_id: &str) -> u32 {
        self.question_counts.get(phase_id).copied().unwrap_or(0)
    }

    /// Applies one assessed answer to the current phase.
    pub fn apply_answer(
        &mut self,
        assessment: &FieldAssessment,
    ) -> Result<TurnOutcome, WorkflowError> {
        if self.finished {
            return Err(WorkflowError::AlreadyFinished);
        }
        let phase = self.current_phase()?;

        let count = self.question_counts.entry(phase.id.to_string()).or_insert(0);
        *count += 1;
        let count = *count;

        self.merge(phase, assessment);

        let missing = self.missing_keys(phase.id);
        if missing.is_empty() {
            return Ok(self.advance(phase, false));
        }

        if count >= MAX_QUESTIONS_PER_PHASE {
            if !self.failed_phases.iter().any(|p| p == phase.id) {
                self.failed_phases.push(phase.id.to_string());
            }
            return Ok(self.advance(phase, true));
        }

        Ok(TurnOutcome::FollowUp {
            phase_id: phase.id.to_string(),
            missing_keys: missing,
        })
    }

    /// Expected keys of `phase_id` still lacking a value, in table order.
    pub fn missing_keys(&self, phase_id: &str) -> Vec<String> {
        let Some(phase) = find_phase(phase_id) else {
            return Vec::new();
        };
        let values = self.fulfilled.get(phase_id);
        phase
            .expected_data
            .iter()
            .filter(|key| {
                values
                    .and_then(|v| v.get(**key))
                    .map_or(true, |value| value.is_none())
            })
            .map(|key| key.to_string())
            .collect()
    }

    /// Share of phases closed so far, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.finished {
            return 1.0;
        }
        let total = default_phases().len();
        let done = phase_index(&self.current_phase_id).unwrap_or(0);
        (done as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Extracted values across all phases, flattened to `key -> value`.
    pub fn collected_values(&self) -> BTreeMap<String, String> {
        self.fulfilled
            .values()
            .flat_map(|fields| fields.iter())
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }

    fn merge(&mut self, phase: &PhaseConfig, assessment: &FieldAssessment) {
        let values = self.fulfilled.entry(phase.id.to_string()).or_default();
        for key in phase.expected_data {
            let incoming = assessment
                .fields
                .get(*key)
                .and_then(|v| v.as_deref())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            match incoming {
                Some(value) => {
                    values.insert(key.to_string(), Some(value.to_string()));
                }
                None => {
                    values.entry(key.to_string()).or_insert(None);
                }
            }
        }
    }

    fn advance(&mut self, from: &PhaseConfig, failed: bool) -> TurnOutcome {
        match next_phase(from.id) {
            Some(next) => {
                self.current_phase_id = next.id.to_string();
                self.enter_phase(next);
                TurnOutcome::Advanced {
                    from: from.id.to_string(),
                    to: next.id.to_string(),
                    failed,
                }
            }
            None => {
                self.finished = true;
                TurnOutcome::Finished { failed }
            }
        }
    }

    fn enter_phase(&mut self, phase: &PhaseConfig) {
        let values = self.fulfilled.entry(phase.id.to_string()).or_default();
        for key in phase.expected_data {
            values.entry(key.to_string()).or_insert(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assess(pairs: &[(&str, Option<&str>)]) -> FieldAssessment {
        FieldAssessment {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(String::from)))
                .collect(),
        }
    }

    fn complete_intro() -> FieldAssessment {
        assess(&[
            ("name", Some("山田太郎")),
            ("affiliation", Some("東京大学 経済学部")),
            ("summary", Some("テニスサークルの代表を務めました")),
        ])
    }

    #[test]
    fn test_new_state_starts_at_first_phase_with_null_keys() {
        let state = WorkflowState::new();
        assert_eq!(state.current_phase_id, "self_introduction");
        assert!(!state.finished);
        assert_eq!(
            state.missing_keys("self_introduction"),
            vec!["name", "affiliation", "summary"]
        );
        assert!(state.fulfilled["self_introduction"].values().all(|v| v.is_none()));
    }

    #[test]
    fn test_complete_answer_advances_phase() {
        let mut state = WorkflowState::new();
        let outcome = state.apply_answer(&complete_intro()).unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Advanced {
                from: "self_introduction".into(),
                to: "motivation".into(),
                failed: false,
            }
        );
        assert_eq!(state.current_phase_id, "motivation");
        assert_eq!(state.question_count("self_introduction"), 1);
        assert!(state.failed_phases.is_empty());
        // the new phase's keys are initialised
        assert_eq!(state.fulfilled["motivation"].len(), 3);
    }

    #[test]
    fn test_partial_answer_asks_follow_up_for_missing_keys() {
        let mut state = WorkflowState::new();
        let outcome = state
            .apply_answer(&assess(&[("name", Some("山田太郎")), ("summary", None)]))
            .unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::FollowUp {
                phase_id: "self_introduction".into(),
                missing_keys: vec!["affiliation".into(), "summary".into()],
            }
        );
        assert_eq!(state.current_phase_id, "self_introduction");
    }

    #[test]
    fn test_fields_accumulate_across_answers() {
        let mut state = WorkflowState::new();
        state.apply_answer(&assess(&[("name", Some("山田"))])).unwrap();
        let outcome = state
            .apply_answer(&assess(&[
                ("affiliation", Some("京都大学")),
                ("summary", Some("留学経験があります")),
            ]))
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Advanced { failed: false, .. }));
        assert_eq!(
            state.fulfilled["self_introduction"]["name"].as_deref(),
            Some("山田")
        );
    }

    #[test]
    fn test_null_or_blank_never_erases_existing_value() {
        let mut state = WorkflowState::new();
        state.apply_answer(&assess(&[("name", Some("山田"))])).unwrap();
        state
            .apply_answer(&assess(&[("name", None), ("affiliation", Some("   "))]))
            .unwrap();
        assert_eq!(
            state.fulfilled["self_introduction"]["name"].as_deref(),
            Some("山田")
        );
        assert!(state.fulfilled["self_introduction"]["affiliation"].is_none());
    }

    #[test]
    fn test_unexpected_keys_are_ignored() {
        let mut state = WorkflowState::new();
        state
            .apply_answer(&assess(&[("hobby", Some("読書")), ("name", Some("山田"))]))
            .unwrap();
        assert!(!state.fulfilled["self_introduction"].contains_key("hobby"));
    }

    #[test]
    fn test_question_cap_forces_advance_and_marks_failure() {
        let mut state = WorkflowState::new();
        let empty = FieldAssessment::default();
        for _ in 0..MAX_QUESTIONS_PER_PHASE - 1 {
            assert!(matches!(
                state.apply_answer(&empty).unwrap(),
                TurnOutcome::FollowUp { .. }
            ));
        }
        let outcome = state.apply_answer(&empty).unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Advanced {
                from: "self_introduction".into(),
                to: "motivation".into(),
                failed: true,
            }
        );
        assert_eq!(state.failed_phases, vec!["self_introduction".to_string()]);
        assert_eq!(state.question_count("self_introduction"), MAX_QUESTIONS_PER_PHASE);
    }

    #[test]
    fn test_completion_on_last_allowed_answer_is_not_a_failure() {
        let mut state = WorkflowState::new();
        state.apply_answer(&FieldAssessment::default()).unwrap();
        state.apply_answer(&FieldAssessment::default()).unwrap();
        let outcome = state.apply_answer(&complete_intro()).unwrap();
        assert!(matches!(outcome, TurnOutcome::Advanced { failed: false, .. }));
        assert!(state.failed_phases.is_empty());
    }

    #[test]
    fn test_last_phase_finishes_interview() {
        let mut state = WorkflowState::new();
        let empty = FieldAssessment::default();
        let mut last = None;
        while !state.finished {
            last = Some(state.apply_answer(&empty).unwrap());
        }
        assert_eq!(last, Some(TurnOutcome::Finished { failed: true }));
        assert_eq!(state.failed_phases.len(), default_phases().len());
        assert_eq!(state.progress(), 1.0);
        assert_eq!(state.current_phase_id, "reverse_question");
    }

    #[test]
    fn test_finished_state_rejects_further_answers() {
        let mut state = WorkflowState::new();
        state.current_phase_id = "reverse_question".to_string();
        let outcome = state
            .apply_answer(&assess(&[("question", Some("研修制度について教えてください"))]))
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Finished { failed: false });

        let snapshot = state.clone();
        let err = state.apply_answer(&complete_intro()).unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyFinished));
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_unknown_phase_is_an_error() {
        let mut state = WorkflowState::new();
        state.current_phase_id = "retired_phase".to_string();
        assert!(matches!(
            state.apply_answer(&FieldAssessment::default()),
            Err(WorkflowError::UnknownPhase(_))
        ));
        assert_eq!(state.question_count("retired_phase"), 0);
    }

    #[test]
    fn test_progress_tracks_phase_position() {
        let mut state = WorkflowState::new();
        assert_eq!(state.progress(), 0.0);
        state.apply_answer(&complete_intro()).unwrap();
        let expected = 1.0 / default_phases().len() as f64;
        assert!((state.progress() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_state_survives_json_round_trip_through_db_column() {
        let mut state = WorkflowState::new();
        state.apply_answer(&assess(&[("name", Some("山田"))])).unwrap();
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["current_phase_id"], "self_introduction");
        assert_eq!(value["question_counts"]["self_introduction"], 1);
        assert!(value["fulfilled"]["self_introduction"]["summary"].is_null());
        let restored: WorkflowState = serde_json::from_value(value).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_assessment_tolerates_missing_fields_object() {
        let parsed: FieldAssessment = serde_json::from_str("{}").unwrap();
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn test_collected_values_skip_nulls() {
        let mut state = WorkflowState::new();
        state.apply_answer(&assess(&[("name", Some("山田"))])).unwrap();
        let values = state.collected_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values["name"], "山田");
    }
}
