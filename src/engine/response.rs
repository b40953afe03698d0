//! Deterministic response assembly
//!
//! Pure function from final run state to user-facing text and confidence.
//! No oracle is consulted here; assembling the same state twice yields
//! identical output.
//!
//! Priority order: clarification, degraded run, gate rejection, early exit,
//! recommendations-first rendering, diagnosis-primary rendering. At most the
//! first few validation warnings are appended under "Notes".

use crate::config::EngineConfig;
use crate::engine::classify::QueryClassifier;
use crate::engine::state::RunState;

/// Assemble the final response text and confidence from run state
pub fn assemble(
    state: &RunState,
    config: &EngineConfig,
    classifier: &dyn QueryClassifier,
) -> (String, f64) {
    if let Some(question) = &state.clarification {
        return (question.clone(), 0.0);
    }

    if let Some(message) = &state.degraded {
        return (
            format!("I encountered an error processing your request: {}", message),
            0.0,
        );
    }

    if let Some(gate) = &state.gate {
        if !gate.valid {
            let reason = gate.reason.as_deref().unwrap_or("Invalid request");
            return (format!("Unable to process query: {}", reason), 0.0);
        }
    }

    if let Some(exit) = &state.early_exit {
        let text = exit
            .response
            .clone()
            .or_else(|| state.diagnosis.as_ref().map(|d| d.summary.clone()))
            .unwrap_or_default();
        return (text, exit.confidence);
    }

    let mut parts = Vec::new();
    parts.push("# Analysis Results\n".to_string());
    parts.push(format!("**Query**: {}\n", state.query));

    let validated = &state.validated_recommendations;
    let diagnosis = state.diagnosis.as_ref();

    if !validated.is_empty() {
        parts.push("\n## Recommendations".to_string());
        for (i, rec) in validated.iter().enumerate() {
            parts.push(format!(
                "\n### {}. [{}] {}",
                i + 1,
                rec.priority.as_str().to_uppercase(),
                rec.action
            ));
            parts.push(format!("**Why**: {}", rec.reason));
            if let Some(impact) = &rec.expected_impact {
                parts.push(format!("**Expected Impact**: {}", impact));
            }
        }

        // The diagnosis section rides along only when it carries real content
        // and the query is not a short follow-up
        if let Some(diagnosis) = diagnosis {
            if diagnosis.summary.len() > config.diagnosis_summary_min_chars
                && !classifier.is_follow_up(&state.query)
            {
                parts.push("\n## Diagnosis".to_string());
                parts.push(format!(
                    "**Severity**: {}",
                    diagnosis.severity.as_str().to_uppercase()
                ));
                parts.push(format!("\n{}\n", diagnosis.summary));
                if !diagnosis.root_causes.is_empty() {
                    parts.push("\n**Root Causes**:".to_string());
                    for cause in &diagnosis.root_causes {
                        parts.push(format!("- {}", cause));
                    }
                }
            }
        }
    } else if let Some(diagnosis) = diagnosis {
        parts.push("\n## Diagnosis".to_string());
        parts.push(format!(
            "**Severity**: {}",
            diagnosis.severity.as_str().to_uppercase()
        ));
        if !diagnosis.summary.is_empty() {
            parts.push(format!("\n{}\n", diagnosis.summary));
        }
        if !diagnosis.root_causes.is_empty() {
            parts.push("\n**Root Causes**:".to_string());
            for cause in &diagnosis.root_causes {
                parts.push(format!("- {}", cause));
            }
        }
    }

    if !state.validation_warnings.is_empty() {
        parts.push("\n## Notes".to_string());
        for warning in state.validation_warnings.iter().take(config.max_response_notes) {
            parts.push(format!("- {}", warning));
        }
    }

    (parts.join("\n"), state.recommendation_confidence)
}
