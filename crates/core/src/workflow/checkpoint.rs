//! Interrupt-before checkpoint types and the human decision contract
//! (§4.18).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agents::WorkflowState;
use crate::graph::models::ProblemId;

use super::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    SelectProblem,
    ApproveProposal,
    ReviewEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
    Edit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub feedback: Option<String>,
    pub edited_data: Option<Value>,
}

/// Apply an `edit` decision's typed patch to the field of `state` the
/// given checkpoint gates, using JSON-merge-patch semantics (RFC 7396):
/// object fields merge recursively, `null` removes a key, any other
/// value (including arrays) replaces wholesale.
pub fn apply_edit(checkpoint: CheckpointType, state: &mut WorkflowState, edited_data: &Value) -> Result<(), WorkflowError> {
    match checkpoint {
        CheckpointType::SelectProblem => {
            if let Some(id_str) = edited_data.get("problem_id").and_then(Value::as_str) {
                let uuid = Uuid::parse_str(id_str).map_err(|e| WorkflowError::InvalidEdit(e.to_string()))?;
                state.selected_problem_id = Some(ProblemId(uuid));
            }
        }
        CheckpointType::ApproveProposal => {
            if let Some(proposal) = &mut state.proposal {
                merge_into(proposal, edited_data)?;
            }
        }
        CheckpointType::ReviewEvaluation => {
            if let Some(evaluation) = &mut state.evaluation {
                merge_into(evaluation, edited_data)?;
            }
        }
    }
    Ok(())
}

fn merge_into<T>(target: &mut T, patch: &Value) -> Result<(), WorkflowError>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(&*target).map_err(|e| WorkflowError::InvalidEdit(e.to_string()))?;
    json_merge(&mut value, patch);
    *target = serde_json::from_value(value).map_err(|e| WorkflowError::InvalidEdit(e.to_string()))?;
    Ok(())
}

fn json_merge(base: &mut Value, patch: &Value) {
    if let Value::Object(patch_map) = patch {
        if !base.is_object() {
            *base = Value::Object(serde_json::Map::new());
        }
        let base_map = base.as_object_mut().expect("just coerced to object");
        for (k, v) in patch_map {
            if v.is_null() {
                base_map.remove(k);
            } else {
                json_merge(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    } else {
        *base = patch.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::llm::ContinuationProposal;
    use serde_json::json;

    #[test]
    fn select_problem_edit_sets_selected_id() {
        let mut state = WorkflowState::default();
        let id = ProblemId::new();
        apply_edit(CheckpointType::SelectProblem, &mut state, &json!({"problem_id": id.0.to_string()})).unwrap();
        assert_eq!(state.selected_problem_id, Some(id));
    }

    #[test]
    fn approve_proposal_edit_merges_fields_and_keeps_others() {
        let mut state = WorkflowState {
            proposal: Some(ContinuationProposal {
                title: "orig".into(),
                methodology: "m".into(),
                experimental_steps: vec!["a".into()],
                expected_outcome: "o".into(),
                confidence: 0.5,
            }),
            ..Default::default()
        };
        apply_edit(CheckpointType::ApproveProposal, &mut state, &json!({"title": "edited"})).unwrap();
        let p = state.proposal.unwrap();
        assert_eq!(p.title, "edited");
        assert_eq!(p.methodology, "m");
    }
}
