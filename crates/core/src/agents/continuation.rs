//! Continuation agent: loads the selected problem's full context and
//! produces a typed `ContinuationProposal` (§4.17).

use std::sync::Arc;

use async_trait::async_trait;

use crate::graph::repository::Repository;

use super::{Agent, AgentError, ResearchLlm, WorkflowState};

pub struct ContinuationAgent<L: ResearchLlm> {
    repository: Arc<dyn Repository>,
    llm: L,
}

impl<L: ResearchLlm> ContinuationAgent<L> {
    pub fn new(repository: Arc<dyn Repository>, llm: L) -> Self {
        Self { repository, llm }
    }
}

#[async_trait]
impl<L: ResearchLlm> Agent for ContinuationAgent<L> {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, AgentError> {
        let problem_id = state
            .selected_problem_id
            .ok_or_else(|| AgentError::MissingState("selected_problem_id".to_string()))?;

        let problem = self
            .repository
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| AgentError::MissingState(format!("problem {problem_id} not found")))?;

        let mut related = Vec::with_capacity(problem.related_problem_ids.len());
        for related_id in &problem.related_problem_ids {
            if let Some(r) = self.repository.get_problem(*related_id).await? {
                related.push(r);
            }
        }

        let proposal = self.llm.propose_continuation(&problem, &related).await?;
        state.proposal = Some(proposal);
        Ok(state)
    }
}
