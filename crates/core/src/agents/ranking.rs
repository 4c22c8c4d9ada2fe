//! Ranking agent: queries the graph for candidate problems and asks the
//! LLM to score and order them (§4.17).

use std::sync::Arc;

use async_trait::async_trait;

use crate::graph::repository::Repository;

use super::{Agent, AgentError, ResearchLlm, WorkflowState};

pub struct RankingAgent<L: ResearchLlm> {
    repository: Arc<dyn Repository>,
    llm: L,
}

impl<L: ResearchLlm> RankingAgent<L> {
    pub fn new(repository: Arc<dyn Repository>, llm: L) -> Self {
        Self { repository, llm }
    }
}

#[async_trait]
impl<L: ResearchLlm> Agent for RankingAgent<L> {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, AgentError> {
        let candidates = self
            .repository
            .list_problems(state.status_filter, state.domain_filter.as_deref(), state.candidate_limit)
            .await?;

        let mut ranked = self.llm.rank_problems(&candidates).await?;
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        state.ranked = ranked;
        Ok(state)
    }
}
