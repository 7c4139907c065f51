//! Query optimizer module
//!
//! Rule-based rewriting of logical plans. Rules see one node at a time and
//! either return a replacement or decline; the [`Optimizer`] walks the tree
//! and repeats until the plan stops changing.

mod context;
mod rules;

pub use context::StatementContext;
pub use rules::*;

use crate::error::Result;
use crate::planner::LogicalPlan;
use std::sync::Arc;
use tracing::debug;

/// Optimizer trait for plan transformations
pub trait OptimizerRule: Send + Sync {
    /// Name of this rule
    fn name(&self) -> &str;

    /// Rewrite `plan` if the rule matches it. `Ok(None)` leaves the node as is.
    fn try_rewrite(
        &self,
        plan: &LogicalPlan,
        ctx: &mut StatementContext,
    ) -> Result<Option<LogicalPlan>>;
}

/// Main optimizer that applies rules to logical plans
pub struct Optimizer {
    rules: Vec<Arc<dyn OptimizerRule>>,
    max_iterations: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self::with_rules(vec![
            // Bridge first so the projection it creates is handled next pass
            Arc::new(rules::OneRowRelationSubqueryToApply),
            Arc::new(rules::FilterSubqueryToApply),
            Arc::new(rules::ProjectSubqueryToApply),
            Arc::new(rules::JoinSubqueryToApply),
        ])
    }

    /// Create optimizer with custom rules
    pub fn with_rules(rules: Vec<Arc<dyn OptimizerRule>>) -> Self {
        Self {
            rules,
            max_iterations: 10,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Optimize a logical plan within the given statement's context
    pub fn optimize(&self, plan: LogicalPlan, ctx: &mut StatementContext) -> Result<LogicalPlan> {
        let mut current = plan;

        for iter in 0..self.max_iterations {
            let (new_plan, changed) = self.rewrite_tree(&current, ctx)?;
            current = new_plan;
            if !changed {
                debug!(iterations = iter + 1, "optimizer reached fixpoint");
                return Ok(current);
            }
        }

        debug!(max_iterations = self.max_iterations, "optimizer stopped at iteration limit");
        Ok(current)
    }

    /// One bottom-up pass. Each node is offered to the rules after its
    /// children; the first rule that fires replaces it for this pass.
    fn rewrite_tree(
        &self,
        plan: &LogicalPlan,
        ctx: &mut StatementContext,
    ) -> Result<(LogicalPlan, bool)> {
        let mut changed = false;
        let mut new_children = Vec::new();
        for child in plan.children() {
            let (new_child, child_changed) = self.rewrite_tree(child, ctx)?;
            changed |= child_changed;
            new_children.push(Arc::new(new_child));
        }

        let node = if changed {
            plan.with_new_children(new_children)?
        } else {
            plan.clone()
        };

        for rule in &self.rules {
            if let Some(rewritten) = rule.try_rewrite(&node, ctx)? {
                debug!(rule = rule.name(), "rule fired");
                return Ok((rewritten, true));
            }
        }
        Ok((node, changed))
    }
}
