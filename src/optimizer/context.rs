//! Per-statement optimizer state

use crate::planner::SubqueryId;
use std::collections::HashSet;

/// State shared by every rule invocation while one statement is optimized.
///
/// Holds the memo of subquery instances already turned into Apply nodes and
/// the counters behind synthetic column names and subquery ids. A context
/// belongs to a single statement and is dropped with it.
#[derive(Debug, Default)]
pub struct StatementContext {
    analyzed_subqueries: HashSet<SubqueryId>,
    next_column_id: u64,
    next_subquery_id: u64,
}

impl StatementContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh subquery id for a newly analyzed subquery expression
    pub fn next_subquery_id(&mut self) -> SubqueryId {
        self.next_subquery_id += 1;
        SubqueryId(self.next_subquery_id)
    }

    pub fn is_subquery_analyzed(&self, id: SubqueryId) -> bool {
        self.analyzed_subqueries.contains(&id)
    }

    /// Record that `id` has been converted. Returns false if it already was.
    pub fn mark_subquery_analyzed(&mut self, id: SubqueryId) -> bool {
        self.analyzed_subqueries.insert(id)
    }

    pub fn analyzed_count(&self) -> usize {
        self.analyzed_subqueries.len()
    }

    /// Unique synthetic column name, `$c$1`, `$c$2`, ...
    pub fn generate_column_name(&mut self) -> String {
        self.next_column_id += 1;
        format!("$c${}", self.next_column_id)
    }
}
