//! Logical plan wrapper and tree traversal utilities.

use std::fmt;
use std::sync::Arc;

use super::operator::LogicalOperator;
use super::PlanError;
use crate::data::SchemaRef;

/// A logical query plan.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPlan {
    /// Root operator.
    pub root: Arc<LogicalOperator>,
}

impl LogicalPlan {
    /// Creates a new logical plan.
    pub fn new(root: LogicalOperator) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// Creates from an Arc.
    pub fn from_arc(root: Arc<LogicalOperator>) -> Self {
        Self { root }
    }

    /// Returns the output schema.
    pub fn schema(&self) -> SchemaRef {
        self.root.schema()
    }

    /// Returns a formatted string representation of the plan.
    pub fn display(&self) -> String {
        let mut output = String::new();
        format_node(&self.root, 0, &mut output);
        output
    }

    /// Returns a detailed formatted string for EXPLAIN, including each
    /// operator's output schema.
    pub fn explain(&self) -> String {
        let mut output = String::new();
        explain_node(&self.root, 0, &mut output);
        output
    }
}

fn describe(op: &LogicalOperator) -> String {
    let names = |exprs: &[super::LogicalExpr]| {
        exprs
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    match op {
        LogicalOperator::Scan(scan) => {
            let mut line = format!("Scan: {}", scan.table);
            if let Some(proj) = &scan.projection {
                line.push_str(&format!(" projection={:?}", proj));
            }
            line
        }
        LogicalOperator::Projection(proj) => format!("Projection: {}", names(&proj.exprs)),
        LogicalOperator::Filter(filter) => format!("Filter: {}", filter.predicate),
        LogicalOperator::Aggregate(agg) => format!(
            "Aggregate: groupBy=[{}] aggr=[{}]",
            names(&agg.group_by),
            names(&agg.aggregates)
        ),
        LogicalOperator::Sort(sort) => {
            let mut line = format!("Sort: {}", names(&sort.order_by));
            if let Some(fetch) = sort.fetch {
                line.push_str(&format!(" fetch={}", fetch));
            }
            line
        }
        LogicalOperator::Distinct(_) => "Distinct".to_string(),
        LogicalOperator::Join(join) => {
            let keys: Vec<_> = join
                .on
                .iter()
                .map(|(l, r)| format!("{} = {}", l, r))
                .collect();
            let mut line = format!("Join: {} on=[{}]", join.join_type, keys.join(", "));
            if let Some(filter) = &join.filter {
                line.push_str(&format!(" filter={}", filter));
            }
            line
        }
        LogicalOperator::CrossJoin(_) => "CrossJoin".to_string(),
        LogicalOperator::Union(_) => "Union".to_string(),
        LogicalOperator::Limit(limit) => {
            format!("Limit: skip={} fetch={:?}", limit.skip, limit.fetch)
        }
        LogicalOperator::SubqueryAlias(alias) => format!("SubqueryAlias: {}", alias.alias),
        LogicalOperator::EmptyRelation(empty) => {
            format!("EmptyRelation: produce_one_row={}", empty.produce_one_row)
        }
    }
}

fn format_node(op: &LogicalOperator, indent: usize, output: &mut String) {
    output.push_str(&"  ".repeat(indent));
    output.push_str(&describe(op));
    output.push('\n');
    for child in op.inputs() {
        format_node(child, indent + 1, output);
    }
}

fn explain_node(op: &LogicalOperator, indent: usize, output: &mut String) {
    let prefix = "  ".repeat(indent);
    output.push_str(&format!("{}{}\n", prefix, describe(op)));
    output.push_str(&format!("{}  Schema: {}\n", prefix, op.schema()));
    for child in op.inputs() {
        explain_node(child, indent + 1, output);
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Visitor trait for traversing logical plans.
pub trait PlanVisitor {
    /// Called before visiting children. Returning false skips them.
    fn pre_visit(&mut self, op: &LogicalOperator) -> bool;
    /// Called after visiting children.
    fn post_visit(&mut self, _op: &LogicalOperator) {}
}

/// Visit a logical plan tree.
pub fn visit_plan<V: PlanVisitor>(op: &LogicalOperator, visitor: &mut V) {
    if visitor.pre_visit(op) {
        for child in op.inputs() {
            visit_plan(child, visitor);
        }
    }
    visitor.post_visit(op);
}

/// Rewrites a plan bottom-up. `f` sees each operator after its inputs have
/// been rewritten and returns `None` to keep it. Unchanged subtrees are
/// shared with the original plan.
pub fn transform_up<F, E>(op: &Arc<LogicalOperator>, f: &mut F) -> Result<Arc<LogicalOperator>, E>
where
    F: FnMut(&LogicalOperator) -> Result<Option<LogicalOperator>, E>,
    E: From<PlanError>,
{
    let with_children = rewrite_inputs(op, &mut |child| transform_up(child, f))?;
    Ok(match f(&with_children)? {
        Some(new_op) => Arc::new(new_op),
        None => with_children,
    })
}

/// Rewrites a plan top-down. `f` sees each operator before its inputs, and
/// recursion continues into the inputs of whatever `f` returned.
pub fn transform_down<F, E>(
    op: &Arc<LogicalOperator>,
    f: &mut F,
) -> Result<Arc<LogicalOperator>, E>
where
    F: FnMut(&LogicalOperator) -> Result<Option<LogicalOperator>, E>,
    E: From<PlanError>,
{
    let current = match f(op)? {
        Some(new_op) => Arc::new(new_op),
        None => op.clone(),
    };
    rewrite_inputs(&current, &mut |child| transform_down(child, f))
}

/// Applies `f` to every input of `op`, rebuilding `op` only if an input
/// changed.
fn rewrite_inputs<F, E>(op: &Arc<LogicalOperator>, f: &mut F) -> Result<Arc<LogicalOperator>, E>
where
    F: FnMut(&Arc<LogicalOperator>) -> Result<Arc<LogicalOperator>, E>,
    E: From<PlanError>,
{
    let inputs = op.inputs();
    if inputs.is_empty() {
        return Ok(op.clone());
    }
    let mut changed = false;
    let mut new_inputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let rewritten = f(input)?;
        changed |= !Arc::ptr_eq(&rewritten, input);
        new_inputs.push(rewritten);
    }
    if changed {
        Ok(Arc::new(op.with_new_inputs(new_inputs)?))
    } else {
        Ok(op.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnDataType, QualifiedField, Schema, TableReference};
    use crate::logical::{
        FilterOperator, LimitOperator, LogicalExpr, PlanResult, ProjectionOperator, ScanOperator,
    };

    fn sample_plan() -> Arc<LogicalOperator> {
        let schema = Schema::new(vec![
            QualifiedField::new("a", ColumnDataType::Long),
            QualifiedField::new("b", ColumnDataType::Utf8),
        ]);
        let scan: Arc<LogicalOperator> =
            Arc::new(ScanOperator::new(TableReference::new("t"), &schema).into());
        let filter: Arc<LogicalOperator> = Arc::new(
            FilterOperator::try_new(scan, LogicalExpr::col("a").gt(LogicalExpr::lit(1i64)))
                .unwrap()
                .into(),
        );
        Arc::new(
            ProjectionOperator::try_new(filter, vec![LogicalExpr::col("b")])
                .unwrap()
                .into(),
        )
    }

    struct NameCollector(Vec<&'static str>);

    impl PlanVisitor for NameCollector {
        fn pre_visit(&mut self, op: &LogicalOperator) -> bool {
            self.0.push(op.name());
            true
        }
    }

    #[test]
    fn test_display() {
        let plan = LogicalPlan::from_arc(sample_plan());
        let text = plan.display();
        assert_eq!(text, "Projection: b\n  Filter: a > 1\n    Scan: t\n");
        assert!(plan.explain().contains("Schema: [t.b: Utf8]"));
    }

    #[test]
    fn test_visit_order() {
        let mut collector = NameCollector(vec![]);
        visit_plan(&sample_plan(), &mut collector);
        assert_eq!(collector.0, vec!["Projection", "Filter", "Scan"]);
    }

    #[test]
    fn test_transform_without_change_shares_tree() {
        let plan = sample_plan();
        let same = transform_up(&plan, &mut |_| PlanResult::Ok(None)).unwrap();
        assert!(Arc::ptr_eq(&plan, &same));
        let same = transform_down(&plan, &mut |_| PlanResult::Ok(None)).unwrap();
        assert!(Arc::ptr_eq(&plan, &same));
    }

    #[test]
    fn test_transform_down_wraps_scan() {
        let plan = sample_plan();
        let limited = transform_down(&plan, &mut |op| {
            PlanResult::Ok(match op {
                LogicalOperator::Filter(filter) => {
                    let limit = LogicalOperator::Limit(LimitOperator {
                        input: filter.input.clone(),
                        skip: 0,
                        fetch: Some(10),
                    });
                    Some(LogicalOperator::Filter(FilterOperator {
                        input: Arc::new(limit),
                        predicate: filter.predicate.clone(),
                    }))
                }
                _ => None,
            })
        })
        .unwrap();
        let text = LogicalPlan::from_arc(limited).display();
        assert!(text.contains("Limit: skip=0 fetch=Some(10)"));
    }
}
