use std::fmt::Debug;
use std::sync::Arc;
use log::{debug, warn};
use crate::Result;
use crate::analysis::check_analysis::check_analysis;
use crate::analysis::cleanup::{CleanupAliases, EliminateSubqueryAliases, PullOutNondeterministic};
use crate::analysis::functions::{
    ExtractGenerator, GlobalAggregates, ResolveAggregateFunctions, ResolveAliases,
    ResolveFunctions, ResolveGenerate,
};
use crate::analysis::grouping::{ResolveGroupingAnalytics, ResolvePivot};
use crate::analysis::object::{HandleNullInputsForUDF, ResolveDeserializer, ResolveNewInstance, ResolveUpCast};
use crate::analysis::ordinals::{ResolveMissingReferences, ResolveOrdinalInOrderByAndGroupBy};
use crate::analysis::resolution::{ResolveReferences, ResolveRelations};
use crate::analysis::substitution::{CTESubstitution, EliminateUnions, WindowsSubstitution};
use crate::analysis::subquery::ResolveSubquery;
use crate::analysis::time_window::TimeWindowing;
use crate::analysis::type_coercion::type_coercion_rules;
use crate::analysis::window::{ExtractWindowExpressions, ResolveWindowFrame, ResolveWindowOrder};
use crate::catalog::Catalog;
use crate::config::AnalyzerConfig;
use crate::logical_plan::LogicalPlan;
use crate::tree_node::Transformed;

pub trait AnalyzerRule: Debug {
    /// Rewrite `plan`
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>>;

    /// A human readable name for this analyzer rule
    fn name(&self) -> &str;
}

#[derive(Clone, Copy, Debug)]
pub enum Strategy {
    /// One full pass over the rule list.
    Once,
    /// Re-run the rule list until a pass changes nothing, up to the given
    /// number of passes.
    FixedPoint(usize),
}

pub struct Batch {
    pub name: &'static str,
    pub strategy: Strategy,
    pub rules: Vec<Arc<dyn AnalyzerRule>>,
}

impl Batch {
    pub fn new(name: &'static str, strategy: Strategy, rules: Vec<Arc<dyn AnalyzerRule>>) -> Self {
        Self { name, strategy, rules }
    }
}

/// Turns an unresolved logical plan into a resolved one by driving the rule
/// batches to their fixed points, then asserts every analysis invariant.
pub struct Analyzer {
    catalog: Arc<dyn Catalog>,
    config: AnalyzerConfig,
    extended_resolution_rules: Vec<Arc<dyn AnalyzerRule>>,
}

impl Analyzer {
    pub fn new(catalog: Arc<dyn Catalog>, config: AnalyzerConfig) -> Self {
        Self { catalog, config, extended_resolution_rules: vec![] }
    }

    /// Appends caller-supplied rules to the end of the resolution batch,
    /// after type coercion.
    pub fn with_extended_resolution_rules(
        mut self,
        rules: Vec<Arc<dyn AnalyzerRule>>,
    ) -> Self {
        self.extended_resolution_rules = rules;
        self
    }

    pub fn analyze(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let plan = self.execute(plan)?;
        check_analysis(&plan)?;
        Ok(plan)
    }

    /// Runs the batches without the terminal check. Rules that re-analyze
    /// speculative plans (HAVING push-down, subqueries) call this.
    pub fn execute(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut plan = plan;
        for batch in self.batches() {
            plan = self.execute_batch(&batch, plan)?;
        }
        Ok(plan)
    }

    /// The order of the rules inside the resolution batch is semantically
    /// significant; do not reorder.
    fn batches(&self) -> Vec<Batch> {
        let catalog = &self.catalog;
        let config = &self.config;
        let mut resolution_rules: Vec<Arc<dyn AnalyzerRule>> = vec![
            Arc::new(ResolveRelations::new(catalog.clone(), config.clone())),
            Arc::new(ResolveReferences::new(config.clone())),
            Arc::new(ResolveDeserializer::new(config.clone())),
            Arc::new(ResolveNewInstance),
            Arc::new(ResolveUpCast),
            Arc::new(ResolveGroupingAnalytics::new(config.clone())),
            Arc::new(ResolvePivot),
            Arc::new(ResolveOrdinalInOrderByAndGroupBy::new(config.clone())),
            Arc::new(ResolveMissingReferences::new(config.clone())),
            Arc::new(ExtractGenerator),
            Arc::new(ResolveGenerate),
            Arc::new(ResolveFunctions::new(catalog.clone())),
            Arc::new(ResolveAliases),
            Arc::new(ResolveSubquery::new(catalog.clone(), config.clone())),
            Arc::new(ResolveWindowOrder),
            Arc::new(ResolveWindowFrame),
            Arc::new(ExtractWindowExpressions),
            Arc::new(GlobalAggregates),
            Arc::new(ResolveAggregateFunctions::new(catalog.clone(), config.clone())),
            Arc::new(TimeWindowing),
        ];
        resolution_rules.extend(type_coercion_rules());
        resolution_rules.extend(self.extended_resolution_rules.iter().cloned());

        vec![
            Batch::new(
                "Substitution",
                Strategy::FixedPoint(self.config.optimizer_max_iterations),
                vec![
                    Arc::new(CTESubstitution::new(config.clone())),
                    Arc::new(WindowsSubstitution),
                    Arc::new(EliminateUnions),
                ],
            ),
            Batch::new(
                "Resolution",
                Strategy::FixedPoint(self.config.optimizer_max_iterations),
                resolution_rules,
            ),
            Batch::new("Nondeterministic", Strategy::Once, vec![Arc::new(PullOutNondeterministic)]),
            Batch::new("UDF", Strategy::Once, vec![Arc::new(HandleNullInputsForUDF)]),
            Batch::new(
                "Cleanup",
                Strategy::FixedPoint(self.config.optimizer_max_iterations),
                vec![Arc::new(CleanupAliases), Arc::new(EliminateSubqueryAliases)],
            ),
        ]
    }

    fn execute_batch(&self, batch: &Batch, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut plan = plan;
        let mut iteration = 0;
        loop {
            iteration += 1;
            let mut changed = false;
            for rule in &batch.rules {
                let t = rule.analyze(plan)?;
                plan = t.data;
                if t.transformed {
                    debug!(
                        "batch {} iteration {}: rule {} changed the plan",
                        batch.name,
                        iteration,
                        rule.name()
                    );
                    changed = true;
                }
            }
            match batch.strategy {
                Strategy::Once => break,
                Strategy::FixedPoint(max) => {
                    if !changed {
                        break;
                    }
                    if iteration >= max {
                        warn!(
                            "batch {} did not converge after {} iterations",
                            batch.name, max
                        );
                        return Err(format!(
                            "Max iterations ({}) reached for batch {}",
                            max, batch.name
                        )
                        .into());
                    }
                }
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use super::*;
    use crate::analysis::function_registry;
    use crate::catalog::MemoryCatalog;
    use crate::expr::expr_fn::*;
    use crate::expr::{
        Expr, ExprId, TimeWindow, UnresolvedWindowExpression, WindowExpression, WindowFrame,
        WindowSpec,
    };
    use crate::logical_plan::*;
    use crate::tree_node::{TreeNode, TreeNodeRecursion};
    use crate::types::{DataType, Field, Schema};

    fn init_logger() {
        let _ = flexi_logger::Logger::try_with_env_or_str("info").map(|l| l.start());
    }

    fn test_catalog() -> Arc<MemoryCatalog> {
        let catalog = MemoryCatalog::new();
        catalog.register_table(
            "t",
            &Schema::new(vec![
                Field::new("a", DataType::Int),
                Field::new("b", DataType::Long),
                Field::new("c", DataType::Long),
                Field::new("ds", DataType::Array(Box::new(DataType::String))),
            ]),
        );
        catalog.register_table(
            "t1",
            &Schema::new(vec![
                Field::new("a", DataType::Int),
                Field::new("b", DataType::Long),
            ]),
        );
        catalog.register_table(
            "t2",
            &Schema::new(vec![
                Field::new("a", DataType::Int),
                Field::new("d", DataType::Long),
            ]),
        );
        catalog.register_table(
            "events",
            &Schema::new(vec![
                Field::new("ts", DataType::Timestamp),
                Field::new("v", DataType::Long),
            ]),
        );
        Arc::new(catalog)
    }

    fn analyzer() -> Analyzer {
        init_logger();
        Analyzer::new(test_catalog(), crate::config::AnalyzerConfig::default())
    }

    fn analyze(plan: LogicalPlan) -> crate::Result<LogicalPlan> {
        analyzer().analyze(plan)
    }

    fn table(name: &str) -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::UnresolvedRelation(UnresolvedRelation::new(
            TableIdentifier::new(name),
        )))
    }

    fn ua(e: Expr) -> Expr {
        Expr::UnresolvedAlias(Box::new(e))
    }

    fn project(list: Vec<Expr>, child: Arc<LogicalPlan>) -> LogicalPlan {
        LogicalPlan::Project(Project::new(list, child))
    }

    /// Debug rendering with expression ids renumbered in first-seen order,
    /// for comparisons that must hold modulo freshly minted ids.
    fn normalized(plan: &LogicalPlan) -> String {
        let text = format!("{:?}", plan);
        let mut mapping: HashMap<u64, u64> = HashMap::new();
        let mut out = String::with_capacity(text.len());
        let mut rest = text.as_str();
        while let Some(pos) = rest.find("expr_id: ") {
            let (head, tail) = rest.split_at(pos + "expr_id: ".len());
            out.push_str(head);
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            let id: u64 = digits.parse().unwrap();
            let next = mapping.len() as u64;
            let normalized_id = *mapping.entry(id).or_insert(next);
            out.push_str(&normalized_id.to_string());
            rest = &tail[digits.len()..];
        }
        out.push_str(rest);
        out
    }

    fn collect_output_ids(plan: &LogicalPlan) -> Vec<ExprId> {
        plan.output().iter().map(|a| a.expr_id).collect()
    }

    fn assert_fully_resolved(plan: &LogicalPlan) {
        plan.apply(|p| {
            assert!(p.resolved(), "unresolved operator left behind: {:?}", p);
            for e in p.expressions() {
                assert!(e.resolved(), "unresolved expression left behind: {:?}", e);
            }
            Ok(TreeNodeRecursion::Continue)
        })
        .unwrap();
    }

    #[test]
    fn test_cte_scenario() {
        // WITH x AS (SELECT 1 AS a) SELECT a FROM x
        let cte = LogicalPlan::SubqueryAlias(SubqueryAlias::new(
            "x",
            Arc::new(project(
                vec![Expr::int_lit(1).alias("a")],
                Arc::new(LogicalPlan::OneRowRelation),
            )),
        ));
        let plan = LogicalPlan::With(With::new(
            Arc::new(project(vec![col("a")], table("x"))),
            vec![("x".to_string(), Arc::new(cte))],
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let LogicalPlan::Project(outer) = &analyzed else {
            panic!("expected project, got {:?}", analyzed);
        };
        let LogicalPlan::Project(inner) = outer.child.as_ref() else {
            panic!("expected inner project, got {:?}", outer.child);
        };
        assert_eq!(inner.child.as_ref(), &LogicalPlan::OneRowRelation);
        // the outer reference binds to the alias minted inside the CTE
        let outer_attr = outer.project_list[0].to_attribute().unwrap();
        let inner_attr = inner.project_list[0].to_attribute().unwrap();
        assert_eq!(outer_attr.name, "a");
        assert_eq!(outer_attr.expr_id, inner_attr.expr_id);
    }

    #[test]
    fn test_having_scenario() {
        // SELECT a, SUM(b) FROM t GROUP BY a HAVING SUM(b) > 0
        let agg = LogicalPlan::Aggregate(Aggregate::new(
            vec![col("a")],
            vec![col("a"), ua(sum(col("b")))],
            table("t"),
        ));
        let plan = LogicalPlan::Filter(Filter::new(
            sum(col("b")).gt(Expr::long_lit(0)),
            Arc::new(agg),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let LogicalPlan::Project(p) = &analyzed else {
            panic!("expected project on top, got {:?}", analyzed);
        };
        assert_eq!(p.project_list.len(), 2);
        let LogicalPlan::Filter(f) = p.child.as_ref() else {
            panic!("expected filter, got {:?}", p.child);
        };
        // the filter references the aggregate pushed below it
        let Expr::AttributeReference(cond_attr) = &f.condition else {
            panic!("expected bare attribute condition, got {:?}", f.condition);
        };
        let LogicalPlan::Aggregate(a) = f.child.as_ref() else {
            panic!("expected aggregate, got {:?}", f.child);
        };
        assert_eq!(a.aggregate_exprs.len(), 3);
        assert!(a
            .aggregate_exprs
            .iter()
            .any(|e| e.to_attribute().map(|x| x.expr_id) == Some(cond_attr.expr_id)));
    }

    #[test]
    fn test_window_scenario() {
        // SELECT a, SUM(b) OVER (PARTITION BY a) FROM t
        let we = Expr::WindowExpression(WindowExpression::new(
            sum(col("b")),
            WindowSpec::unspecified_frame(vec![col("a")], vec![]),
        ));
        let plan = project(vec![col("a"), ua(we)], table("t"));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let LogicalPlan::Project(outer) = &analyzed else {
            panic!("expected project, got {:?}", analyzed);
        };
        assert_eq!(outer.project_list.len(), 2);
        let LogicalPlan::Window(w) = outer.child.as_ref() else {
            panic!("expected window, got {:?}", outer.child);
        };
        assert_eq!(w.window_expressions.len(), 1);
        assert_eq!(w.partition_spec.len(), 1);
        assert!(w.order_spec.is_empty());
        let LogicalPlan::Project(inner) = w.child.as_ref() else {
            panic!("expected lifted projection, got {:?}", w.child);
        };
        let names: Vec<_> = inner
            .project_list
            .iter()
            .filter_map(|e| e.to_attribute().map(|a| a.name))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        // the filled-in frame exists and the aggregate lives inside the window
        assert!(w.window_expressions[0]
            .exists(|e| Ok(matches!(e, Expr::AggregateExpression(_))))
            .unwrap());
    }

    #[test]
    fn test_self_join_dedup_scenario() {
        // SELECT * FROM t1 JOIN t1
        let plan = project(
            vec![star()],
            Arc::new(LogicalPlan::Join(Join::new(
                table("t1"),
                table("t1"),
                JoinType::Inner,
                None,
            ))),
        );
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        analyzed
            .apply(|p| {
                if let LogicalPlan::Join(j) = p {
                    let left: Vec<_> = collect_output_ids(&j.left);
                    let right: Vec<_> = collect_output_ids(&j.right);
                    assert!(
                        left.iter().all(|id| !right.contains(id)),
                        "join sides share ids: {:?} vs {:?}",
                        left,
                        right
                    );
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
    }

    #[test]
    fn test_order_by_unprojected_column_scenario() {
        // SELECT a FROM t ORDER BY b
        let plan = LogicalPlan::Sort(Sort::new(
            vec![col("b").asc()],
            true,
            Arc::new(project(vec![col("a")], table("t"))),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let LogicalPlan::Project(outer) = &analyzed else {
            panic!("expected stripping project, got {:?}", analyzed);
        };
        assert_eq!(outer.project_list.len(), 1);
        assert_eq!(outer.project_list[0].to_attribute().unwrap().name, "a");
        let LogicalPlan::Sort(s) = outer.child.as_ref() else {
            panic!("expected sort, got {:?}", outer.child);
        };
        let LogicalPlan::Project(inner) = s.child.as_ref() else {
            panic!("expected widened project, got {:?}", s.child);
        };
        let names: Vec<_> = inner
            .project_list
            .iter()
            .filter_map(|e| e.to_attribute().map(|a| a.name))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_cube_scenario() {
        // SELECT a, b, SUM(c) FROM t GROUP BY CUBE(a, b)
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![Expr::Cube(vec![col("a"), col("b")])],
            vec![col("a"), col("b"), ua(sum(col("c")))],
            table("t"),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let LogicalPlan::Aggregate(a) = &analyzed else {
            panic!("expected aggregate, got {:?}", analyzed);
        };
        // a, b and the grouping id
        assert_eq!(a.grouping_exprs.len(), 3);
        let LogicalPlan::Expand(e) = a.child.as_ref() else {
            panic!("expected expand, got {:?}", a.child);
        };
        assert_eq!(e.projections.len(), 4);
        // expanded grouping columns are nullable, the grouping id is not
        let n = e.output.len();
        assert!(e.output[n - 2].nullable);
        assert!(!e.output[n - 1].nullable);
    }

    #[test]
    fn test_explode_relocated_into_generate() {
        // SELECT a, explode(ds) FROM t
        let plan = project(vec![col("a"), ua(call("explode", vec![col("ds")]))], table("t"));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let LogicalPlan::Project(p) = &analyzed else {
            panic!("expected project, got {:?}", analyzed);
        };
        let LogicalPlan::Generate(g) = p.child.as_ref() else {
            panic!("expected generate, got {:?}", p.child);
        };
        assert!(g.join);
        assert_eq!(g.generator_output.len(), 1);
        // no generator remains in any projection list
        analyzed
            .apply(|node| {
                if let LogicalPlan::Project(p) = node {
                    for e in &p.project_list {
                        assert!(
                            !e.exists(|e| Ok(matches!(e, Expr::Generator(_)))).unwrap(),
                            "generator left in projection: {:?}",
                            e
                        );
                    }
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
    }

    #[test]
    fn test_two_generators_rejected() {
        let plan = project(
            vec![
                ua(call("explode", vec![col("ds")])),
                ua(call("explode", vec![col("ds")])),
            ],
            table("t"),
        );
        let err = analyze(plan).unwrap_err();
        assert!(err.message.contains("Only one generator allowed"), "{}", err);
    }

    #[test]
    fn test_idempotence() {
        let plan = LogicalPlan::Filter(Filter::new(
            sum(col("b")).gt(Expr::long_lit(0)),
            Arc::new(LogicalPlan::Aggregate(Aggregate::new(
                vec![col("a")],
                vec![col("a"), ua(sum(col("b")))],
                table("t"),
            ))),
        ));
        let once = analyze(plan).unwrap();
        let twice = analyzer().analyze(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_determinism_modulo_ids() {
        let build = || {
            LogicalPlan::Aggregate(Aggregate::new(
                vec![col("a")],
                vec![col("a"), ua(sum(col("b")))],
                Arc::new(LogicalPlan::Filter(Filter::new(
                    col("a").gt(Expr::int_lit(1)),
                    table("t"),
                ))),
            ))
        };
        let first = analyze(build()).unwrap();
        let second = analyze(build()).unwrap();
        assert_eq!(normalized(&first), normalized(&second));
    }

    #[test]
    fn test_output_ids_unique_per_site() {
        let plan = project(
            vec![star()],
            Arc::new(LogicalPlan::Intersect(Intersect::new(table("t1"), table("t1")))),
        );
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        analyzed
            .apply(|p| {
                if let LogicalPlan::Intersect(i) = p {
                    let left = collect_output_ids(&i.left);
                    let right = collect_output_ids(&i.right);
                    assert!(left.iter().all(|id| !right.contains(id)));
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
    }

    #[test]
    fn test_aggregate_containment() {
        let plan = LogicalPlan::Filter(Filter::new(
            sum(col("b")).gt(Expr::long_lit(0)),
            Arc::new(LogicalPlan::Aggregate(Aggregate::new(
                vec![col("a")],
                vec![col("a"), ua(sum(col("b")))],
                table("t"),
            ))),
        ));
        let analyzed = analyze(plan).unwrap();
        analyzed
            .apply(|p| {
                if !matches!(p, LogicalPlan::Aggregate(_) | LogicalPlan::Window(_)) {
                    for e in p.expressions() {
                        assert!(
                            !crate::analysis::functions::contains_aggregate(e),
                            "bare aggregate outside Aggregate/Window: {:?} in {:?}",
                            e,
                            p
                        );
                    }
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
    }

    #[test]
    fn test_star_legality() {
        // count(*) becomes count(1)
        let analyzed =
            analyze(project(vec![ua(call("count", vec![star()]))], table("t"))).unwrap();
        assert_fully_resolved(&analyzed);

        // struct(*) expands to all columns
        let analyzed =
            analyze(project(vec![ua(call("struct", vec![star()]))], table("t1"))).unwrap();
        assert_fully_resolved(&analyzed);

        // hash(*) expands too
        let analyzed =
            analyze(project(vec![ua(call("hash", vec![star()]))], table("t1"))).unwrap();
        assert_fully_resolved(&analyzed);

        // sum(*) is nonsense
        let err = analyze(project(vec![ua(call("sum", vec![star()]))], table("t1"))).unwrap_err();
        assert!(err.message.contains("sum"), "{}", err);

        // a star in a filter has no meaning at all
        let err = analyze(LogicalPlan::Filter(Filter::new(star(), table("t1")))).unwrap_err();
        assert!(err.message.contains("Invalid usage of '*'"), "{}", err);
    }

    #[test]
    fn test_positional_order_by() {
        // SELECT a, b FROM t ORDER BY 1
        let plan = LogicalPlan::Sort(Sort::new(
            vec![Expr::int_lit(1).asc()],
            true,
            Arc::new(project(vec![col("a"), col("b")], table("t"))),
        ));
        let analyzed = analyze(plan).unwrap();
        let LogicalPlan::Sort(s) = &analyzed else {
            panic!("expected sort, got {:?}", analyzed);
        };
        let Expr::SortOrder(so) = &s.order[0] else { panic!() };
        let Expr::AttributeReference(attr) = so.child.as_ref() else {
            panic!("ordinal not bound: {:?}", so.child);
        };
        assert_eq!(attr.name, "a");
        assert_eq!(attr.expr_id, s.child.output()[0].expr_id);

        // out of range
        let plan = LogicalPlan::Sort(Sort::new(
            vec![Expr::int_lit(3).asc()],
            true,
            Arc::new(project(vec![col("a"), col("b")], table("t"))),
        ));
        let err = analyze(plan).unwrap_err();
        assert!(err.message.contains("ORDER BY position 3"), "{}", err);
    }

    #[test]
    fn test_positional_group_by_rejects_aggregate() {
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![Expr::int_lit(1)],
            vec![ua(sum(col("b")))],
            table("t"),
        ));
        let err = analyze(plan).unwrap_err();
        assert!(
            err.message.contains("GROUP BY position 1 is an aggregate function"),
            "{}",
            err
        );
    }

    #[test]
    fn test_positional_group_by_binds() {
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![Expr::int_lit(1)],
            vec![col("a"), ua(sum(col("b")))],
            table("t"),
        ));
        let analyzed = analyze(plan).unwrap();
        let LogicalPlan::Aggregate(a) = &analyzed else { panic!() };
        assert!(matches!(&a.grouping_exprs[0], Expr::AttributeReference(attr) if attr.name == "a"));
    }

    #[test]
    fn test_unknown_table() {
        let err = analyze(project(vec![col("a")], table("missing"))).unwrap_err();
        assert!(err.message.contains("Table or view not found: missing"), "{}", err);
    }

    #[test]
    fn test_unknown_column() {
        let err = analyze(project(vec![col("z")], table("t"))).unwrap_err();
        assert!(err.message.contains("cannot resolve 'z'"), "{}", err);
    }

    #[test]
    fn test_ambiguous_column() {
        let plan = project(
            vec![col("a")],
            Arc::new(LogicalPlan::Join(Join::new(
                table("t1"),
                table("t2"),
                JoinType::Inner,
                None,
            ))),
        );
        let err = analyze(plan).unwrap_err();
        assert!(err.message.contains("ambiguous"), "{}", err);
    }

    #[test]
    fn test_qualified_column_disambiguates() {
        let plan = project(
            vec![col("t1.a"), col("t2.a")],
            Arc::new(LogicalPlan::Join(Join::new(
                table("t1"),
                table("t2"),
                JoinType::Inner,
                None,
            ))),
        );
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
    }

    #[test]
    fn test_window_definition_substitution() {
        // SELECT rank() OVER w FROM t WINDOW w AS (PARTITION BY a ORDER BY b)
        let spec = WindowSpec::unspecified_frame(vec![col("a")], vec![col("b").asc()]);
        let plan = LogicalPlan::WithWindowDefinition(WithWindowDefinition::new(
            vec![("w".to_string(), spec)],
            Arc::new(project(
                vec![ua(Expr::UnresolvedWindowExpression(UnresolvedWindowExpression {
                    child: Box::new(call("rank", vec![])),
                    name: "w".to_string(),
                }))],
                table("t"),
            )),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        // the rank acquired the order's child as its argument
        let mut saw_rank = false;
        analyzed
            .apply(|p| {
                if let LogicalPlan::Window(w) = p {
                    saw_rank = w.window_expressions.iter().any(|e| {
                        e.exists(|e| {
                            Ok(matches!(e, Expr::WindowFunction(wf)
                                if wf.name() == "rank" && !wf.args().is_empty()))
                        })
                        .unwrap()
                    });
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        assert!(saw_rank);
    }

    #[test]
    fn test_rank_without_order_rejected() {
        let we = Expr::WindowExpression(WindowExpression::new(
            call("rank", vec![]),
            WindowSpec::unspecified_frame(vec![col("a")], vec![]),
        ));
        let err = analyze(project(vec![ua(we)], table("t"))).unwrap_err();
        assert!(err.message.contains("requires window to be ordered"), "{}", err);
    }

    #[test]
    fn test_mandated_frame_mismatch_rejected() {
        let we = Expr::WindowExpression(WindowExpression::new(
            call("row_number", vec![]),
            WindowSpec::new(
                vec![col("a")],
                vec![col("b").asc()],
                WindowFrame::range(
                    crate::expr::FrameBoundary::UnboundedPreceding,
                    crate::expr::FrameBoundary::UnboundedFollowing,
                ),
            ),
        ));
        let err = analyze(project(vec![ua(we)], table("t"))).unwrap_err();
        assert!(err.message.contains("must match the required frame"), "{}", err);
    }

    #[test]
    fn test_time_window_desugared() {
        let minute = 60_000_000i64;
        let window = Expr::TimeWindow(TimeWindow::new(col("ts"), 2 * minute, minute, 0));
        let plan = project(vec![ua(window), col("v")], table("events"));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        let mut expand_projections = None;
        let mut saw_filter_over_expand = false;
        analyzed
            .apply(|p| {
                if let LogicalPlan::Filter(f) = p {
                    if let LogicalPlan::Expand(e) = f.child.as_ref() {
                        saw_filter_over_expand = true;
                        expand_projections = Some(e.projections.len());
                    }
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        assert!(saw_filter_over_expand);
        // ceil(2m / 1m) + 1 overlapping windows
        assert_eq!(expand_projections, Some(3));
    }

    #[test]
    fn test_multiple_time_windows_rejected() {
        let minute = 60_000_000i64;
        let w1 = Expr::TimeWindow(TimeWindow::tumbling(col("ts"), minute));
        let w2 = Expr::TimeWindow(TimeWindow::tumbling(col("ts"), 2 * minute));
        let plan = project(vec![ua(w1), ua(w2)], table("events"));
        let err = analyze(plan).unwrap_err();
        assert!(err.message.contains("Multiple time window expressions"), "{}", err);
    }

    #[test]
    fn test_correlated_exists_subquery() {
        // SELECT a FROM t1 WHERE EXISTS (SELECT d FROM t2 WHERE b > 0)
        // `b` only exists in the outer relation
        let sub = project(
            vec![col("d")],
            Arc::new(LogicalPlan::Filter(Filter::new(
                col("b").gt(Expr::long_lit(0)),
                table("t2"),
            ))),
        );
        let plan = project(
            vec![col("a")],
            Arc::new(LogicalPlan::Filter(Filter::new(
                Expr::Exists(crate::expr::SubqueryExpression::new(Arc::new(sub))),
                table("t1"),
            ))),
        );
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);

        // the subquery's filter now references the outer t1.b attribute
        let mut outer_b_id = None;
        analyzed
            .apply(|p| {
                if let LogicalPlan::LocalRelation(r) = p {
                    if r.name == "t1" {
                        outer_b_id = r.output.iter().find(|a| a.name == "b").map(|a| a.expr_id);
                    }
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        let outer_b_id = outer_b_id.expect("t1 relation in plan");
        let mut correlated = false;
        analyzed
            .apply(|p| {
                for e in p.expressions() {
                    e.apply(|e| {
                        if let Expr::Exists(s) = e {
                            s.plan
                                .apply(|sp| {
                                    for se in sp.expressions() {
                                        se.apply(|se| {
                                            if let Expr::AttributeReference(a) = se {
                                                if a.expr_id == outer_b_id {
                                                    correlated = true;
                                                }
                                            }
                                            Ok(TreeNodeRecursion::Continue)
                                        })
                                        .unwrap();
                                    }
                                    Ok(TreeNodeRecursion::Continue)
                                })
                                .unwrap();
                        }
                        Ok(TreeNodeRecursion::Continue)
                    })
                    .unwrap();
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        assert!(correlated, "outer attribute not substituted into the subquery");
    }

    #[test]
    fn test_pivot_desugared() {
        let plan = LogicalPlan::Pivot(Pivot::new(
            vec![col("a")],
            col("b"),
            vec![
                crate::expr::Literal::new(crate::data::Value::Long(1), DataType::Long),
                crate::expr::Literal::new(crate::data::Value::Long(2), DataType::Long),
            ],
            vec![sum(col("c"))],
            table("t"),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        let LogicalPlan::Aggregate(a) = &analyzed else {
            panic!("expected aggregate, got {:?}", analyzed);
        };
        let names: Vec<_> = LogicalPlan::Aggregate(a.clone())
            .output()
            .iter()
            .map(|x| x.name.clone())
            .collect();
        assert_eq!(names, vec!["a", "1", "2"]);
    }

    #[test]
    fn test_pivot_requires_aggregate() {
        let plan = LogicalPlan::Pivot(Pivot::new(
            vec![col("a")],
            col("b"),
            vec![crate::expr::Literal::new(crate::data::Value::Long(1), DataType::Long)],
            vec![col("c")],
            table("t"),
        ));
        let err = analyze(plan).unwrap_err();
        assert!(err.message.contains("Aggregate expression required for pivot"), "{}", err);
    }

    #[test]
    fn test_grouping_function_outside_grouping_sets_rejected() {
        let plan = project(vec![ua(Expr::Grouping(Box::new(col("a"))))], table("t"));
        let err = analyze(plan).unwrap_err();
        assert!(
            err.message.contains("can only be used with GroupingSets/Cube/Rollup"),
            "{}",
            err
        );
    }

    #[test]
    fn test_legacy_grouping_id_name_rejected() {
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![Expr::Cube(vec![col("a")])],
            vec![col("a"), col("grouping__id")],
            table("t"),
        ));
        let err = analyze(plan).unwrap_err();
        assert!(err.message.contains("grouping__id is deprecated"), "{}", err);
    }

    #[test]
    fn test_udf_null_guard_end_to_end() {
        function_registry::register_udf("plus_one_prim", DataType::Int, vec![true]);
        let plan = project(vec![ua(call("plus_one_prim", vec![col("a")]))], table("t"));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        let guarded = analyzed.expressions()[0]
            .exists(|e| Ok(matches!(e, Expr::IsNull(_))))
            .unwrap();
        assert!(guarded, "primitive udf input not null-guarded: {:?}", analyzed);
    }

    #[test]
    fn test_nondeterministic_pulled_out_of_sort() {
        let plan = LogicalPlan::Sort(Sort::new(
            vec![call("rand", vec![]).asc()],
            true,
            table("t1"),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        // rand now lives in a projection, the sort key is a plain column
        let LogicalPlan::Project(outer) = &analyzed else {
            panic!("expected strip project, got {:?}", analyzed);
        };
        let LogicalPlan::Sort(s) = outer.child.as_ref() else {
            panic!("expected sort, got {:?}", outer.child);
        };
        let Expr::SortOrder(so) = &s.order[0] else { panic!() };
        assert!(matches!(so.child.as_ref(), Expr::AttributeReference(_)));
        let LogicalPlan::Project(inner) = s.child.as_ref() else {
            panic!("expected computing project, got {:?}", s.child);
        };
        assert!(inner
            .project_list
            .iter()
            .any(|e| e.exists(|e| Ok(!e.deterministic())).unwrap()));
    }

    #[test]
    fn test_insert_into_strips_alias() {
        let plan = LogicalPlan::InsertIntoTable(InsertIntoTable::new(
            table("t1"),
            false,
            Arc::new(project(vec![col("a"), col("b")], table("t1"))),
        ));
        let analyzed = analyze(plan).unwrap();
        let LogicalPlan::InsertIntoTable(i) = &analyzed else { panic!() };
        assert!(
            matches!(i.table.as_ref(), LogicalPlan::LocalRelation(_)),
            "insert target should be the bare relation, got {:?}",
            i.table
        );
    }

    #[test]
    fn test_case_sensitive_resolution() {
        let config = crate::config::AnalyzerConfig {
            case_sensitive_analysis: true,
            ..Default::default()
        };
        let analyzer = Analyzer::new(test_catalog(), config);
        let err = analyzer
            .analyze(project(vec![col("A")], table("t")))
            .unwrap_err();
        assert!(err.message.contains("cannot resolve 'A'"), "{}", err);

        let analyzed = analyzer.analyze(project(vec![col("a")], table("t"))).unwrap();
        assert_fully_resolved(&analyzed);
    }

    #[test]
    fn test_aliases_cleaned_up() {
        // a nested alias below the top level disappears
        let plan = project(
            vec![ua((col("a") + Expr::int_lit(1)).alias("x").alias("y"))],
            table("t"),
        );
        let analyzed = analyze(plan).unwrap();
        let exprs = analyzed.expressions();
        let Expr::Alias(top) = exprs[0] else {
            panic!("expected top-level alias, got {:?}", exprs[0]);
        };
        assert!(
            !top.child
                .exists(|e| Ok(matches!(e, Expr::Alias(_))))
                .unwrap(),
            "nested alias survived cleanup: {:?}",
            top
        );
    }

    #[test]
    fn test_distinct_max_dropped() {
        let plan = project(vec![ua(call_distinct("max", vec![col("b")]))], table("t"));
        let analyzed = analyze(plan).unwrap();
        let mut saw_distinct = false;
        analyzed
            .apply(|p| {
                for e in p.expressions() {
                    e.apply(|e| {
                        if let Expr::AggregateExpression(agg) = e {
                            saw_distinct |= agg.distinct;
                        }
                        Ok(TreeNodeRecursion::Continue)
                    })
                    .unwrap();
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        assert!(!saw_distinct, "distinct on max should have been dropped");
    }

    #[test]
    fn test_order_by_aggregate_over_aggregate_child() {
        // SELECT a, SUM(b) FROM t GROUP BY a ORDER BY SUM(b)
        let plan = LogicalPlan::Sort(Sort::new(
            vec![sum(col("b")).asc()],
            true,
            Arc::new(LogicalPlan::Aggregate(Aggregate::new(
                vec![col("a")],
                vec![col("a"), ua(sum(col("b")))],
                table("t"),
            ))),
        ));
        let analyzed = analyze(plan).unwrap();
        assert_fully_resolved(&analyzed);
        // the sort key references the aggregate's output instead of
        // recomputing it
        let LogicalPlan::Project(p) = &analyzed else {
            panic!("expected project, got {:?}", analyzed);
        };
        let LogicalPlan::Sort(s) = p.child.as_ref() else {
            panic!("expected sort, got {:?}", p.child);
        };
        let Expr::SortOrder(so) = &s.order[0] else { panic!() };
        assert!(matches!(so.child.as_ref(), Expr::AttributeReference(_)));
        let LogicalPlan::Aggregate(a) = s.child.as_ref() else {
            panic!("expected aggregate, got {:?}", s.child);
        };
        // the existing sum(b) was reused, not duplicated
        assert_eq!(a.aggregate_exprs.len(), 2);
    }
}
