use std::sync::Arc;
use crate::Result;
use crate::analysis::analyzer::{Analyzer, AnalyzerRule};
use crate::catalog::Catalog;
use crate::config::AnalyzerConfig;
use crate::expr::{Alias, AttributeReference, Expr, ExprId};
use crate::logical_plan::{LogicalPlan, Project, resolve_name};
use crate::tree_node::{Transformed, TreeNode};

/// Resolves subquery expressions, binding attributes the subquery cannot
/// resolve itself against the enclosing operator's child (correlation). When
/// a correlated column's id collides with one the subquery produces, it is
/// renamed through an alias materialized under the enclosing operator.
#[derive(Debug)]
pub struct ResolveSubquery {
    catalog: Arc<dyn Catalog>,
    config: AnalyzerConfig,
}

impl ResolveSubquery {
    pub fn new(catalog: Arc<dyn Catalog>, config: AnalyzerConfig) -> Self {
        Self { catalog, config }
    }

    fn has_unresolved_subquery(plan: &LogicalPlan) -> bool {
        plan.expressions().iter().any(|e| {
            e.exists(|e| {
                Ok(match e {
                    Expr::ScalarSubquery(s) | Expr::Exists(s) => !s.plan.resolved(),
                    _ => false,
                })
            })
            .unwrap()
        })
    }

    /// The correlated-resolution loop: analyze, then bind leftover attributes
    /// against the outer scope, repeat until nothing changes.
    fn resolve_subquery(
        &self,
        plan: LogicalPlan,
        outer: &[AttributeReference],
        aliases: &mut Vec<(ExprId, Alias)>,
    ) -> Result<LogicalPlan> {
        let analyzer = Analyzer::new(self.catalog.clone(), self.config.clone());
        let resolver = self.config.resolver();
        let mut current = match analyzer.execute(plan.clone()) {
            Ok(p) => p,
            Err(_) => plan,
        };
        loop {
            if current.resolved() {
                return Ok(current);
            }
            let mut changed = false;
            current = current
                .transform_up(|p| {
                    if !p.children_resolved() || p.resolved() {
                        return Ok(Transformed::no(p));
                    }
                    let input_set = p.input_set();
                    p.map_expressions(|expr| {
                        expr.transform_up(|e| match e {
                            Expr::UnresolvedAttribute(u) => {
                                match resolve_name(&u.name_parts, outer, resolver)? {
                                    Some(Expr::AttributeReference(outer_attr)) => {
                                        changed = true;
                                        if input_set.contains(&outer_attr) {
                                            // same id exists inside the subquery,
                                            // rename the outer column
                                            let alias = match aliases
                                                .iter()
                                                .find(|(id, _)| *id == outer_attr.expr_id)
                                            {
                                                Some((_, a)) => a.clone(),
                                                None => {
                                                    let a = Alias::new(
                                                        outer_attr.to_expr(),
                                                        outer_attr.qualified_string(),
                                                    );
                                                    aliases.push((outer_attr.expr_id, a.clone()));
                                                    a
                                                }
                                            };
                                            let attr = Expr::Alias(alias)
                                                .to_attribute()
                                                .expect("alias of resolved attribute");
                                            Ok(Transformed::yes(attr.to_expr()))
                                        } else {
                                            Ok(Transformed::yes(outer_attr.to_expr()))
                                        }
                                    }
                                    Some(other) => {
                                        changed = true;
                                        Ok(Transformed::yes(other))
                                    }
                                    None => Ok(Transformed::no(Expr::UnresolvedAttribute(u))),
                                }
                            }
                            e => Ok(Transformed::no(e)),
                        })
                    })
                })?
                .data;
            if !changed {
                return Ok(current);
            }
            current = match analyzer.execute(current.clone()) {
                Ok(p) => p,
                Err(_) => current,
            };
        }
    }
}

impl AnalyzerRule for ResolveSubquery {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            q if q.is_unary() && q.children_resolved() && Self::has_unresolved_subquery(&q) => {
                let child = q.children()[0].clone();
                let child_output = child.output();
                let original_output = q.output();
                let mut aliases: Vec<(ExprId, Alias)> = Vec::new();
                let new_q = q.map_expressions(|expr| {
                    expr.transform_up(|e| match e {
                        Expr::ScalarSubquery(s) if !s.plan.resolved() => {
                            let resolved = self.resolve_subquery(
                                s.plan.as_ref().clone(),
                                &child_output,
                                &mut aliases,
                            );
                            match resolved {
                                Ok(new_plan) if new_plan != *s.plan => Ok(Transformed::yes(
                                    Expr::ScalarSubquery(s.with_plan(Arc::new(new_plan))),
                                )),
                                // speculative failure: the next pass may do better
                                _ => Ok(Transformed::no(Expr::ScalarSubquery(s))),
                            }
                        }
                        Expr::Exists(s) if !s.plan.resolved() => {
                            let resolved = self.resolve_subquery(
                                s.plan.as_ref().clone(),
                                &child_output,
                                &mut aliases,
                            );
                            match resolved {
                                Ok(new_plan) if new_plan != *s.plan => Ok(Transformed::yes(
                                    Expr::Exists(s.with_plan(Arc::new(new_plan))),
                                )),
                                _ => Ok(Transformed::no(Expr::Exists(s))),
                            }
                        }
                        e => Ok(Transformed::no(e)),
                    })
                })?;
                if aliases.is_empty() {
                    Ok(new_q)
                } else {
                    // materialize the renamed outer columns below the
                    // operator, strip them again above
                    let mut inner_list: Vec<Expr> =
                        child_output.iter().map(|a| a.to_expr()).collect();
                    inner_list.extend(aliases.iter().map(|(_, a)| Expr::Alias(a.clone())));
                    let inner = LogicalPlan::Project(Project::new(inner_list, Arc::new(child.clone())));
                    let rewired = new_q.data.with_new_children(vec![Arc::new(inner)]);
                    Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                        original_output.iter().map(|a| a.to_expr()).collect(),
                        Arc::new(rewired),
                    ))))
                }
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveSubquery"
    }
}
