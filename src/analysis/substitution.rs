use std::sync::Arc;
use crate::Result;
use crate::analysis::analyzer::AnalyzerRule;
use crate::config::{AnalyzerConfig, Resolver};
use crate::expr::{Expr, UnresolvedWindowExpression, WindowExpression};
use crate::logical_plan::{LogicalPlan, SubqueryAlias, Union, With, WithWindowDefinition};
use crate::tree_node::{Transformed, TreeNode};

/// Inlines common table expressions into the body, innermost `With` first.
/// A CTE shadows a catalog table of the same name, and later definitions see
/// earlier ones.
#[derive(Debug)]
pub struct CTESubstitution {
    config: AnalyzerConfig,
}

impl CTESubstitution {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    fn substitute_cte(
        plan: LogicalPlan,
        ctes: &[(String, Arc<LogicalPlan>)],
        resolver: Resolver,
    ) -> Result<Transformed<LogicalPlan>> {
        plan.transform_down(|p| match p {
            LogicalPlan::UnresolvedRelation(u) => {
                // lookup is by table name only, the database part is ignored
                let substituted = ctes
                    .iter()
                    .find(|(name, _)| resolver(name, &u.table.table))
                    .map(|(_, cte)| cte.clone());
                match substituted {
                    Some(cte) => {
                        let plan = match &u.alias {
                            Some(alias) => LogicalPlan::SubqueryAlias(SubqueryAlias::new(
                                alias.clone(),
                                cte,
                            )),
                            None => cte.as_ref().clone(),
                        };
                        Ok(Transformed::yes(plan))
                    }
                    None => Ok(Transformed::no(LogicalPlan::UnresolvedRelation(u))),
                }
            }
            other => other.map_expressions(|e| {
                e.transform_up(|e| match e {
                    Expr::ScalarSubquery(s) => {
                        let t = Self::substitute_cte(s.plan.as_ref().clone(), ctes, resolver)?;
                        if t.transformed {
                            Ok(Transformed::yes(Expr::ScalarSubquery(
                                s.with_plan(Arc::new(t.data)),
                            )))
                        } else {
                            Ok(Transformed::no(Expr::ScalarSubquery(s)))
                        }
                    }
                    Expr::Exists(s) => {
                        let t = Self::substitute_cte(s.plan.as_ref().clone(), ctes, resolver)?;
                        if t.transformed {
                            Ok(Transformed::yes(Expr::Exists(s.with_plan(Arc::new(t.data)))))
                        } else {
                            Ok(Transformed::no(Expr::Exists(s)))
                        }
                    }
                    e => Ok(Transformed::no(e)),
                })
            }),
        })
    }
}

impl AnalyzerRule for CTESubstitution {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        let resolver = self.config.resolver();
        plan.transform_up(|plan| match plan {
            LogicalPlan::With(With { child, ctes }) => {
                let mut resolved: Vec<(String, Arc<LogicalPlan>)> = Vec::with_capacity(ctes.len());
                for (name, cte) in ctes {
                    let substituted =
                        Self::substitute_cte(cte.as_ref().clone(), &resolved, resolver)?.data;
                    resolved.push((name, Arc::new(substituted)));
                }
                let new_child =
                    Self::substitute_cte(Arc::unwrap_or_clone(child), &resolved, resolver)?.data;
                Ok(Transformed::yes(new_child))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "CTESubstitution"
    }
}

/// Replaces `OVER <name>` references by the specification from the WINDOW
/// clause and erases the definition node.
#[derive(Debug)]
pub struct WindowsSubstitution;

impl AnalyzerRule for WindowsSubstitution {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::WithWindowDefinition(WithWindowDefinition {
                window_definitions,
                child,
            }) => {
                let new_child =
                    Arc::unwrap_or_clone(child).transform_up_expressions(|e| match e {
                        Expr::UnresolvedWindowExpression(UnresolvedWindowExpression {
                            child,
                            name,
                        }) => match window_definitions.iter().find(|(n, _)| *n == name) {
                            Some((_, spec)) => Ok(Transformed::yes(Expr::WindowExpression(
                                WindowExpression::new(*child, spec.clone()),
                            ))),
                            None => Err(format!(
                                "Window specification {} is not defined in the WINDOW clause.",
                                name
                            )
                            .into()),
                        },
                        e => Ok(Transformed::no(e)),
                    })?;
                Ok(Transformed::yes(new_child.data))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "WindowsSubstitution"
    }
}

/// `Union` of a single child is the child.
#[derive(Debug)]
pub struct EliminateUnions;

impl AnalyzerRule for EliminateUnions {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Union(Union { mut children }) if children.len() == 1 => {
                Ok(Transformed::yes(Arc::unwrap_or_clone(children.remove(0))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "EliminateUnions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::expr_fn::col;
    use crate::expr::Alias;
    use crate::logical_plan::{Project, TableIdentifier, UnresolvedRelation};

    fn unresolved_table(name: &str) -> LogicalPlan {
        LogicalPlan::UnresolvedRelation(UnresolvedRelation::new(TableIdentifier::new(name)))
    }

    #[test]
    fn test_cte_inlined_and_with_erased() {
        let cte_body = LogicalPlan::Project(Project::new(
            vec![Expr::Alias(Alias::new(Expr::int_lit(1), "a"))],
            Arc::new(LogicalPlan::OneRowRelation),
        ));
        let body = LogicalPlan::Project(Project::new(vec![col("a")], Arc::new(unresolved_table("x"))));
        let plan = LogicalPlan::With(With::new(
            Arc::new(body),
            vec![("x".to_string(), Arc::new(cte_body.clone()))],
        ));

        let result = CTESubstitution::new(AnalyzerConfig::default())
            .analyze(plan)
            .unwrap();
        assert!(result.transformed);
        match result.data {
            LogicalPlan::Project(p) => assert_eq!(p.child.as_ref(), &cte_body),
            other => panic!("expected project, got {:?}", other),
        }
    }

    #[test]
    fn test_cte_sees_earlier_definitions() {
        let first = LogicalPlan::Project(Project::new(
            vec![Expr::Alias(Alias::new(Expr::int_lit(1), "a"))],
            Arc::new(LogicalPlan::OneRowRelation),
        ));
        let second = LogicalPlan::Project(Project::new(vec![col("a")], Arc::new(unresolved_table("x"))));
        let body = LogicalPlan::Project(Project::new(vec![col("a")], Arc::new(unresolved_table("y"))));
        let plan = LogicalPlan::With(With::new(
            Arc::new(body),
            vec![
                ("x".to_string(), Arc::new(first)),
                ("y".to_string(), Arc::new(second)),
            ],
        ));

        let result = CTESubstitution::new(AnalyzerConfig::default())
            .analyze(plan)
            .unwrap()
            .data;
        // y's body itself must have had x substituted away
        assert!(!result
            .exists(|p| Ok(matches!(p, LogicalPlan::UnresolvedRelation(_))))
            .unwrap());
    }

    #[test]
    fn test_undefined_window_spec_fails() {
        let plan = LogicalPlan::WithWindowDefinition(WithWindowDefinition::new(
            vec![],
            Arc::new(LogicalPlan::Project(Project::new(
                vec![Expr::UnresolvedWindowExpression(UnresolvedWindowExpression {
                    child: Box::new(col("a")),
                    name: "w".to_string(),
                })],
                Arc::new(LogicalPlan::OneRowRelation),
            ))),
        ));
        let err = WindowsSubstitution.analyze(plan).unwrap_err();
        assert!(err.message.contains("Window specification w is not defined"));
    }

    #[test]
    fn test_trivial_union_collapsed() {
        let child = LogicalPlan::OneRowRelation;
        let plan = LogicalPlan::Union(Union::new(vec![Arc::new(child.clone())]));
        let result = EliminateUnions.analyze(plan).unwrap();
        assert!(result.transformed);
        assert_eq!(result.data, child);
    }
}
