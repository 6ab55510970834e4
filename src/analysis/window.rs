use std::sync::Arc;
use crate::Result;
use crate::analysis::analyzer::AnalyzerRule;
use crate::expr::{
    AggregateExpression, Alias, Expr, SortOrder, WindowExpression, WindowFrame, WindowSpec,
};
use crate::logical_plan::{Aggregate, Filter, LogicalPlan, Project, Window};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};

fn has_window_function(exprs: &[Expr]) -> bool {
    exprs.iter().any(|e| {
        e.exists(|e| Ok(matches!(e, Expr::WindowExpression(_)))).unwrap()
    })
}

/// Ranking functions demand an ordered window; the ordering's children are
/// injected as the function's arguments.
#[derive(Debug)]
pub struct ResolveWindowOrder;

impl AnalyzerRule for ResolveWindowOrder {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|e| match e {
            Expr::WindowExpression(we) => match we.window_function.as_ref() {
                Expr::WindowFunction(wf) if we.window_spec.order_spec.is_empty() => Err(format!(
                    "Window function {}() requires window to be ordered, please add ORDER BY clause",
                    wf.name()
                )
                .into()),
                Expr::WindowFunction(wf)
                    if wf.requires_order()
                        && wf.args().is_empty()
                        && we.window_spec.order_spec.iter().all(|o| o.resolved()) =>
                {
                    let order_children: Vec<Expr> = we
                        .window_spec
                        .order_spec
                        .iter()
                        .filter_map(|o| match o {
                            Expr::SortOrder(s) => Some((*s.child).clone()),
                            _ => None,
                        })
                        .collect();
                    let injected = wf.with_order(order_children);
                    Ok(Transformed::yes(Expr::WindowExpression(WindowExpression {
                        window_function: Box::new(Expr::WindowFunction(injected)),
                        window_spec: we.window_spec,
                    })))
                }
                _ => Ok(Transformed::no(Expr::WindowExpression(we))),
            },
            e => Ok(Transformed::no(e)),
        })
    }

    fn name(&self) -> &str {
        "ResolveWindowOrder"
    }
}

/// Validates a user-specified frame against the function's mandate and fills
/// unspecified frames.
#[derive(Debug)]
pub struct ResolveWindowFrame;

impl AnalyzerRule for ResolveWindowFrame {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|e| match e {
            Expr::WindowExpression(we) => {
                let mandated = match we.window_function.as_ref() {
                    Expr::WindowFunction(wf) => wf.mandated_frame(),
                    _ => None,
                };
                match (&we.window_spec.frame, mandated) {
                    (WindowFrame::Specified(specified), Some(required)) => {
                        if WindowFrame::Specified(specified.clone()) != required {
                            Err(format!(
                                "Window Frame {:?} must match the required frame {:?}",
                                specified, required
                            )
                            .into())
                        } else {
                            Ok(Transformed::no(Expr::WindowExpression(we)))
                        }
                    }
                    (WindowFrame::Unspecified, Some(required)) => {
                        let window_spec = we.window_spec.with_frame(required);
                        Ok(Transformed::yes(Expr::WindowExpression(WindowExpression {
                            window_function: we.window_function,
                            window_spec,
                        })))
                    }
                    (WindowFrame::Unspecified, None) if we.window_function.resolved() => {
                        let frame =
                            WindowFrame::default_frame(!we.window_spec.order_spec.is_empty());
                        let window_spec = we.window_spec.with_frame(frame);
                        Ok(Transformed::yes(Expr::WindowExpression(WindowExpression {
                            window_function: we.window_function,
                            window_spec,
                        })))
                    }
                    _ => Ok(Transformed::no(Expr::WindowExpression(we))),
                }
            }
            e => Ok(Transformed::no(e)),
        })
    }

    fn name(&self) -> &str {
        "ResolveWindowFrame"
    }
}

/// Moves window expressions out of projections and aggregates into dedicated
/// `Window` operators, one per distinct (partition, order) pair, lifting
/// every input they need into the operator below.
#[derive(Debug)]
pub struct ExtractWindowExpressions;

struct Extracted {
    window_bearing: Vec<Expr>,
    regular: Vec<Expr>,
}

impl ExtractWindowExpressions {
    /// Splits the expression list into window-bearing and regular parts,
    /// lifting window-function inputs, partition/order keys and embedded
    /// aggregates into the regular list as named columns.
    fn extract(expressions: Vec<Expr>) -> Result<Extracted> {
        let (window_bearing, regular): (Vec<Expr>, Vec<Expr>) = expressions
            .into_iter()
            .partition(|e| has_window_function(std::slice::from_ref(e)));

        let mut lifted: Vec<Expr> = Vec::new();
        let mut seen_window_aggregates: Vec<AggregateExpression> = Vec::new();

        fn extract_expr(e: Expr, lifted: &mut Vec<Expr>) -> Expr {
            match e {
                attr @ Expr::AttributeReference(_) => {
                    lifted.push(attr.clone());
                    attr
                }
                Expr::Alias(a) => {
                    let attr = Expr::Alias(a.clone())
                        .to_attribute()
                        .map(|a| a.to_expr())
                        .unwrap_or_else(|| Expr::Alias(a.clone()));
                    lifted.push(Expr::Alias(a));
                    attr
                }
                e if e.foldable() => e,
                e => {
                    let alias = Alias::new(e, format!("_w{}", lifted.len()));
                    let attr = Expr::Alias(alias.clone())
                        .to_attribute()
                        .expect("alias of resolved expression");
                    lifted.push(Expr::Alias(alias));
                    attr.to_expr()
                }
            }
        }

        let new_window_bearing = window_bearing
            .into_iter()
            .map(|expr| {
                expr.transform_down(|e| match e {
                    Expr::WindowExpression(WindowExpression { window_function, window_spec }) => {
                        let new_function = match *window_function {
                            Expr::AggregateExpression(ae) => {
                                let new_args = ae
                                    .func
                                    .args()
                                    .into_iter()
                                    .cloned()
                                    .map(|a| extract_expr(a, &mut lifted))
                                    .collect();
                                let new_agg = AggregateExpression {
                                    func: ae.func.rewrite_args(new_args),
                                    mode: ae.mode,
                                    distinct: ae.distinct,
                                };
                                seen_window_aggregates.push(new_agg.clone());
                                Expr::AggregateExpression(new_agg)
                            }
                            Expr::WindowFunction(wf) => {
                                let new_args = wf
                                    .args()
                                    .into_iter()
                                    .cloned()
                                    .map(|a| extract_expr(a, &mut lifted))
                                    .collect();
                                Expr::WindowFunction(wf.rewrite_args(new_args))
                            }
                            other => other,
                        };
                        let partition_spec = window_spec
                            .partition_spec
                            .into_iter()
                            .map(|p| extract_expr(p, &mut lifted))
                            .collect();
                        let order_spec = window_spec
                            .order_spec
                            .into_iter()
                            .map(|o| match o {
                                Expr::SortOrder(s) => Expr::SortOrder(SortOrder::new(
                                    extract_expr((*s.child).clone(), &mut lifted),
                                    s.direction,
                                )),
                                o => extract_expr(o, &mut lifted),
                            })
                            .collect();
                        Ok(Transformed::yes(Expr::WindowExpression(WindowExpression {
                            window_function: Box::new(new_function),
                            window_spec: WindowSpec {
                                partition_spec,
                                order_spec,
                                frame: window_spec.frame,
                            },
                        })))
                    }
                    Expr::AggregateExpression(agg)
                        if !seen_window_aggregates.contains(&agg) =>
                    {
                        // an aggregate mixed into a windowed expression is
                        // computed below the window
                        let replacement =
                            extract_expr(Expr::AggregateExpression(agg), &mut lifted);
                        Ok(Transformed::new(replacement, true, TreeNodeRecursion::Jump))
                    }
                    e => Ok(Transformed::no(e)),
                })
                .map(|t| t.data)
            })
            .collect::<Result<Vec<_>>>()?;

        // drop duplicate columns lifted more than once
        let mut regular_with_lifted = regular;
        for e in lifted {
            let duplicate = regular_with_lifted.iter().any(|r| {
                r == &e
                    || match (r.to_attribute(), e.to_attribute()) {
                        (Some(a), Some(b)) => a.expr_id == b.expr_id,
                        _ => false,
                    }
            });
            if !duplicate {
                regular_with_lifted.push(e);
            }
        }

        Ok(Extracted { window_bearing: new_window_bearing, regular: regular_with_lifted })
    }

    /// Groups the window-bearing expressions by their (partition, order) pair
    /// and stacks one `Window` operator per group over `child`. Composite
    /// expressions around the window columns are computed in a projection on
    /// top, when any exist.
    fn add_window(window_bearing: Vec<Expr>, child: LogicalPlan) -> LogicalPlan {
        let mut window_columns: Vec<Expr> = Vec::new();
        let mut rewritten: Vec<Expr> = Vec::new();
        for (i, e) in window_bearing.into_iter().enumerate() {
            match e {
                Expr::WindowExpression(we) => {
                    let alias = Alias::new(Expr::WindowExpression(we), format!("_we{}", i));
                    let attr = Expr::Alias(alias.clone())
                        .to_attribute()
                        .expect("alias of resolved window");
                    window_columns.push(Expr::Alias(alias));
                    rewritten.push(attr.to_expr());
                }
                Expr::Alias(a) if matches!(a.child.as_ref(), Expr::WindowExpression(_)) => {
                    let attr = Expr::Alias(a.clone())
                        .to_attribute()
                        .expect("alias of resolved window");
                    window_columns.push(Expr::Alias(a));
                    rewritten.push(attr.to_expr());
                }
                other => {
                    // composite: pull each inner window out, keep the shell
                    let t = other
                        .transform_down(|e| match e {
                            Expr::WindowExpression(we) => {
                                let alias = Alias::new(
                                    Expr::WindowExpression(we),
                                    format!("_we{}", window_columns.len()),
                                );
                                let attr = Expr::Alias(alias.clone())
                                    .to_attribute()
                                    .expect("alias of resolved window");
                                window_columns.push(Expr::Alias(alias));
                                Ok(Transformed::new(
                                    attr.to_expr(),
                                    true,
                                    TreeNodeRecursion::Jump,
                                ))
                            }
                            e => Ok(Transformed::no(e)),
                        })
                        .unwrap();
                    rewritten.push(t.data);
                }
            }
        }

        // group by (partition, order), preserving first-seen order
        let mut groups: Vec<((Vec<Expr>, Vec<Expr>), Vec<Expr>)> = Vec::new();
        for column in window_columns {
            let spec = match &column {
                Expr::Alias(a) => match a.child.as_ref() {
                    Expr::WindowExpression(we) => {
                        (we.window_spec.partition_spec.clone(), we.window_spec.order_spec.clone())
                    }
                    _ => (vec![], vec![]),
                },
                _ => (vec![], vec![]),
            };
            match groups.iter_mut().find(|(key, _)| *key == spec) {
                Some((_, exprs)) => exprs.push(column),
                None => groups.push((spec, vec![column])),
            }
        }

        let mut current = child;
        for ((partition_spec, order_spec), window_expressions) in groups {
            current = LogicalPlan::Window(Window::new(
                window_expressions,
                partition_spec,
                order_spec,
                Arc::new(current),
            ));
        }

        // a plain column list needs no extra projection on top
        let current_output = current.output_set();
        let all_plain = rewritten.iter().all(|e| match e {
            Expr::AttributeReference(a) => current_output.contains(a),
            _ => false,
        });
        if all_plain {
            current
        } else {
            let mut list: Vec<Expr> =
                current.output().iter().map(|a| a.to_expr()).collect();
            list.extend(rewritten.into_iter().filter(|e| match e {
                Expr::AttributeReference(a) => !current_output.contains(a),
                _ => true,
            }));
            LogicalPlan::Project(Project::new(list, Arc::new(current)))
        }
    }
}

impl AnalyzerRule for ExtractWindowExpressions {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            // HAVING over an aggregate computing windows: aggregate first,
            // filter on its output, then evaluate the windows
            LogicalPlan::Filter(Filter { condition, child })
                if matches!(child.as_ref(), LogicalPlan::Aggregate(a) if has_window_function(&a.aggregate_exprs))
                    && condition.resolved()
                    && child.expressions().iter().all(|e| e.resolved()) =>
            {
                let LogicalPlan::Aggregate(a) = Arc::unwrap_or_clone(child) else {
                    unreachable!()
                };
                let final_list: Vec<Expr> = a
                    .aggregate_exprs
                    .iter()
                    .filter_map(|e| e.to_attribute().map(|a| a.to_expr()))
                    .collect();
                let extracted = Self::extract(a.aggregate_exprs)?;
                let with_aggregate = LogicalPlan::Aggregate(Aggregate::new(
                    a.grouping_exprs,
                    extracted.regular,
                    a.child,
                ));
                let with_filter =
                    LogicalPlan::Filter(Filter::new(condition, Arc::new(with_aggregate)));
                let with_window = Self::add_window(extracted.window_bearing, with_filter);
                Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                    final_list,
                    Arc::new(with_window),
                ))))
            }
            LogicalPlan::Aggregate(a)
                if has_window_function(&a.aggregate_exprs)
                    && a.grouping_exprs.iter().all(|e| e.resolved())
                    && a.aggregate_exprs.iter().all(|e| e.resolved()) =>
            {
                let final_list: Vec<Expr> = a
                    .aggregate_exprs
                    .iter()
                    .filter_map(|e| e.to_attribute().map(|a| a.to_expr()))
                    .collect();
                let extracted = Self::extract(a.aggregate_exprs)?;
                let with_aggregate = LogicalPlan::Aggregate(Aggregate::new(
                    a.grouping_exprs,
                    extracted.regular,
                    a.child,
                ));
                let with_window = Self::add_window(extracted.window_bearing, with_aggregate);
                Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                    final_list,
                    Arc::new(with_window),
                ))))
            }
            LogicalPlan::Project(Project { project_list, child })
                if has_window_function(&project_list)
                    && project_list.iter().all(|e| e.resolved()) =>
            {
                let final_list: Vec<Expr> = project_list
                    .iter()
                    .filter_map(|e| e.to_attribute().map(|a| a.to_expr()))
                    .collect();
                let extracted = Self::extract(project_list)?;
                let with_project = LogicalPlan::Project(Project::new(
                    extracted.regular,
                    child,
                ));
                let with_window = Self::add_window(extracted.window_bearing, with_project);
                Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                    final_list,
                    Arc::new(with_window),
                ))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ExtractWindowExpressions"
    }
}
