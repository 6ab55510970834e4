use std::sync::Arc;
use crate::{Operator, Result};
use crate::analysis::analyzer::AnalyzerRule;
use crate::expr::expr_fn::binary_expr;
use crate::expr::{
    Alias, AttributeReference, Ceil, Expr, GetStructField, TimeWindow,
};
use crate::logical_plan::{Expand, Filter, LogicalPlan};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};
use crate::types::{DataType, Field};

/// Desugars event-time windows: the child is expanded into one row per
/// overlapping window and filtered down to the windows that actually contain
/// the row's timestamp.
#[derive(Debug)]
pub struct TimeWindowing;

impl TimeWindowing {
    const WINDOW_COL_NAME: &'static str = "window";
    const WINDOW_START: &'static str = "start";
    const WINDOW_END: &'static str = "end";

    fn get_field(window_attr: &AttributeReference, name: &str, ordinal: usize) -> Expr {
        Expr::ScalarFunction(Box::new(GetStructField {
            child: window_attr.to_expr(),
            ordinal,
            field: Field::new_not_null(name, DataType::Timestamp),
        }))
    }

    /// `(ceil((ts - start) / slide) + i - maxOverlapping) * slide + start`
    /// and its end, packaged as a `struct(start, end)` literal projection.
    fn window_struct(window: &TimeWindow, i: i64, max_overlapping: i64) -> Expr {
        let ts_long = (*window.time_column).clone().cast(DataType::Long);
        let elapsed = binary_expr(
            ts_long,
            Operator::Minus,
            Expr::long_lit(window.start_time),
        );
        let window_id = Expr::ScalarFunction(Box::new(Ceil {
            child: binary_expr(
                elapsed.cast(DataType::Double),
                Operator::Divide,
                Expr::Literal(crate::expr::Literal::new(
                    crate::data::Value::Double(window.slide_duration as f64),
                    DataType::Double,
                )),
            ),
        }));
        let shifted = binary_expr(
            binary_expr(window_id, Operator::Plus, Expr::long_lit(i - max_overlapping)),
            Operator::Multiply,
            Expr::long_lit(window.slide_duration),
        );
        let window_start =
            binary_expr(shifted, Operator::Plus, Expr::long_lit(window.start_time));
        let window_end = binary_expr(
            window_start.clone(),
            Operator::Plus,
            Expr::long_lit(window.window_duration),
        );
        Expr::CreateStruct(vec![
            Expr::Alias(Alias::new(
                window_start.cast(DataType::Timestamp),
                Self::WINDOW_START,
            )),
            Expr::Alias(Alias::new(window_end.cast(DataType::Timestamp), Self::WINDOW_END)),
        ])
    }
}

impl AnalyzerRule for TimeWindowing {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|p| {
            if p.children().len() != 1 || !p.children_resolved() {
                return Ok(Transformed::no(p));
            }
            let mut windows: Vec<TimeWindow> = Vec::new();
            for e in p.expressions() {
                e.apply(|e| {
                    if let Expr::TimeWindow(w) = e {
                        if !windows.contains(w) {
                            windows.push(w.clone());
                        }
                    }
                    Ok(TreeNodeRecursion::Continue)
                })
                .unwrap();
            }
            if windows.len() > 1 {
                return Err(
                    "Multiple time window expressions would result in a cartesian product of rows, therefore they are currently not supported"
                        .into(),
                );
            }
            let Some(window) = windows.into_iter().next() else {
                return Ok(Transformed::no(p));
            };
            if !window.time_column.resolved() || window.check_input_data_types().is_err() {
                return Ok(Transformed::no(p));
            }

            let child = p.children()[0].clone();
            let child_output = child.output();
            let window_attr =
                AttributeReference::new(Self::WINDOW_COL_NAME, TimeWindow::window_type())
                    .with_nullability(false);

            let max_overlapping =
                (window.window_duration + window.slide_duration - 1) / window.slide_duration;
            let projections: Vec<Vec<Expr>> = (0..=max_overlapping)
                .map(|i| {
                    let mut projection = vec![Self::window_struct(&window, i, max_overlapping)];
                    projection.extend(child_output.iter().map(|a| a.to_expr()));
                    projection
                })
                .collect();

            let mut expand_output = vec![window_attr.clone()];
            expand_output.extend(child_output.iter().cloned());
            let expand =
                LogicalPlan::Expand(Expand::new(projections, expand_output, Arc::new(child)));

            let ts = (*window.time_column).clone();
            let filter_condition = binary_expr(
                ts.clone(),
                Operator::GtEq,
                Self::get_field(&window_attr, Self::WINDOW_START, 0),
            )
            .and(binary_expr(
                ts,
                Operator::Lt,
                Self::get_field(&window_attr, Self::WINDOW_END, 1),
            ));
            let expanded =
                LogicalPlan::Filter(Filter::new(filter_condition, Arc::new(expand)));

            let substituted = p
                .map_expressions(|expr| {
                    expr.transform_up(|e| match e {
                        Expr::TimeWindow(_) => Ok(Transformed::yes(window_attr.to_expr())),
                        e => Ok(Transformed::no(e)),
                    })
                })?
                .data;
            Ok(Transformed::yes(substituted.with_new_children(vec![Arc::new(expanded)])))
        })
    }

    fn name(&self) -> &str {
        "TimeWindowing"
    }
}
