use crate::Result;
use crate::expr::aggregate::AggregateExpression;
use crate::expr::window::{WindowExpression, WindowSpec};
use crate::expr::*;
use crate::tree_node::{Transformed, TreeNode, TreeNodeContainer, TreeNodeRecursion};

impl TreeNode for Expr {
    fn apply_children<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
        &'n self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        for x in self.children() {
            if f(x)? == TreeNodeRecursion::Stop {
                return Ok(TreeNodeRecursion::Stop);
            }
        }
        Ok(TreeNodeRecursion::Continue)
    }

    fn map_children<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        Ok(match self {
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedStar(_)
            | Expr::AttributeReference(_)
            | Expr::Literal(_)
            | Expr::BoundReference(_)
            | Expr::ScalarSubquery(_)
            | Expr::Exists(_) => Transformed::no(self),
            Expr::UnresolvedAlias(child) => {
                f(*child)?.update_data(|child| Expr::UnresolvedAlias(Box::new(child)))
            }
            Expr::Not(child) => f(*child)?.update_data(|e| e.not()),
            Expr::IsNull(child) => f(*child)?.update_data(|e| e.is_null()),
            Expr::IsNotNull(child) => f(*child)?.update_data(|e| e.is_not_null()),
            Expr::Grouping(child) => {
                f(*child)?.update_data(|child| Expr::Grouping(Box::new(child)))
            }
            Expr::Alias(Alias { child, name, expr_id }) => f(*child)?
                .update_data(|child| Expr::Alias(Alias::new_with_expr_id(child, name, expr_id))),
            Expr::MultiAlias(MultiAlias { child, names }) => f(*child)?
                .update_data(|child| Expr::MultiAlias(MultiAlias { child: Box::new(child), names })),
            Expr::Cast(Cast { child, data_type }) => f(*child)?.update_data(|e| e.cast(data_type)),
            Expr::UpCast(Cast { child, data_type }) => {
                f(*child)?.update_data(|e| Expr::UpCast(Cast::new(e, data_type)))
            }
            Expr::UnresolvedDeserializer(UnresolvedDeserializer {
                deserializer,
                input_attributes,
            }) => f(*deserializer)?.update_data(|deserializer| {
                Expr::UnresolvedDeserializer(UnresolvedDeserializer {
                    deserializer: Box::new(deserializer),
                    input_attributes,
                })
            }),
            Expr::UnresolvedWindowExpression(UnresolvedWindowExpression { child, name }) => {
                f(*child)?.update_data(|child| {
                    Expr::UnresolvedWindowExpression(UnresolvedWindowExpression {
                        child: Box::new(child),
                        name,
                    })
                })
            }
            Expr::UnresolvedFunction(UnresolvedFunction { name, arguments, distinct }) => {
                arguments.map_elements(f)?.update_data(|arguments| {
                    Expr::UnresolvedFunction(UnresolvedFunction { name, arguments, distinct })
                })
            }
            Expr::UnresolvedGenerator(UnresolvedGenerator { name, arguments }) => {
                arguments.map_elements(f)?.update_data(|arguments| {
                    Expr::UnresolvedGenerator(UnresolvedGenerator { name, arguments })
                })
            }
            Expr::UnresolvedExtractValue(UnresolvedExtractValue { child, extraction }) => {
                (child, extraction)
                    .map_elements(f)?
                    .update_data(|(child, extraction)| {
                        Expr::UnresolvedExtractValue(UnresolvedExtractValue { child, extraction })
                    })
            }
            Expr::BinaryOperator(BinaryOperator { left, op, right }) => (left, right)
                .map_elements(f)?
                .update_data(|(left, right)| {
                    Expr::BinaryOperator(BinaryOperator::new(left, op, right))
                }),
            Expr::In(In { value, list }) => (value, list)
                .map_elements(f)?
                .update_data(|(value, list)| Expr::In(In { value, list })),
            Expr::Like(Like { expr, pattern }) => (expr, pattern)
                .map_elements(f)?
                .update_data(|(expr, pattern)| Expr::Like(Like::new(expr, pattern))),
            Expr::CreateStruct(elems) => {
                elems.map_elements(f)?.update_data(Expr::CreateStruct)
            }
            Expr::CreateArray(elems) => elems.map_elements(f)?.update_data(Expr::CreateArray),
            Expr::Cube(elems) => elems.map_elements(f)?.update_data(Expr::Cube),
            Expr::Rollup(elems) => elems.map_elements(f)?.update_data(Expr::Rollup),
            Expr::GroupingId(elems) => elems.map_elements(f)?.update_data(Expr::GroupingId),
            Expr::SortOrder(SortOrder { child, direction }) => f(*child)?
                .update_data(|child| Expr::SortOrder(SortOrder { child: Box::new(child), direction })),
            Expr::ScalarFunction(func) => {
                let args = func.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?
                    .update_data(|args| Expr::ScalarFunction(func.rewrite_args(args)))
            }
            Expr::ScalarUdf(ScalarUdf { name, data_type, args, input_primitives, nullable }) => {
                args.map_elements(f)?.update_data(|args| {
                    Expr::ScalarUdf(ScalarUdf { name, data_type, args, input_primitives, nullable })
                })
            }
            Expr::NewInstance(NewInstance {
                class_name,
                arguments,
                data_type,
                outer_needed,
                outer_resolved,
            }) => arguments.map_elements(f)?.update_data(|arguments| {
                Expr::NewInstance(NewInstance {
                    class_name,
                    arguments,
                    data_type,
                    outer_needed,
                    outer_resolved,
                })
            }),
            Expr::AggregateExpression(AggregateExpression { func, mode, distinct }) => {
                let args = func.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?.update_data(|args| {
                    Expr::AggregateExpression(AggregateExpression {
                        func: func.rewrite_args(args),
                        mode,
                        distinct,
                    })
                })
            }
            Expr::Generator(generator) => {
                let args = generator.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?
                    .update_data(|args| Expr::Generator(generator.rewrite_args(args)))
            }
            Expr::WindowFunction(func) => {
                let args = func.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?
                    .update_data(|args| Expr::WindowFunction(func.rewrite_args(args)))
            }
            Expr::WindowExpression(WindowExpression { window_function, window_spec }) => {
                let WindowSpec { partition_spec, order_spec, frame } = window_spec;
                (window_function, partition_spec, order_spec)
                    .map_elements(f)?
                    .update_data(|(window_function, partition_spec, order_spec)| {
                        Expr::WindowExpression(WindowExpression {
                            window_function,
                            window_spec: WindowSpec { partition_spec, order_spec, frame },
                        })
                    })
            }
            Expr::TimeWindow(TimeWindow {
                time_column,
                window_duration,
                slide_duration,
                start_time,
            }) => f(*time_column)?.update_data(|time_column| {
                Expr::TimeWindow(TimeWindow {
                    time_column: Box::new(time_column),
                    window_duration,
                    slide_duration,
                    start_time,
                })
            }),
        })
    }
}
