use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use itertools::Itertools;
use crate::Result;
use crate::analysis::analyzer::AnalyzerRule;
use crate::config::AnalyzerConfig;
use crate::expr::{
    Cast, Expr, If, NewInstance, ScalarUdf, UnresolvedDeserializer,
};
use crate::logical_plan::{LogicalPlan, resolve_name};
use crate::tree_node::{Transformed, TreeNode};
use crate::types::DataType;

/// Process-wide registry of outer instances for inner-class construction,
/// populated by hosts before analysis and read-only during it.
static OUTER_SCOPES: LazyLock<Mutex<HashMap<String, ()>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

pub fn add_outer_scope(class_name: &str) {
    OUTER_SCOPES.lock().unwrap().insert(class_name.to_string(), ());
}

pub fn outer_scope_exists(class_name: &str) -> bool {
    OUTER_SCOPES.lock().unwrap().contains_key(class_name)
}

/// Binds the positional and named references inside an
/// `UnresolvedDeserializer` to the operator's input attributes.
#[derive(Debug)]
pub struct ResolveDeserializer {
    config: AnalyzerConfig,
}

impl ResolveDeserializer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }
}

impl AnalyzerRule for ResolveDeserializer {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        let resolver = self.config.resolver();
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p if p.resolved() => Ok(Transformed::no(p)),
            p => {
                let child_output = p.child_attributes();
                p.map_expressions(|expr| {
                    expr.transform_up(|e| match e {
                        Expr::UnresolvedDeserializer(UnresolvedDeserializer {
                            deserializer,
                            input_attributes,
                        }) => {
                            let inputs = if input_attributes.is_empty() {
                                child_output.clone()
                            } else {
                                input_attributes
                            };
                            let bound = deserializer.transform_up(|e| match e {
                                Expr::BoundReference(b) => match inputs.get(b.ordinal) {
                                    Some(attr) => Ok(Transformed::yes(attr.to_expr())),
                                    None => Err(format!(
                                        "ordinal {} out of range for deserializer input [{}]",
                                        b.ordinal,
                                        inputs.iter().map(|a| a.name.as_str()).join(", ")
                                    )
                                    .into()),
                                },
                                e => Ok(Transformed::no(e)),
                            })?;
                            // remaining references resolve against a relation
                            // made of the inputs alone
                            let resolved = bound.data.transform_up(|e| match e {
                                Expr::UnresolvedAttribute(u) => {
                                    match resolve_name(&u.name_parts, &inputs, resolver)? {
                                        Some(r) => Ok(Transformed::yes(r)),
                                        None => Err(format!(
                                            "cannot resolve '{}' given deserializer input columns: [{}]",
                                            u.name_parts.iter().join("."),
                                            inputs.iter().map(|a| a.name.as_str()).join(", ")
                                        )
                                        .into()),
                                    }
                                }
                                Expr::UnresolvedExtractValue(u) if u.child.resolved() => {
                                    crate::expr::extract_value(*u.child, &u.extraction, resolver)
                                        .map(Transformed::yes)
                                }
                                e => Ok(Transformed::no(e)),
                            })?;
                            Ok(Transformed::yes(resolved.data))
                        }
                        e => Ok(Transformed::no(e)),
                    })
                })
            }
        })
    }

    fn name(&self) -> &str {
        "ResolveDeserializer"
    }
}

/// An inner-class construction needs the scope its class was defined in; the
/// outer-scope registry supplies it or the query fails.
#[derive(Debug)]
pub struct ResolveNewInstance;

impl AnalyzerRule for ResolveNewInstance {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p if p.resolved() => Ok(Transformed::no(p)),
            p => p.map_expressions(|expr| {
                expr.transform_up(|e| match e {
                    Expr::NewInstance(n)
                        if n.outer_needed
                            && !n.outer_resolved
                            && n.arguments.iter().all(|a| a.resolved()) =>
                    {
                        if outer_scope_exists(&n.class_name) {
                            Ok(Transformed::yes(Expr::NewInstance(NewInstance {
                                outer_resolved: true,
                                ..n
                            })))
                        } else {
                            Err(format!(
                                "Unable to generate an encoder for inner class `{}` without access to the scope that this class was defined in. Try moving this class out of its parent class.",
                                n.class_name
                            )
                            .into())
                        }
                    }
                    e => Ok(Transformed::no(e)),
                })
            }),
        })
    }

    fn name(&self) -> &str {
        "ResolveNewInstance"
    }
}

/// Replaces `UpCast` by a plain `Cast`, rejecting the implicit casts that can
/// silently lose information.
#[derive(Debug)]
pub struct ResolveUpCast;

fn decimal_wider_than(precision: u8, scale: u8, from: &DataType) -> bool {
    let int_digits = match from {
        DataType::Byte => 3,
        DataType::Short => 5,
        DataType::Int => 10,
        DataType::Long => 20,
        DataType::Decimal(p2, s2) => {
            return precision.saturating_sub(scale) >= p2.saturating_sub(*s2) && scale >= *s2;
        }
        _ => return false,
    };
    precision.saturating_sub(scale) >= int_digits
}

fn fail_up_cast(from: &DataType, to: &DataType) -> crate::AnalysisError {
    crate::AnalysisError::new(format!(
        "Cannot up cast from {} to {} as it may truncate",
        from, to
    ))
}

impl AnalyzerRule for ResolveUpCast {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p => p.map_expressions(|expr| {
                expr.transform_up(|e| match e {
                    Expr::UpCast(Cast { child, data_type }) if child.resolved() => {
                        let from = child.data_type();
                        let to = &data_type;
                        match (&from, to) {
                            (f, DataType::Decimal(p, s))
                                if f.is_numeric_type() && !decimal_wider_than(*p, *s, f) =>
                            {
                                Err(fail_up_cast(&from, to))
                            }
                            (f, t)
                                if f.is_numeric_type()
                                    && t.is_numeric_type()
                                    && f.numeric_precedence() > t.numeric_precedence() =>
                            {
                                Err(fail_up_cast(&from, to))
                            }
                            (DataType::Timestamp, DataType::Date) => {
                                Err(fail_up_cast(&from, to))
                            }
                            (DataType::String, t) if t.is_numeric_type() => {
                                Err(fail_up_cast(&from, to))
                            }
                            _ => Ok(Transformed::yes(Expr::Cast(Cast { child, data_type }))),
                        }
                    }
                    e => Ok(Transformed::no(e)),
                })
            }),
        })
    }

    fn name(&self) -> &str {
        "ResolveUpCast"
    }
}

/// Wraps user functions with primitive-typed parameters in a null guard: a
/// null in any primitive slot short-circuits the call to null. The guard is
/// applied to every primitive parameter, nullable input or not, until a
/// trustworthy nullability signal exists.
#[derive(Debug)]
pub struct HandleNullInputsForUDF;

impl AnalyzerRule for HandleNullInputsForUDF {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.resolved() => Ok(Transformed::no(p)),
            p => p.map_expressions(|expr| {
                expr.transform_up(|e| match e {
                    Expr::ScalarUdf(udf)
                        if udf
                            .input_primitives
                            .iter()
                            .zip(udf.args.iter())
                            .any(|(primitive, _)| *primitive) =>
                    {
                        let null_check = udf
                            .args
                            .iter()
                            .zip(udf.input_primitives.iter())
                            .filter(|(_, primitive)| **primitive)
                            .map(|(arg, _)| arg.clone().is_null())
                            .reduce(|a, b| a.or(b))
                            .expect("at least one primitive parameter");
                        let data_type = udf.data_type.clone();
                        Ok(Transformed::yes(Expr::ScalarFunction(Box::new(If::new(
                            null_check,
                            Expr::null_lit(data_type),
                            Expr::ScalarUdf(udf),
                        )))))
                    }
                    e => Ok(Transformed::no(e)),
                })
            }),
        })
    }

    fn name(&self) -> &str {
        "HandleNullInputsForUDF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::expr::AttributeReference;
    use crate::logical_plan::{LocalRelation, Project};

    fn relation() -> (AttributeReference, Arc<LogicalPlan>) {
        let a = AttributeReference::new("a", DataType::Int);
        let rel = LogicalPlan::LocalRelation(LocalRelation::new("t", vec![a.clone()]));
        (a, Arc::new(rel))
    }

    #[test]
    fn test_udf_primitive_args_guarded() {
        let (a, rel) = relation();
        let udf = ScalarUdf::new("plus_one", DataType::Int, vec![a.to_expr()], vec![true]);
        let plan = LogicalPlan::Project(Project::new(
            vec![Expr::ScalarUdf(udf).alias("v")],
            rel,
        ));
        let result = HandleNullInputsForUDF.analyze(plan).unwrap();
        assert!(result.transformed);
        let exprs = result.data.expressions()[0].clone();
        assert!(
            exprs
                .exists(|e| Ok(matches!(e, Expr::IsNull(_))))
                .unwrap(),
            "expected a null guard, got {:?}",
            exprs
        );
    }

    #[test]
    fn test_udf_boxed_args_untouched() {
        let (a, rel) = relation();
        let udf = ScalarUdf::new("fmt", DataType::String, vec![a.to_expr()], vec![false]);
        let plan = LogicalPlan::Project(Project::new(
            vec![Expr::ScalarUdf(udf).alias("v")],
            rel,
        ));
        let result = HandleNullInputsForUDF.analyze(plan).unwrap();
        assert!(!result.transformed);
    }

    #[test]
    fn test_inner_class_without_outer_scope_fails() {
        let (a, rel) = relation();
        let instance = NewInstance::inner_class("Handler$Inner", vec![a.to_expr()], DataType::Long);
        let plan = LogicalPlan::Project(Project::new(
            vec![Expr::NewInstance(instance).alias("v")],
            rel,
        ));
        let err = ResolveNewInstance.analyze(plan).unwrap_err();
        assert!(err.message.contains("Try moving this class out of its parent class"));
    }

    #[test]
    fn test_inner_class_with_outer_scope_resolves() {
        let (a, rel) = relation();
        add_outer_scope("Handler$Known");
        let instance = NewInstance::inner_class("Handler$Known", vec![a.to_expr()], DataType::Long);
        let plan = LogicalPlan::Project(Project::new(
            vec![Expr::NewInstance(instance).alias("v")],
            rel,
        ));
        let result = ResolveNewInstance.analyze(plan).unwrap();
        assert!(result.transformed);
        assert!(result.data.resolved());
    }

    #[test]
    fn test_up_cast_truncation_fails() {
        let (a, rel) = relation();
        let up = Expr::UpCast(Cast::new(a.to_expr().cast(DataType::Long), DataType::Int));
        let plan = LogicalPlan::Project(Project::new(vec![up.alias("v")], rel));
        let err = ResolveUpCast.analyze(plan).unwrap_err();
        assert!(err.message.contains("may truncate"));
    }

    #[test]
    fn test_up_cast_widening_becomes_cast() {
        let (a, rel) = relation();
        let up = Expr::UpCast(Cast::new(a.to_expr(), DataType::Long));
        let plan = LogicalPlan::Project(Project::new(vec![up.alias("v")], rel));
        let result = ResolveUpCast.analyze(plan).unwrap();
        assert!(result.transformed);
        assert!(
            result.data.expressions()[0]
                .exists(|e| Ok(matches!(e, Expr::Cast(_))))
                .unwrap()
        );
    }
}
