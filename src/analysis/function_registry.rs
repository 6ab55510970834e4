use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use crate::Result;
use crate::expr::*;
use crate::types::DataType;

type FunctionBuilder = dyn Fn(Vec<Expr>) -> Result<Expr> + Send + Sync;

struct FunctionRegistry {
    expressions: HashMap<String, Box<FunctionBuilder>>,
}

impl FunctionRegistry {
    pub fn lookup_function(&self, name: &str, args: Vec<Expr>) -> Result<Expr> {
        let builder = self.expressions.get(&name.to_lowercase());
        match builder {
            Some(builder) => match builder(args) {
                Ok(expr) => Ok(expr),
                Err(e) => Err(format!("invalid arguments for function {}: {}", name, e).into()),
            },
            None => Err(format!("undefined function {}", name).into()),
        }
    }

    pub fn register_function(&mut self, name: &str, builder: Box<FunctionBuilder>) {
        self.expressions.insert(name.to_lowercase(), builder);
    }
}

static FUNCTION_REGISTRY: LazyLock<Mutex<FunctionRegistry>> =
    LazyLock::new(|| Mutex::new(builtin_function_registry()));

pub fn register_function(name: &str, builder: Box<dyn Fn(Vec<Expr>) -> Result<Expr> + Send + Sync>) {
    let mut registry = FUNCTION_REGISTRY.lock().unwrap();
    registry.register_function(name, builder);
}

/// Registers a user function under the given name. The per-parameter
/// primitive flags stand in for reflection over the host function's
/// signature and drive the analyzer's null-input guards.
pub fn register_udf(name: &str, data_type: DataType, input_primitives: Vec<bool>) {
    let udf_name = name.to_string();
    register_function(
        name,
        Box::new(move |args| {
            Ok(Expr::ScalarUdf(ScalarUdf::new(
                udf_name.clone(),
                data_type.clone(),
                args,
                input_primitives.clone(),
            )))
        }),
    );
}

pub fn lookup_function(name: &str, args: Vec<Expr>) -> Result<Expr> {
    let registry = FUNCTION_REGISTRY.lock().unwrap();
    registry.lookup_function(name, args)
}

macro_rules! init_expressions {
    ($($($names:literal)|+ => $ty:ident),* $(,)?) => {
        {
            let mut expressions: HashMap<String, Box<FunctionBuilder>> = HashMap::new();
            $(
                $(
                    expressions.insert(
                        $names.to_string(),
                        Box::new(|args| $ty::create_function_expr(args))
                    );
                )+
            )*
            expressions
        }
    };
}

fn builtin_function_registry() -> FunctionRegistry {
    let mut expressions = init_expressions!(
        // str
        "length" => Length,
        "substring" | "substr" => Substring,
        "concat" => Concat,
        // math
        "ceil" | "ceiling" => Ceil,
        "floor" => Floor,
        // conditional
        "if" => If,
        "coalesce" => Coalesce,
        "assert_true" => AssertTrue,
        // misc
        "rand" | "random" => Rand,
        "hash" => Murmur3Hash,
        // aggregates
        "sum" => Sum,
        "count" => Count,
        "min" => Min,
        "max" => Max,
        "avg" | "mean" => Average,
        "first" | "first_value" => First,
        "last" | "last_value" => Last,
        // generators
        "explode" => Explode,
        "posexplode" => PosExplode,
        // window ranking
        "row_number" => RowNumber,
        "rank" => Rank,
        "dense_rank" => DenseRank,
    );
    expressions.insert("struct".to_string(), Box::new(|args| Ok(Expr::CreateStruct(args))));
    expressions.insert("array".to_string(), Box::new(|args| Ok(Expr::CreateArray(args))));
    FunctionRegistry { expressions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_scalar_function() {
        let expr = lookup_function("length", vec![Expr::string_lit("ab")]).unwrap();
        match expr {
            Expr::ScalarFunction(f) => assert_eq!(f.name(), "length"),
            other => panic!("expected scalar function, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_aggregate_wraps_complete() {
        let expr = lookup_function("sum", vec![Expr::int_lit(1)]).unwrap();
        match expr {
            Expr::AggregateExpression(agg) => {
                assert_eq!(agg.func.name(), "sum");
                assert!(!agg.distinct);
            }
            other => panic!("expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_unknown_function() {
        let err = lookup_function("nope", vec![]).unwrap_err();
        assert!(err.message.contains("undefined function"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(lookup_function("SUM", vec![Expr::int_lit(1)]).is_ok());
    }
}
