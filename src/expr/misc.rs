use std::any::Any;
use crate::Result;
use crate::expr::{Expr, ScalarFunction};
use crate::expr::string::CreateScalarFunction;
use crate::types::DataType;

/// Uniform random double in [0, 1). The analyzer only cares that it is
/// non-deterministic; evaluation belongs to the physical layer.
#[derive(Clone, Debug)]
pub struct Rand {
    pub seed: Option<i64>,
}

impl ScalarFunction for Rand {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "rand"
    }

    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn nullable(&self) -> bool {
        false
    }

    fn args(&self) -> Vec<&Expr> {
        vec![]
    }

    fn foldable(&self) -> bool {
        false
    }

    fn deterministic(&self) -> bool {
        false
    }

    fn rewrite_args(&self, _args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(self.clone())
    }
}

impl CreateScalarFunction for Rand {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        match args.len() {
            0 => Ok(Box::new(Rand { seed: None })),
            1 => match &args[0] {
                Expr::Literal(l) => match l.value {
                    crate::data::Value::Int(v) => Ok(Box::new(Rand { seed: Some(v as i64) })),
                    crate::data::Value::Long(v) => Ok(Box::new(Rand { seed: Some(v) })),
                    _ => Err("rand seed must be an integral literal".into()),
                },
                _ => Err("rand seed must be an integral literal".into()),
            },
            n => Err(format!("rand requires zero or one argument, got {}", n).into()),
        }
    }
}

/// Murmur3 32-bit hash of any number of columns.
#[derive(Clone, Debug)]
pub struct Murmur3Hash {
    pub args: Vec<Expr>,
}

impl ScalarFunction for Murmur3Hash {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "hash"
    }

    fn data_type(&self) -> DataType {
        DataType::Int
    }

    fn nullable(&self) -> bool {
        false
    }

    fn args(&self) -> Vec<&Expr> {
        self.args.iter().collect()
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Murmur3Hash { args })
    }
}

impl CreateScalarFunction for Murmur3Hash {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.is_empty() {
            return Err("hash requires at least one argument".into());
        }
        Ok(Box::new(Murmur3Hash { args }))
    }
}
