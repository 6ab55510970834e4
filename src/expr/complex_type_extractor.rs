use std::any::Any;
use crate::Result;
use crate::data::Value;
use crate::expr::{Expr, ScalarFunction};
use crate::types::DataType;

/// Builds the typed getter for `child[extraction]` once the child's type is
/// known: struct field by name, array element by index, or map value by key.
pub fn extract_value(child: Expr, extraction: &Expr, resolver: crate::config::Resolver) -> Result<Expr> {
    match child.data_type() {
        DataType::Struct(fields) => {
            let field_name = match extraction {
                Expr::Literal(l) => match &l.value {
                    Value::String(s) => s.as_ref().clone(),
                    other => other.to_string(),
                },
                other => {
                    return Err(format!("field name should be a string literal, got {}", other).into());
                }
            };
            let matched = fields
                .0
                .iter()
                .position(|f| resolver(&f.name, &field_name));
            match matched {
                Some(ordinal) => Ok(Expr::ScalarFunction(Box::new(GetStructField {
                    child,
                    ordinal,
                    field: fields.0[ordinal].clone(),
                }))),
                None => Err(format!(
                    "no such struct field {} in {}",
                    field_name,
                    fields.0.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
                )
                .into()),
            }
        }
        DataType::Array(_) => Ok(Expr::ScalarFunction(Box::new(GetArrayItem {
            child,
            ordinal: extraction.clone(),
        }))),
        DataType::Map(_, _) => Ok(Expr::ScalarFunction(Box::new(GetMapValue {
            child,
            key: extraction.clone(),
        }))),
        other => Err(format!("can't extract value from {} of type {}", child, other).into()),
    }
}

#[derive(Clone, Debug)]
pub struct GetStructField {
    pub child: Expr,
    pub ordinal: usize,
    pub field: crate::types::Field,
}

impl ScalarFunction for GetStructField {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "getstructfield"
    }

    fn data_type(&self) -> DataType {
        self.field.data_type.clone()
    }

    fn nullable(&self) -> bool {
        self.child.nullable() || self.field.nullable
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn check_input_data_types(&self) -> Result<()> {
        match self.child.data_type() {
            DataType::Struct(_) => Ok(()),
            other => Err(format!("getstructfield requires a struct, not {}", other).into()),
        }
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(GetStructField {
            child: args.remove(0),
            ordinal: self.ordinal,
            field: self.field.clone(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct GetArrayItem {
    pub child: Expr,
    pub ordinal: Expr,
}

impl ScalarFunction for GetArrayItem {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "getarrayitem"
    }

    fn data_type(&self) -> DataType {
        match self.child.data_type() {
            DataType::Array(element) => *element,
            other => other,
        }
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child, &self.ordinal]
    }

    fn check_input_data_types(&self) -> Result<()> {
        if !matches!(self.child.data_type(), DataType::Array(_)) {
            return Err(format!(
                "getarrayitem requires an array, not {}",
                self.child.data_type()
            )
            .into());
        }
        if !self.ordinal.data_type().is_integral_type() {
            return Err(format!(
                "array ordinal must be integral, not {}",
                self.ordinal.data_type()
            )
            .into());
        }
        Ok(())
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        let child = args.remove(0);
        let ordinal = args.remove(0);
        Box::new(GetArrayItem { child, ordinal })
    }
}

#[derive(Clone, Debug)]
pub struct GetMapValue {
    pub child: Expr,
    pub key: Expr,
}

impl ScalarFunction for GetMapValue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "getmapvalue"
    }

    fn data_type(&self) -> DataType {
        match self.child.data_type() {
            DataType::Map(_, value) => *value,
            other => other,
        }
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child, &self.key]
    }

    fn check_input_data_types(&self) -> Result<()> {
        match self.child.data_type() {
            DataType::Map(key, _) => {
                if self.key.data_type() != *key {
                    Err(format!(
                        "map key must be {}, not {}",
                        key,
                        self.key.data_type()
                    )
                    .into())
                } else {
                    Ok(())
                }
            }
            other => Err(format!("getmapvalue requires a map, not {}", other).into()),
        }
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        let child = args.remove(0);
        let key = args.remove(0);
        Box::new(GetMapValue { child, key })
    }
}
