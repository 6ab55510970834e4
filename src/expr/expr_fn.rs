use std::ops;
use crate::Operator;
use crate::expr::{
    BinaryOperator, Expr, UnresolvedAttribute, UnresolvedFunction, UnresolvedGenerator,
};

/// Return a new expression `left <op> right`
pub fn binary_expr(left: Expr, op: Operator, right: Expr) -> Expr {
    Expr::BinaryOperator(BinaryOperator::new(Box::new(left), op, Box::new(right)))
}

/// Column reference by (possibly dotted) name, unresolved until analysis.
pub fn col(name: &str) -> Expr {
    Expr::UnresolvedAttribute(UnresolvedAttribute::new(
        name.split('.').map(|s| s.to_string()).collect(),
    ))
}

pub fn star() -> Expr {
    Expr::UnresolvedStar(None)
}

pub fn qualified_star(target: &str) -> Expr {
    Expr::UnresolvedStar(Some(target.to_string()))
}

/// Unresolved call of a registered function.
pub fn call(name: &str, arguments: Vec<Expr>) -> Expr {
    Expr::UnresolvedFunction(UnresolvedFunction {
        name: name.to_string(),
        arguments,
        distinct: false,
    })
}

pub fn call_distinct(name: &str, arguments: Vec<Expr>) -> Expr {
    Expr::UnresolvedFunction(UnresolvedFunction {
        name: name.to_string(),
        arguments,
        distinct: true,
    })
}

pub fn unresolved_generator(name: &str, arguments: Vec<Expr>) -> Expr {
    Expr::UnresolvedGenerator(UnresolvedGenerator { name: name.to_string(), arguments })
}

pub fn sum(expr: Expr) -> Expr {
    call("sum", vec![expr])
}

pub fn count(expr: Expr) -> Expr {
    call("count", vec![expr])
}

pub fn min(expr: Expr) -> Expr {
    call("min", vec![expr])
}

pub fn max(expr: Expr) -> Expr {
    call("max", vec![expr])
}

pub fn avg(expr: Expr) -> Expr {
    call("avg", vec![expr])
}

impl Expr {
    /// Return `self = other`
    pub fn eq_expr(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Eq, other)
    }

    /// Return `self > other`
    pub fn gt(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Gt, other)
    }

    /// Return `self >= other`
    pub fn gt_eq(self, other: Expr) -> Expr {
        binary_expr(self, Operator::GtEq, other)
    }

    /// Return `self < other`
    pub fn lt(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Lt, other)
    }

    /// Return `self <= other`
    pub fn lt_eq(self, other: Expr) -> Expr {
        binary_expr(self, Operator::LtEq, other)
    }

    /// Return `self AND other`
    pub fn and(self, other: Expr) -> Expr {
        binary_expr(self, Operator::And, other)
    }

    /// Return `self OR other`
    pub fn or(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Or, other)
    }

    /// Return `self LIKE other`
    pub fn like(self, other: Expr) -> Expr {
        Expr::Like(crate::expr::Like::new(Box::new(self), Box::new(other)))
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Plus, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Minus, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Multiply, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Divide, rhs)
    }
}

impl ops::Rem for Expr {
    type Output = Expr;

    fn rem(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Modulo, rhs)
    }
}

impl ops::Shr for Expr {
    type Output = Expr;

    fn shr(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::BitShiftRight, rhs)
    }
}

impl ops::BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::BitAnd, rhs)
    }
}
