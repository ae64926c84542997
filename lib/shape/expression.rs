//! Symbolic expressions over values, used for constraints, guards and object
//! sizes.

use crate::shape::{ExplicitValue, FieldType, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum UnaryOperator {
    Negate,
    Not,
    LogicalNot,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOperator {
    /// The operator that gives the same result with its operands swapped,
    /// for comparisons.
    pub fn reversed(&self) -> Option<BinaryOperator> {
        match *self {
            BinaryOperator::Equal => Some(BinaryOperator::Equal),
            BinaryOperator::NotEqual => Some(BinaryOperator::NotEqual),
            BinaryOperator::LessThan => Some(BinaryOperator::GreaterThan),
            BinaryOperator::LessEqual => Some(BinaryOperator::GreaterEqual),
            BinaryOperator::GreaterThan => Some(BinaryOperator::LessThan),
            BinaryOperator::GreaterEqual => Some(BinaryOperator::LessEqual),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::And => "&",
            BinaryOperator::Or => "|",
            BinaryOperator::Xor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::LogicalAnd => "&&",
            BinaryOperator::LogicalOr => "||",
        };
        write!(f, "{}", s)
    }
}

/// An expression over symbolic values.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum SymbolicExpression {
    Explicit(ExplicitValue),
    Symbolic(Value),
    Unknown,
    Unary(UnaryOperator, Box<SymbolicExpression>),
    Binary(
        BinaryOperator,
        Box<SymbolicExpression>,
        Box<SymbolicExpression>,
    ),
    Cast(FieldType, Box<SymbolicExpression>),
}

impl SymbolicExpression {
    pub fn explicit<I: Into<num_bigint::BigInt>>(value: I) -> SymbolicExpression {
        SymbolicExpression::Explicit(ExplicitValue::new(value))
    }

    pub fn symbolic(value: Value) -> SymbolicExpression {
        SymbolicExpression::Symbolic(value)
    }

    pub fn unary(op: UnaryOperator, operand: SymbolicExpression) -> SymbolicExpression {
        SymbolicExpression::Unary(op, Box::new(operand))
    }

    pub fn binary(
        op: BinaryOperator,
        lhs: SymbolicExpression,
        rhs: SymbolicExpression,
    ) -> SymbolicExpression {
        SymbolicExpression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn cast(field_type: FieldType, operand: SymbolicExpression) -> SymbolicExpression {
        SymbolicExpression::Cast(field_type, Box::new(operand))
    }

    /// Every symbolic value this expression mentions.
    pub fn values(&self) -> BTreeSet<Value> {
        let mut values = BTreeSet::new();
        self.collect_values(&mut values);
        values
    }

    fn collect_values(&self, values: &mut BTreeSet<Value>) {
        match *self {
            SymbolicExpression::Symbolic(value) => {
                values.insert(value);
            }
            SymbolicExpression::Explicit(_) | SymbolicExpression::Unknown => {}
            SymbolicExpression::Unary(_, ref operand)
            | SymbolicExpression::Cast(_, ref operand) => operand.collect_values(values),
            SymbolicExpression::Binary(_, ref lhs, ref rhs) => {
                lhs.collect_values(values);
                rhs.collect_values(values);
            }
        }
    }

    /// Replace every occurrence of `old` with `new`.
    pub fn replace_value(&mut self, old: Value, new: Value) {
        match *self {
            SymbolicExpression::Symbolic(ref mut value) => {
                if *value == old {
                    *value = new;
                }
            }
            SymbolicExpression::Explicit(_) | SymbolicExpression::Unknown => {}
            SymbolicExpression::Unary(_, ref mut operand)
            | SymbolicExpression::Cast(_, ref mut operand) => operand.replace_value(old, new),
            SymbolicExpression::Binary(_, ref mut lhs, ref mut rhs) => {
                lhs.replace_value(old, new);
                rhs.replace_value(old, new);
            }
        }
    }
}

impl fmt::Display for SymbolicExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SymbolicExpression::Explicit(ref value) => write!(f, "{}", value),
            SymbolicExpression::Symbolic(value) => write!(f, "{}", value),
            SymbolicExpression::Unknown => write!(f, "?"),
            SymbolicExpression::Unary(op, ref operand) => match op {
                UnaryOperator::Negate => write!(f, "-({})", operand),
                UnaryOperator::Not => write!(f, "~({})", operand),
                UnaryOperator::LogicalNot => write!(f, "!({})", operand),
            },
            SymbolicExpression::Binary(op, ref lhs, ref rhs) => {
                write!(f, "({} {} {})", lhs, op, rhs)
            }
            SymbolicExpression::Cast(field_type, ref operand) => {
                write!(f, "({}){}", field_type, operand)
            }
        }
    }
}

/// A constraint: a single expression, or a conjunction or disjunction of
/// constraints.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Constraint {
    Simple(SymbolicExpression),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
}

impl Constraint {
    /// Every symbolic value this constraint mentions.
    pub fn values(&self) -> BTreeSet<Value> {
        match *self {
            Constraint::Simple(ref expression) => expression.values(),
            Constraint::And(ref constraints) | Constraint::Or(ref constraints) => constraints
                .iter()
                .flat_map(|constraint| constraint.values())
                .collect(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (constraints, separator) = match *self {
            Constraint::Simple(ref expression) => return write!(f, "{}", expression),
            Constraint::And(ref constraints) => (constraints, " && "),
            Constraint::Or(ref constraints) => (constraints, " || "),
        };
        let parts = constraints
            .iter()
            .map(|constraint| constraint.to_string())
            .collect::<Vec<String>>();
        write!(f, "[{}]", parts.join(separator))
    }
}
