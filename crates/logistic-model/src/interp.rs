//! Evaluation of [`Expr`] trees over one tile.
//!
//! Values are scalars or row-major arrays the size of the tile; arithmetic
//! broadcasts a scalar against an array. NaN and infinities pass through.

use std::f64::consts::PI;

use crate::error::EvaluationError;
use crate::expr::{Expr, GroundMotion};

/// A scalar or a tile-sized array.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Value {
    pub fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(v)),
            Value::Array(mut values) => {
                values.iter_mut().for_each(|v| *v = f(*v));
                Value::Array(values)
            }
        }
    }

    /// Combine two values cell by cell.
    pub fn zip_with(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, EvaluationError> {
        Ok(match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
            (Value::Scalar(a), Value::Array(mut bs)) => {
                bs.iter_mut().for_each(|b| *b = f(a, *b));
                Value::Array(bs)
            }
            (Value::Array(mut a_s), Value::Scalar(b)) => {
                a_s.iter_mut().for_each(|a| *a = f(*a, b));
                Value::Array(a_s)
            }
            (Value::Array(mut a_s), Value::Array(bs)) => {
                if a_s.len() != bs.len() {
                    return Err(EvaluationError::LengthMismatch {
                        left: a_s.len(),
                        right: bs.len(),
                    });
                }
                a_s.iter_mut().zip(bs).for_each(|(a, b)| *a = f(*a, b));
                Value::Array(a_s)
            }
        })
    }

    /// Expand to `len` cells.
    pub fn into_array(self, len: usize) -> Result<Vec<f64>, EvaluationError> {
        match self {
            Value::Scalar(v) => Ok(vec![v; len]),
            Value::Array(values) if values.len() == len => Ok(values),
            Value::Array(values) => Err(EvaluationError::LengthMismatch {
                left: values.len(),
                right: len,
            }),
        }
    }
}

/// What an expression can read while it is evaluated.
pub trait Scope {
    /// Predictor layer values.
    fn layer(&self, name: &str) -> Result<Vec<f64>, EvaluationError> {
        Err(EvaluationError::Unbound(format!("layer {name}")))
    }

    /// Shaking values.
    fn shake(&self, gm: GroundMotion) -> Result<Vec<f64>, EvaluationError> {
        Err(EvaluationError::Unbound(format!("shaking {gm}")))
    }

    /// Shaking uncertainty (standard deviation of the natural log).
    fn uncertainty(&self, gm: GroundMotion) -> Result<Vec<f64>, EvaluationError> {
        Err(EvaluationError::Unbound(gm.uncertainty_field().to_string()))
    }

    /// Input variable of a transform.
    fn variable(&self, name: &str) -> Result<Value, EvaluationError> {
        Err(EvaluationError::Unbound(name.to_string()))
    }

    fn magnitude(&self) -> Result<f64, EvaluationError> {
        Err(EvaluationError::Unbound("MW".to_string()))
    }

    fn numstd(&self) -> f64 {
        1.0
    }
}

/// A transform input: one named array.
pub struct VariableScope<'a> {
    pub name: &'a str,
    pub values: &'a [f64],
}

impl Scope for VariableScope<'_> {
    fn variable(&self, name: &str) -> Result<Value, EvaluationError> {
        if name == self.name {
            Ok(Value::Array(self.values.to_vec()))
        } else {
            Err(EvaluationError::Unbound(name.to_string()))
        }
    }
}

/// Apply a transform of one variable to every cell of `values`.
pub fn transform(expr: &Expr, variable: &str, values: &[f64]) -> Result<Vec<f64>, EvaluationError> {
    let scope = VariableScope { name: variable, values };
    eval(expr, &scope)?.into_array(values.len())
}

/// Evaluate `expr` in `scope`.
pub fn eval(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Number(v) => Ok(Value::Scalar(*v)),
        Expr::Pi => Ok(Value::Scalar(PI)),
        Expr::Magnitude => Ok(Value::Scalar(scope.magnitude()?)),
        Expr::Variable(name) => scope.variable(name),
        Expr::Layer(name) => Ok(Value::Array(scope.layer(name)?)),
        Expr::NanToNum(inner) => Ok(eval(inner, scope)?.map(nan_to_num)),
        Expr::Shake(gm) => Ok(Value::Array(scope.shake(*gm)?)),
        Expr::Perturbed(gm, direction) => {
            let offset = direction.sign() * scope.numstd();
            let raw = Value::Array(scope.shake(*gm)?);
            let std = Value::Array(scope.uncertainty(*gm)?);
            raw.zip_with(std, |x, s| (x.ln() + offset * s).exp())
        }
        Expr::Call(func, args) => match args.as_slice() {
            [x] => Ok(eval(x, scope)?.map(|v| func.apply1(v))),
            [a, b] => {
                let a = eval(a, scope)?;
                let b = eval(b, scope)?;
                a.zip_with(b, |x, y| func.apply2(x, y))
            }
            _ => Err(EvaluationError::Unbound(format!("{} with {} arguments", func.name(), args.len()))),
        },
        Expr::Neg(inner) => Ok(eval(inner, scope)?.map(|v| -v)),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            lhs.zip_with(rhs, |a, b| op.apply(a, b))
        }
    }
}

/// NaN to 0, infinities to the largest finite values.
pub fn nan_to_num(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else if v == f64::INFINITY {
        f64::MAX
    } else if v == f64::NEG_INFINITY {
        f64::MIN
    } else {
        v
    }
}
