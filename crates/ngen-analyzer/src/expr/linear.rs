//! Linear decomposition of expressions, used by the implicit and exponential
//! discretizations and by the coupled-system assembly.

use crate::expr::ast::{BinOp, Expr, UnaryOp};

/// Decompose `expr` as `coef * var + rest` with both parts free of `var`.
/// Returns `None` when the expression is not linear in `var`.
pub fn decompose_linear(expr: &Expr, var: &str) -> Option<(Expr, Expr)> {
    let (coef, rest) = decompose(expr, var)?;
    Some((coef.fold(), rest.fold()))
}

fn decompose(expr: &Expr, var: &str) -> Option<(Expr, Expr)> {
    match expr {
        Expr::Num(_) | Expr::Bool(_) => Some((Expr::Num(0.0), expr.clone())),
        Expr::Ident(name) => {
            if name == var {
                Some((Expr::Num(1.0), Expr::Num(0.0)))
            } else {
                Some((Expr::Num(0.0), expr.clone()))
            }
        }
        Expr::Unary(UnaryOp::Neg, e) => {
            let (a, b) = decompose(e, var)?;
            Some((Expr::neg(a), Expr::neg(b)))
        }
        Expr::Unary(UnaryOp::Not, e) => {
            if e.is_free_of(var) {
                Some((Expr::Num(0.0), expr.clone()))
            } else {
                None
            }
        }
        Expr::Binary(BinOp::Add, l, r) => {
            let (a1, b1) = decompose(l, var)?;
            let (a2, b2) = decompose(r, var)?;
            Some((Expr::bin(BinOp::Add, a1, a2), Expr::bin(BinOp::Add, b1, b2)))
        }
        Expr::Binary(BinOp::Sub, l, r) => {
            let (a1, b1) = decompose(l, var)?;
            let (a2, b2) = decompose(r, var)?;
            Some((Expr::bin(BinOp::Sub, a1, a2), Expr::bin(BinOp::Sub, b1, b2)))
        }
        Expr::Binary(BinOp::Mul, l, r) => {
            if l.is_free_of(var) {
                let (a, b) = decompose(r, var)?;
                Some((
                    Expr::bin(BinOp::Mul, (**l).clone(), a),
                    Expr::bin(BinOp::Mul, (**l).clone(), b),
                ))
            } else if r.is_free_of(var) {
                let (a, b) = decompose(l, var)?;
                Some((
                    Expr::bin(BinOp::Mul, a, (**r).clone()),
                    Expr::bin(BinOp::Mul, b, (**r).clone()),
                ))
            } else {
                None
            }
        }
        Expr::Binary(BinOp::Div, l, r) => {
            if r.is_free_of(var) {
                let (a, b) = decompose(l, var)?;
                Some((
                    Expr::bin(BinOp::Div, a, (**r).clone()),
                    Expr::bin(BinOp::Div, b, (**r).clone()),
                ))
            } else {
                None
            }
        }
        // Powers, calls and conditionals are linear only when free of var
        _ => {
            if expr.is_free_of(var) {
                Some((Expr::Num(0.0), expr.clone()))
            } else {
                None
            }
        }
    }
}

/// Decompose `expr` as `sum_j coefs[j] * vars[j] + rest`, all parts free of
/// every name in `vars`. Returns `None` on any nonlinearity.
pub fn decompose_multilinear(expr: &Expr, vars: &[String]) -> Option<(Vec<Expr>, Expr)> {
    let mut coefs = Vec::with_capacity(vars.len());
    let mut rest = expr.clone();
    for var in vars {
        let (coef, r) = decompose_linear(&rest, var)?;
        // Cross terms would leave another unknown inside the coefficient
        for other in vars {
            if other != var && !coef.is_free_of(other) {
                return None;
            }
        }
        coefs.push(coef);
        rest = r;
    }
    for var in vars {
        if !rest.is_free_of(var) {
            return None;
        }
    }
    Some((coefs, rest.fold()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;
    use std::collections::BTreeMap;

    #[test]
    fn leak_form_decomposes() {
        // (baseline - r)/tau  =  (-1/tau)*r + baseline/tau
        let e = parse_expression("(baseline - r) / tau").unwrap();
        let (coef, rest) = decompose_linear(&e, "r").unwrap();
        let mut env = BTreeMap::new();
        env.insert("baseline".to_string(), 4.0);
        env.insert("tau".to_string(), 2.0);
        assert_eq!(coef.eval(&env), Some(-0.5));
        assert_eq!(rest.eval(&env), Some(2.0));
    }

    #[test]
    fn nonlinear_terms_are_rejected() {
        let e = parse_expression("r * r").unwrap();
        assert!(decompose_linear(&e, "r").is_none());
        let e = parse_expression("exp(r)").unwrap();
        assert!(decompose_linear(&e, "r").is_none());
        let e = parse_expression("a / r").unwrap();
        assert!(decompose_linear(&e, "r").is_none());
    }

    #[test]
    fn multilinear_over_two_variables() {
        // u - 2*w + c
        let e = parse_expression("u - 2.0 * w + c").unwrap();
        let vars = vec!["u".to_string(), "w".to_string()];
        let (coefs, rest) = decompose_multilinear(&e, &vars).unwrap();
        let env: BTreeMap<String, f64> = [("c".to_string(), 3.0)].into_iter().collect();
        assert_eq!(coefs[0].eval(&env), Some(1.0));
        assert_eq!(coefs[1].eval(&env), Some(-2.0));
        assert_eq!(rest.eval(&env), Some(3.0));
    }

    #[test]
    fn cross_products_are_rejected() {
        let e = parse_expression("u * w").unwrap();
        let vars = vec!["u".to_string(), "w".to_string()];
        assert!(decompose_multilinear(&e, &vars).is_none());
    }
}
