//! Coupled implicit/midpoint systems, advanced as one atomic block.
//!
//! For the coupled set the per-variable slopes must be jointly linear:
//! `f_i = sum_j J_ij * x_j + b_i`. The step solves `A * x' = B * x + c`
//! symbolically, where implicit rows use `A = I - dt*J, B = I` and midpoint
//! rows use `A = I - dt/2*J, B = I + dt/2*J`.

use tracing::debug;

use ngen_model::Method;

use crate::error::{AnalyzerError, Result};
use crate::expr::{decompose_multilinear, BinOp, Expr};
use crate::translate::Translator;

/// Fixed bound on the coupled-set size
pub const MAX_COUPLED: usize = 8;

/// One participant of a coupled set
#[derive(Debug, Clone)]
pub struct CoupledVariable {
    /// Variable name
    pub name: String,
    /// `implicit` or `midpoint`
    pub method: Method,
    /// Slope expression in terms of step-n values
    pub slope: Expr,
    /// Scalar type name for the emitted temporary
    pub ctype: &'static str,
}

/// Solve the coupled set and return, per variable, the closed-form
/// step-(n+1) expression in terms of step-n values.
pub fn solve_coupled(vars: &[CoupledVariable]) -> Result<Vec<Expr>> {
    if vars.len() > MAX_COUPLED {
        return Err(AnalyzerError::TooManyCoupled {
            count: vars.len(),
            max: MAX_COUPLED,
        });
    }
    let names: Vec<String> = vars.iter().map(|v| v.name.clone()).collect();
    let n = names.len();
    let dt = Expr::ident("dt");

    // Assemble the augmented system row by row
    let mut rows: Vec<Vec<Expr>> = Vec::with_capacity(n);
    let mut rhs: Vec<Expr> = Vec::with_capacity(n);
    for (i, var) in vars.iter().enumerate() {
        let (coefs, rest) =
            decompose_multilinear(&var.slope, &names).ok_or_else(|| {
                AnalyzerError::NonLinearImplicit {
                    variable: var.name.clone(),
                }
            })?;
        let h = match var.method {
            Method::Midpoint => Expr::bin(BinOp::Mul, Expr::num(0.5), dt.clone()),
            _ => dt.clone(),
        };
        let mut row = Vec::with_capacity(n);
        let mut r = Expr::ident(var.name.clone());
        for (j, coef) in coefs.iter().enumerate() {
            let scaled = Expr::bin(
                BinOp::Mul,
                h.clone(),
                coef.clone(),
            );
            let diag = if i == j { Expr::num(1.0) } else { Expr::num(0.0) };
            row.push(Expr::bin(BinOp::Sub, diag, scaled.clone()).fold());
            if var.method == Method::Midpoint {
                // B = I + dt/2*J contributes the step-n half of the slope
                r = Expr::bin(
                    BinOp::Add,
                    r,
                    Expr::bin(BinOp::Mul, scaled, Expr::ident(names[j].clone())),
                );
            }
        }
        r = Expr::bin(
            BinOp::Add,
            r,
            Expr::bin(BinOp::Mul, dt.clone(), rest),
        )
        .fold();
        rows.push(row);
        rhs.push(r);
    }

    debug!(count = n, "solving coupled system");
    gauss_jordan(&mut rows, &mut rhs, &names)?;
    Ok(rhs)
}

/// In-place Gauss-Jordan elimination over symbolic entries
fn gauss_jordan(rows: &mut [Vec<Expr>], rhs: &mut [Expr], names: &[String]) -> Result<()> {
    let n = rows.len();
    for col in 0..n {
        // Pivot: first row at or below the diagonal with a nonzero entry
        let pivot_row = (col..n)
            .find(|&r| !rows[r][col].fold().is_zero())
            .ok_or_else(|| AnalyzerError::SingularCoupling {
                variables: names.join(", "),
            })?;
        rows.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        // Normalize the pivot row
        let pivot = rows[col][col].clone();
        if !pivot.is_one() {
            for j in 0..n {
                rows[col][j] =
                    Expr::bin(BinOp::Div, rows[col][j].clone(), pivot.clone()).fold();
            }
            rhs[col] = Expr::bin(BinOp::Div, rhs[col].clone(), pivot.clone()).fold();
        }

        // Eliminate the column everywhere else
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = rows[r][col].clone();
            if factor.fold().is_zero() {
                continue;
            }
            for j in 0..n {
                rows[r][j] = Expr::bin(
                    BinOp::Sub,
                    rows[r][j].clone(),
                    Expr::bin(BinOp::Mul, factor.clone(), rows[col][j].clone()),
                )
                .fold();
            }
            rhs[r] = Expr::bin(
                BinOp::Sub,
                rhs[r].clone(),
                Expr::bin(BinOp::Mul, factor, rhs[col].clone()),
            )
            .fold();
        }
    }
    Ok(())
}

/// Render the atomic update block for a solved coupled set. All temporaries
/// are declared before any write so every participant advances from step-n
/// state.
pub fn render_block(
    vars: &[CoupledVariable],
    solutions: &[Expr],
    translator: &Translator,
) -> String {
    let mut block = String::new();
    for (var, sol) in vars.iter().zip(solutions) {
        block.push_str(&format!(
            "{} _{} = {};\n",
            var.ctype,
            var.name,
            translator.render(sol)
        ));
    }
    for var in vars {
        block.push_str(&format!(
            "{} = _{};\n",
            translator.indexed(&var.name),
            var.name
        ));
    }
    block.pop();
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;
    use std::collections::BTreeMap;

    fn coupled(u_slope: &str, w_slope: &str, method: Method) -> Vec<CoupledVariable> {
        vec![
            CoupledVariable {
                name: "u".into(),
                method,
                slope: parse_expression(u_slope).unwrap(),
                ctype: "double",
            },
            CoupledVariable {
                name: "w".into(),
                method,
                slope: parse_expression(w_slope).unwrap(),
                ctype: "double",
            },
        ]
    }

    #[test]
    fn implicit_pair_matches_matrix_inverse() {
        // du/dt = -u + 2w, dw/dt = u - 3w
        let vars = coupled("-u + 2.0*w", "u - 3.0*w", Method::Implicit);
        let sols = solve_coupled(&vars).unwrap();

        let dt = 0.1;
        let mut u = 1.0f64;
        let mut w = 0.5f64;
        for _ in 0..1000 {
            let mut env = BTreeMap::new();
            env.insert("dt".to_string(), dt);
            env.insert("u".to_string(), u);
            env.insert("w".to_string(), w);
            let nu = sols[0].eval(&env).unwrap();
            let nw = sols[1].eval(&env).unwrap();

            // Closed form: (I - dt*J)^-1 * x with J = [[-1, 2], [1, -3]]
            let a11 = 1.0 + dt;
            let a12 = -2.0 * dt;
            let a21 = -dt;
            let a22 = 1.0 + 3.0 * dt;
            let det = a11 * a22 - a12 * a21;
            let eu = (a22 * u - a12 * w) / det;
            let ew = (-a21 * u + a11 * w) / det;

            assert!((nu - eu).abs() < 1e-9, "u mismatch: {} vs {}", nu, eu);
            assert!((nw - ew).abs() < 1e-9, "w mismatch: {} vs {}", nw, ew);
            u = nu;
            w = nw;
        }
    }

    #[test]
    fn midpoint_pair_is_second_order_on_decay() {
        // Decoupled midpoint rows reduce to (1 - dt/2)/(1 + dt/2) per step
        let vars = coupled("-u", "-w", Method::Midpoint);
        let sols = solve_coupled(&vars).unwrap();
        let mut env = BTreeMap::new();
        env.insert("dt".to_string(), 0.1);
        env.insert("u".to_string(), 1.0);
        env.insert("w".to_string(), 1.0);
        let expect = (1.0 - 0.05) / (1.0 + 0.05);
        assert!((sols[0].eval(&env).unwrap() - expect).abs() < 1e-12);
        assert!((sols[1].eval(&env).unwrap() - expect).abs() < 1e-12);
    }

    #[test]
    fn shared_slope_stays_regular() {
        // Identical slopes still give a regular step matrix
        let vars = coupled("w - u", "w - u", Method::Implicit);
        assert!(solve_coupled(&vars).is_ok());
    }

    #[test]
    fn singular_system_is_rejected() {
        // A pivot column of literal zeros has no invertible step matrix
        let mut rows = vec![
            vec![Expr::num(0.0), Expr::num(1.0)],
            vec![Expr::num(0.0), Expr::num(2.0)],
        ];
        let mut rhs = vec![Expr::ident("u"), Expr::ident("w")];
        let names = ["u".to_string(), "w".to_string()];
        let err = gauss_jordan(&mut rows, &mut rhs, &names).unwrap_err();
        assert!(matches!(err, AnalyzerError::SingularCoupling { .. }));
    }

    #[test]
    fn oversized_set_is_rejected() {
        let mut vars = Vec::new();
        for i in 0..9 {
            vars.push(CoupledVariable {
                name: format!("x{}", i),
                method: Method::Implicit,
                slope: parse_expression(&format!("-x{}", i)).unwrap(),
                ctype: "double",
            });
        }
        let err = solve_coupled(&vars).unwrap_err();
        assert!(matches!(err, AnalyzerError::TooManyCoupled { count: 9, max: 8 }));
    }
}
