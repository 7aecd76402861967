//! User-defined pure scalar functions, declared as `name(args) = body`

use std::collections::BTreeSet;

use ngen_model::{extract_declarations, DeclMode, Function, ModelError};

use crate::error::{AnalyzerError, Result};
use crate::expr::{parse_expression, BUILTIN_FUNCTIONS};

/// Parse a function block into target-dialect functions. Bodies may only
/// reference their own arguments, built-ins, and previously defined
/// functions.
pub fn parse_functions(text: &str) -> Result<Vec<Function>> {
    let mut out: Vec<Function> = Vec::new();
    if text.trim().is_empty() {
        return Ok(out);
    }
    for decl in extract_declarations(text, DeclMode::Equations)? {
        let (name, args) = parse_signature(&decl.lhs)?;
        if decl.op != "=" {
            return Err(ModelError::malformed(&decl.lhs, "functions take a plain '='").into());
        }
        let body_ast = parse_expression(&decl.rhs)?;

        let mut idents = BTreeSet::new();
        body_ast.free_idents(&mut idents);
        for ident in &idents {
            if !args.contains(ident) {
                return Err(AnalyzerError::unresolved(ident, &decl.rhs));
            }
        }
        let mut calls = BTreeSet::new();
        body_ast.called_functions(&mut calls);
        for call in &calls {
            if !BUILTIN_FUNCTIONS.contains(&call.as_str())
                && !out.iter().any(|f| f.name == *call)
            {
                return Err(AnalyzerError::unresolved(format!("{}()", call), &decl.rhs));
            }
        }

        let body = body_ast.fold().to_code(&Default::default());
        out.push(Function { name, args, body });
    }
    Ok(out)
}

fn parse_signature(lhs: &str) -> Result<(String, Vec<String>)> {
    let open = lhs
        .find('(')
        .ok_or_else(|| ModelError::malformed(lhs, "function declarations need arguments"))?;
    if !lhs.ends_with(')') {
        return Err(ModelError::malformed(lhs, "unbalanced delimiters in signature").into());
    }
    let name = lhs[..open].trim().to_string();
    if name.is_empty() {
        return Err(ModelError::malformed(lhs, "missing function name").into());
    }
    let inner = &lhs[open + 1..lhs.len() - 1];
    let mut args = Vec::new();
    for part in inner.split(',') {
        let arg = part.trim();
        if arg.is_empty() {
            continue;
        }
        args.push(arg.to_string());
    }
    Ok((name, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_function() {
        let fns = parse_functions("sigmoid(x) = 1.0 / (1.0 + exp(-x))").unwrap();
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "sigmoid");
        assert_eq!(fns[0].args, vec!["x"]);
        assert!(fns[0].body.contains("exp(-x)"));
    }

    #[test]
    fn functions_may_call_earlier_ones() {
        let fns = parse_functions(
            "sigmoid(x) = 1.0 / (1.0 + exp(-x))\ngain(x, g) = g * sigmoid(x)",
        )
        .unwrap();
        assert_eq!(fns.len(), 2);
    }

    #[test]
    fn body_outside_arguments_fails() {
        let err = parse_functions("f(x) = x + tau").unwrap_err();
        assert!(matches!(err, AnalyzerError::UnresolvedSymbol { .. }));
    }
}
