//! Per-variable translation: special-term substitution, ODE recognition,
//! discretization, bounds rendering, placeholder re-binding, and dependency
//! collection.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use ngen_model::{
    find_derivative, Attribute, CType, Description, DistributionKind, GlobalOp, GlobalOperation,
    Kind, Locality, Method, ModelError, ObjectKind, RandomDraw, ResetStatement,
};

use crate::error::{AnalyzerError, Result};
use crate::expr::{decompose_linear, parse_expression, BinOp, Expr, BUILTIN_FUNCTIONS};

/// Index tag bound by the emitter for local attributes
pub const LOCAL_INDEX: &str = "%(local_index)s";
/// Index tag bound by the emitter for global attributes
pub const GLOBAL_INDEX: &str = "%(global_index)s";
/// Index tag bound by the emitter for pre-synaptic ranks
pub const PRE_INDEX: &str = "%(pre_index)s";
/// Index tag bound by the emitter for post-synaptic ranks
pub const POST_INDEX: &str = "%(post_index)s";

/// Placeholder identifier standing in for `d<name>/dt` during rearrangement
const DERIV: &str = "__dxdt__";

/// Identifiers available in every equation without declaration
const BUILTIN_IDENTS: &[&str] = &["dt", "t"];

/// Result of translating one variable equation
#[derive(Debug, Clone)]
pub struct Translated {
    /// Equation text after special-term substitution
    pub transformed_eq: String,
    /// Placeholder to final-dialect snippet
    pub untouched: BTreeMap<String, String>,
    /// Emitted update snippet (update line plus clamps)
    pub cpp: String,
    /// Slope declaration line(s) for ODEs
    pub switch: Option<String>,
    /// Attributes, targets, draws and reduction placeholders read
    pub dependencies: BTreeSet<String>,
    /// Slope expression, kept for the coupled solver
    pub slope: Option<Expr>,
    /// Random draws introduced by this equation
    pub randoms: Vec<RandomDraw>,
    /// Reductions introduced by this equation
    pub global_ops: Vec<GlobalOperation>,
}

/// Translator for one description. Collects random-draw and conditional
/// counters across all equations of the description.
pub struct Translator {
    object: ObjectKind,
    attributes: BTreeMap<String, (Locality, CType, Kind)>,
    functions: BTreeSet<String>,
    dialect: BTreeMap<String, String>,
    rand_counter: usize,
    cond_counter: usize,
}

impl Translator {
    /// Build a translator from the attribute lists of a description under
    /// construction. Targets and functions must already be final.
    pub fn new(desc: &Description) -> Self {
        let mut attributes = BTreeMap::new();
        let mut dialect = BTreeMap::new();
        for attr in desc.parameters.iter().chain(desc.variables.iter()) {
            attributes.insert(attr.name.clone(), (attr.locality, attr.ctype, attr.kind));
            dialect.insert(attr.name.clone(), render_attribute(&attr.name, attr.locality));
        }
        let functions = desc.functions.iter().map(|f| f.name.clone()).collect();
        if desc.object == ObjectKind::Synapse {
            // `g_target` addresses the post-synaptic conductance of whatever
            // channel the projection feeds; the tag is bound at emission.
            dialect.insert(
                "g_target".to_string(),
                format!("_g_%(target)s[{}]", POST_INDEX),
            );
        }
        Self {
            object: desc.object,
            attributes,
            functions,
            dialect,
            rand_counter: 0,
            cond_counter: 0,
        }
    }

    /// Register a synthesized attribute added after construction
    pub fn add_attribute(&mut self, name: &str, locality: Locality, ctype: CType, kind: Kind) {
        self.attributes
            .insert(name.to_string(), (locality, ctype, kind));
        self.dialect
            .insert(name.to_string(), render_attribute(name, locality));
    }

    /// Translate one variable equation through the full pipeline
    pub fn translate_variable(&mut self, var: &Attribute) -> Result<Translated> {
        let (lhs, rhs) = split_equation(&var.eq)?;

        // 1. Special-term substitution
        let mut untouched = BTreeMap::new();
        let mut dependencies = BTreeSet::new();
        let mut randoms = Vec::new();
        let mut global_ops = Vec::new();
        let rhs_sub = self.substitute_special_terms(
            &rhs,
            var.locality,
            &mut untouched,
            &mut dependencies,
            &mut randoms,
            &mut global_ops,
        )?;
        let transformed_eq = format!("{} = {}", lhs, rhs_sub);

        // Parse and validate the right-hand side
        let rhs_ast = parse_expression(&rhs_sub)?;
        self.validate(&rhs_ast, &var.eq)?;
        self.collect_dependencies(&rhs_ast, &mut dependencies);

        // Hoist conditionals so the symbolic steps see them as opaque
        let rhs_ast = self.hoist_conditionals(rhs_ast, &mut untouched);

        // 2. ODE recognition
        let translated = match find_derivative(&lhs) {
            Some(deriv_name) => {
                if deriv_name != var.name {
                    return Err(ModelError::malformed(
                        &var.eq,
                        format!("derivative of '{}' in equation for '{}'", deriv_name, var.name),
                    )
                    .into());
                }
                let slope = self.recognize_ode(&lhs, &deriv_name, &rhs_ast, &var.eq)?;
                // 3. Discretization
                self.discretize(var, slope)?
            }
            None => {
                if lhs != var.name {
                    return Err(ModelError::malformed(
                        &var.eq,
                        "left-hand side must be the variable or its derivative",
                    )
                    .into());
                }
                let code = format!(
                    "{} = {};",
                    self.indexed(&var.name),
                    self.render(&rhs_ast)
                );
                (code, None, None)
            }
        };
        let (mut cpp, switch, slope) = translated;

        // 4. Bounds rendered as clamps after the update
        for clamp in self.render_bounds(var, &mut dependencies)? {
            cpp.push('\n');
            cpp.push_str(&clamp);
        }

        // 5. Placeholder re-binding
        cpp = rebind_placeholders(cpp, &untouched);
        let switch = switch.map(|s| rebind_placeholders(s, &untouched));

        debug!(variable = %var.name, "translated equation");

        Ok(Translated {
            transformed_eq,
            untouched,
            cpp,
            switch,
            dependencies,
            slope,
            randoms,
            global_ops,
        })
    }

    /// Translate a reset-style assignment (`v = v_reset`, `u += d`). Used for
    /// spike resets and synaptic event statements.
    pub fn translate_assignment(
        &mut self,
        lhs: &str,
        op: &str,
        rhs: &str,
        constraint: &str,
        eq: &str,
    ) -> Result<ResetStatement> {
        let name = lhs.trim().to_string();
        if !self.attributes.contains_key(&name) && !self.dialect.contains_key(&name) {
            return Err(AnalyzerError::unresolved(&name, eq));
        }
        let ast = parse_expression(rhs)?;
        self.validate(&ast, eq)?;
        let mut dependencies = BTreeSet::new();
        self.collect_dependencies(&ast, &mut dependencies);
        let cpp = format!("{} {} {};", self.indexed(&name), op, self.render(&ast));
        Ok(ResetStatement {
            name,
            eq: eq.to_string(),
            cpp,
            constraint: constraint.to_string(),
            dependencies,
        })
    }

    /// Translate a boolean condition (spike condition, pruning/creating)
    pub fn translate_condition(&mut self, text: &str) -> Result<(String, BTreeSet<String>)> {
        let ast = parse_expression(text)?;
        self.validate(&ast, text)?;
        let mut deps = BTreeSet::new();
        self.collect_dependencies(&ast, &mut deps);
        Ok((self.render(&ast), deps))
    }

    /// Translate a value expression in return mode (psp, refractory value)
    pub fn translate_return(&mut self, text: &str) -> Result<(String, BTreeSet<String>)> {
        self.translate_condition(text)
    }

    // ---------------------------------------------------------------- steps

    #[allow(clippy::too_many_arguments)]
    fn substitute_special_terms(
        &mut self,
        rhs: &str,
        locality: Locality,
        untouched: &mut BTreeMap<String, String>,
        dependencies: &mut BTreeSet<String>,
        randoms: &mut Vec<RandomDraw>,
        global_ops: &mut Vec<GlobalOperation>,
    ) -> Result<String> {
        // sum(target)
        let mut text = replace_calls(rhs, "sum", |inner| {
            let target = inner.trim();
            if !is_identifier(target) {
                return None;
            }
            let placeholder = format!("__sum_{}__", target);
            untouched.insert(
                placeholder.clone(),
                format!("_sum_{}{}", target, LOCAL_INDEX),
            );
            dependencies.insert(target.to_string());
            Some(placeholder)
        });

        // Global reductions over a local variable
        for op in [
            GlobalOp::Min,
            GlobalOp::Max,
            GlobalOp::Mean,
            GlobalOp::Norm1,
            GlobalOp::Norm2,
        ] {
            text = replace_calls(&text, op.name(), |inner| {
                let name = inner.trim();
                if !is_identifier(name) || !self.attributes.contains_key(name) {
                    return None;
                }
                let placeholder = format!("__{}_{}__", op.name(), name);
                untouched.insert(placeholder.clone(), format!("_{}_{}", op.name(), name));
                dependencies.insert(placeholder.clone());
                global_ops.push(GlobalOperation {
                    op,
                    var: name.to_string(),
                });
                Some(placeholder)
            });
        }

        // Random draws become per-step prefetched buffers
        for dist in [
            DistributionKind::Uniform,
            DistributionKind::Normal,
            DistributionKind::LogNormal,
            DistributionKind::Gamma,
            DistributionKind::Exponential,
            DistributionKind::Bernoulli,
            DistributionKind::Binomial,
        ] {
            loop {
                let mut replaced = false;
                let mut failure: Option<AnalyzerError> = None;
                text = replace_calls(&text, dist.name(), |inner| {
                    if replaced || failure.is_some() {
                        return None;
                    }
                    let mut args = Vec::new();
                    for part in inner.split(',') {
                        match part.trim().parse::<f64>() {
                            Ok(v) => args.push(v),
                            Err(_) => {
                                failure = Some(
                                    ModelError::invalid_literal(
                                        dist.name(),
                                        part.trim(),
                                        "random draws take literal arguments",
                                    )
                                    .into(),
                                );
                                return None;
                            }
                        }
                    }
                    if args.len() != dist.arity() {
                        failure = Some(
                            ModelError::invalid_literal(
                                dist.name(),
                                inner,
                                format!("{} takes {} argument(s)", dist.name(), dist.arity()),
                            )
                            .into(),
                        );
                        return None;
                    }
                    let name = format!("rand_{}", self.rand_counter);
                    self.rand_counter += 1;
                    let placeholder = format!("__{}__", name);
                    let index = match locality {
                        Locality::Local => LOCAL_INDEX,
                        Locality::Global => GLOBAL_INDEX,
                    };
                    untouched.insert(placeholder.clone(), format!("{}{}", name, index));
                    dependencies.insert(name.clone());
                    randoms.push(RandomDraw {
                        name,
                        dist,
                        args,
                        locality,
                    });
                    replaced = true;
                    Some(placeholder)
                });
                if let Some(err) = failure {
                    return Err(err);
                }
                if !replaced {
                    break;
                }
            }
        }

        Ok(text)
    }

    fn recognize_ode(
        &mut self,
        lhs: &str,
        name: &str,
        rhs_ast: &Expr,
        eq: &str,
    ) -> Result<Expr> {
        // Rewrite `d<name>/dt` as an opaque identifier and rearrange:
        //   a*DERIV + rest = rhs   =>   DERIV = (rhs - rest)/a
        let deriv_text = rewrite_derivative(lhs, name);
        let lhs_ast = parse_expression(&deriv_text)?;
        self.validate(&lhs_ast, eq)?;
        let (a, rest) = decompose_linear(&lhs_ast, DERIV).ok_or_else(|| {
            AnalyzerError::from(ModelError::malformed(
                eq,
                "left-hand side is not linear in the derivative",
            ))
        })?;
        if a.is_zero() {
            return Err(ModelError::malformed(eq, "no derivative term on the left").into());
        }
        let slope = Expr::bin(
            BinOp::Div,
            Expr::bin(BinOp::Sub, rhs_ast.clone(), rest),
            a,
        )
        .fold();
        Ok(slope)
    }

    fn discretize(
        &mut self,
        var: &Attribute,
        slope: Expr,
    ) -> Result<(String, Option<String>, Option<Expr>)> {
        let name = &var.name;
        let ctype = var.ctype.name();
        let idx = self.indexed(name);
        let dt = Expr::ident("dt");

        match var.method {
            Method::Explicit => {
                let switch = format!("{} _{} = {};", ctype, name, self.render(&slope));
                let cpp = format!("{} += dt*_{};", idx, name);
                Ok((cpp, Some(switch), Some(slope)))
            }
            Method::Implicit => {
                let (c1, c0) = decompose_linear(&slope, name)
                    .ok_or_else(|| AnalyzerError::NonLinearImplicit {
                        variable: name.clone(),
                    })?;
                // x_{n+1} = (x_n + dt*c0) / (1 - dt*c1)
                let update = Expr::bin(
                    BinOp::Div,
                    Expr::bin(
                        BinOp::Add,
                        Expr::ident(name.clone()),
                        Expr::bin(BinOp::Mul, dt.clone(), c0),
                    ),
                    Expr::bin(
                        BinOp::Sub,
                        Expr::num(1.0),
                        Expr::bin(BinOp::Mul, dt, c1),
                    ),
                )
                .fold();
                let switch = format!("{} _{} = {};", ctype, name, self.render(&update));
                let cpp = format!("{} = _{};", idx, name);
                Ok((cpp, Some(switch), Some(slope)))
            }
            Method::Midpoint => {
                let k = format!("_k_{}", name);
                let mid = Expr::bin(
                    BinOp::Add,
                    Expr::ident(name.clone()),
                    Expr::bin(
                        BinOp::Mul,
                        Expr::bin(BinOp::Mul, Expr::num(0.5), dt),
                        Expr::ident(k.clone()),
                    ),
                );
                let slope_mid = slope.substitute(name, &mid);
                let switch = format!(
                    "{} {} = {};\n{} _{} = {};",
                    ctype,
                    k,
                    self.render(&slope),
                    ctype,
                    name,
                    self.render(&slope_mid)
                );
                let cpp = format!("{} += dt*_{};", idx, name);
                Ok((cpp, Some(switch), Some(slope)))
            }
            Method::Exponential | Method::Exact => {
                let (c1, c0) = decompose_linear(&slope, name).ok_or_else(|| {
                    AnalyzerError::unsupported_method(
                        var.method.name(),
                        name,
                        "equation is not linear in the variable",
                    )
                })?;
                if c1.is_zero() {
                    return Err(AnalyzerError::unsupported_method(
                        var.method.name(),
                        name,
                        "equation has no leak term",
                    ));
                }
                if var.method == Method::Exact && !self.coefficients_constant(&c1, &c0) {
                    return Err(AnalyzerError::unsupported_method(
                        "exact",
                        name,
                        "closed form requires coefficients constant over the step",
                    ));
                }
                // steady state A = -c0/c1; update x += (1 - exp(dt*c1))*(A - x)
                let steady = Expr::bin(BinOp::Div, Expr::neg(c0), c1.clone()).fold();
                let gain = Expr::bin(
                    BinOp::Sub,
                    Expr::num(1.0),
                    Expr::Call(
                        "exp".to_string(),
                        vec![Expr::bin(BinOp::Mul, dt, c1)],
                    ),
                );
                let delta = Expr::bin(
                    BinOp::Mul,
                    gain,
                    Expr::bin(BinOp::Sub, steady, Expr::ident(name.clone())),
                )
                .fold();
                let switch = format!("{} _{} = {};", ctype, name, self.render(&delta));
                let cpp = format!("{} += _{};", idx, name);
                Ok((cpp, Some(switch), Some(slope)))
            }
        }
    }

    /// Render the min/max bounds of a variable as post-update clamps
    pub fn render_bounds(
        &mut self,
        var: &Attribute,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let mut clamps = Vec::new();
        let idx = self.indexed(&var.name);
        if let Some(text) = &var.bounds.min {
            let ast = parse_expression(text)?;
            self.validate(&ast, text)?;
            self.collect_dependencies(&ast, dependencies);
            let bound = self.render(&ast);
            clamps.push(format!("if({} < {}) {} = {};", idx, bound, idx, bound));
        }
        if let Some(text) = &var.bounds.max {
            let ast = parse_expression(text)?;
            self.validate(&ast, text)?;
            self.collect_dependencies(&ast, dependencies);
            let bound = self.render(&ast);
            clamps.push(format!("if({} > {}) {} = {};", idx, bound, idx, bound));
        }
        Ok(clamps)
    }

    // -------------------------------------------------------------- helpers

    /// Indexed rendering of an attribute occurrence
    pub fn indexed(&self, name: &str) -> String {
        self.dialect
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Render an expression with attribute indexing applied
    pub fn render(&self, expr: &Expr) -> String {
        let mut map = self.dialect.clone();
        let mut idents = BTreeSet::new();
        expr.free_idents(&mut idents);
        for ident in idents {
            if let Some(field) = ident.strip_prefix("pre.") {
                map.insert(ident.clone(), format!("_pre_{}[{}]", field, PRE_INDEX));
            } else if let Some(field) = ident.strip_prefix("post.") {
                map.insert(ident.clone(), format!("_post_{}[{}]", field, POST_INDEX));
            }
        }
        expr.fold().to_code(&map)
    }

    fn validate(&self, expr: &Expr, context: &str) -> Result<()> {
        let mut idents = BTreeSet::new();
        expr.free_idents(&mut idents);
        for ident in &idents {
            if self.attributes.contains_key(ident)
                || self.dialect.contains_key(ident)
                || BUILTIN_IDENTS.contains(&ident.as_str())
                || is_placeholder(ident)
                || ident.starts_with('_')
            {
                continue;
            }
            if self.object == ObjectKind::Synapse
                && (ident.starts_with("pre.") || ident.starts_with("post."))
            {
                continue;
            }
            return Err(AnalyzerError::unresolved(ident, context));
        }
        let mut calls = BTreeSet::new();
        expr.called_functions(&mut calls);
        for call in &calls {
            if BUILTIN_FUNCTIONS.contains(&call.as_str()) || self.functions.contains(call) {
                continue;
            }
            return Err(AnalyzerError::unresolved(format!("{}()", call), context));
        }
        Ok(())
    }

    fn collect_dependencies(&self, expr: &Expr, out: &mut BTreeSet<String>) {
        let mut idents = BTreeSet::new();
        expr.free_idents(&mut idents);
        for ident in idents {
            if self.attributes.contains_key(&ident)
                || ident.starts_with("pre.")
                || ident.starts_with("post.")
            {
                out.insert(ident);
            }
        }
    }

    fn hoist_conditionals(
        &mut self,
        expr: Expr,
        untouched: &mut BTreeMap<String, String>,
    ) -> Expr {
        match expr {
            Expr::Ite(c, t, e) => {
                let placeholder = format!("__cond_{}__", self.cond_counter);
                self.cond_counter += 1;
                let c = self.hoist_conditionals(*c, untouched);
                let t = self.hoist_conditionals(*t, untouched);
                let e = self.hoist_conditionals(*e, untouched);
                let rendered = format!(
                    "({} ? {} : {})",
                    self.render(&c),
                    self.render(&t),
                    self.render(&e)
                );
                untouched.insert(placeholder.clone(), rendered);
                Expr::Ident(placeholder)
            }
            Expr::Unary(op, e) => {
                Expr::Unary(op, Box::new(self.hoist_conditionals(*e, untouched)))
            }
            Expr::Binary(op, l, r) => Expr::bin(
                op,
                self.hoist_conditionals(*l, untouched),
                self.hoist_conditionals(*r, untouched),
            ),
            Expr::Call(f, args) => Expr::Call(
                f,
                args.into_iter()
                    .map(|a| self.hoist_conditionals(a, untouched))
                    .collect(),
            ),
            other => other,
        }
    }

    fn coefficients_constant(&self, c1: &Expr, c0: &Expr) -> bool {
        let mut idents = BTreeSet::new();
        c1.free_idents(&mut idents);
        c0.free_idents(&mut idents);
        idents.iter().all(|ident| {
            match self.attributes.get(ident) {
                Some((_, _, kind)) => *kind == Kind::Parameter,
                None => is_placeholder(ident) || BUILTIN_IDENTS.contains(&ident.as_str()),
            }
        })
    }
}

/// Render an attribute occurrence with its locality index tag
fn render_attribute(name: &str, locality: Locality) -> String {
    match locality {
        Locality::Local => format!("{}{}", name, LOCAL_INDEX),
        Locality::Global => format!("{}{}", name, GLOBAL_INDEX),
    }
}

/// Split an `lhs = rhs` equation on its top-level assignment
pub fn split_equation(eq: &str) -> Result<(String, String)> {
    let bytes = eq.as_bytes();
    let mut depth = 0usize;
    for (i, c) in eq.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                let prev = if i > 0 { bytes[i - 1] } else { 0 };
                let next = bytes.get(i + 1).copied().unwrap_or(0);
                if matches!(prev, b'<' | b'>' | b'=' | b'!') || next == b'=' {
                    continue;
                }
                return Ok((eq[..i].trim().to_string(), eq[i + 1..].trim().to_string()));
            }
            _ => {}
        }
    }
    Err(ModelError::malformed(eq, "missing '=' in equation").into())
}

/// Replace `d<name>/dt` with the opaque derivative identifier
fn rewrite_derivative(lhs: &str, name: &str) -> String {
    let needle = format!("d{}", name);
    let mut out = String::with_capacity(lhs.len());
    let mut rest = lhs;
    while let Some(pos) = rest.find(&needle) {
        let prev = rest[..pos]
            .chars()
            .next_back()
            .or_else(|| out.chars().next_back());
        let before_ok = prev.map(|c| !(c.is_alphanumeric() || c == '_')).unwrap_or(true);
        let after = &rest[pos + needle.len()..];
        let after_trim = after.trim_start();
        if before_ok && after_trim.starts_with('/') {
            let after_slash = after_trim[1..].trim_start();
            if after_slash.starts_with("dt")
                && !after_slash[2..].starts_with(|c: char| c.is_alphanumeric() || c == '_')
            {
                out.push_str(&rest[..pos]);
                out.push_str(DERIV);
                let consumed = after.len() - after_slash.len() + 2;
                rest = &after[consumed..];
                continue;
            }
        }
        out.push_str(&rest[..pos + needle.len()]);
        rest = &rest[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}

/// True for generated placeholder identifiers (`__sum_exc__`, `__rand_0__`)
pub fn is_placeholder(ident: &str) -> bool {
    ident.starts_with("__") && ident.ends_with("__")
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Replace calls `fname(inner)` using a callback; `None` leaves the call.
fn replace_calls<F>(text: &str, fname: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(fname) {
        let before = &rest[..pos];
        let boundary_ok = before
            .chars()
            .next_back()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true);
        let after = &rest[pos + fname.len()..];
        let after_trim = after.trim_start();
        if boundary_ok && after_trim.starts_with('(') {
            if let Some(close) = matching_paren(after_trim) {
                let inner = &after_trim[1..close];
                if let Some(replacement) = replace(inner) {
                    out.push_str(before);
                    out.push_str(&replacement);
                    let consumed = (after.len() - after_trim.len()) + close + 1;
                    rest = &after[consumed..];
                    continue;
                }
            }
        }
        out.push_str(&rest[..pos + fname.len()]);
        rest = &rest[pos + fname.len()..];
    }
    out.push_str(rest);
    out
}

/// Index of the parenthesis closing the one at position 0
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Collect the targets referenced by `sum(t)` terms in an equation
pub fn find_sums(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let _ = replace_calls(text, "sum", |inner| {
        let t = inner.trim();
        if is_identifier(t) && !found.iter().any(|f| f == t) {
            found.push(t.to_string());
        }
        None
    });
    found
}

/// Replace placeholders with their final-dialect form. Conditional snippets
/// may themselves contain placeholders, so run to a fixed point.
pub fn rebind_placeholders(mut text: String, untouched: &BTreeMap<String, String>) -> String {
    for _ in 0..8 {
        let mut changed = false;
        for (placeholder, replacement) in untouched {
            if text.contains(placeholder.as_str()) {
                text = text.replace(placeholder.as_str(), replacement);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngen_model::{
        classify_parameters, classify_variables, extract_declarations, DeclMode, Description,
        ModelType,
    };

    fn rate_desc(params: &str, eqs: &str) -> Description {
        let mut desc = Description::new("m", ObjectKind::Neuron, ModelType::Rate);
        let extra = BTreeMap::new();
        let pdecl = extract_declarations(params, DeclMode::Parameters).unwrap();
        desc.parameters = classify_parameters(&pdecl, &extra, ObjectKind::Neuron).unwrap();
        let vdecl = extract_declarations(eqs, DeclMode::Equations).unwrap();
        desc.variables = classify_variables(&vdecl, &extra, ObjectKind::Neuron).unwrap();
        desc.rebuild_partitions();
        desc
    }

    #[test]
    fn explicit_leak_ode() {
        let desc = rate_desc(
            "tau = 10.0 : population\nbaseline = 0.0",
            "tau * dr/dt + r = baseline : min=0.0",
        );
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        let switch = out.switch.unwrap();
        assert!(switch.contains("double _r ="));
        assert!(switch.contains("baseline%(local_index)s"));
        assert!(switch.contains("r%(local_index)s"));
        assert!(switch.contains("tau%(global_index)s"));
        assert!(out.cpp.starts_with("r%(local_index)s += dt*_r;"));
        assert!(out.cpp.contains("if(r%(local_index)s < 0.0) r%(local_index)s = 0.0;"));
        assert!(out.dependencies.contains("baseline"));
        assert!(!out.dependencies.contains("tau"));
    }

    #[test]
    fn sum_target_becomes_placeholder() {
        let desc = rate_desc("tau = 10.0", "tau * dr/dt + r = sum(exc)");
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        assert_eq!(
            out.untouched.get("__sum_exc__").map(String::as_str),
            Some("_sum_exc%(local_index)s")
        );
        assert!(out.transformed_eq.contains("__sum_exc__"));
        assert!(!out.switch.as_deref().unwrap_or("").contains("sum("));
        assert!(out.switch.unwrap().contains("_sum_exc%(local_index)s"));
        assert!(out.dependencies.contains("exc"));
    }

    #[test]
    fn direct_assignment() {
        let desc = rate_desc("baseline = 1.0", "r = baseline + 0.5");
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        assert_eq!(out.cpp, "r%(local_index)s = baseline%(local_index)s + 0.5;");
        assert!(out.switch.is_none());
    }

    #[test]
    fn implicit_linear_update() {
        let desc = rate_desc("tau = 10.0", "tau * dv/dt + v = 2.0 : implicit");
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        let switch = out.switch.unwrap();
        assert!(switch.contains("double _v ="));
        assert!(switch.contains("/"));
        assert_eq!(out.cpp, "v%(local_index)s = _v;");
    }

    #[test]
    fn implicit_nonlinear_fails() {
        let desc = rate_desc("tau = 10.0", "dv/dt = v * v : implicit");
        let mut tr = Translator::new(&desc);
        let err = tr.translate_variable(&desc.variables[0]).unwrap_err();
        assert!(matches!(err, AnalyzerError::NonLinearImplicit { .. }));
    }

    #[test]
    fn exponential_update_has_exp_term() {
        let desc = rate_desc(
            "tau = 10.0\nbaseline = 0.5",
            "tau * dr/dt + r = baseline : exponential",
        );
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        let switch = out.switch.unwrap();
        assert!(switch.contains("exp("));
        assert_eq!(out.cpp, "r%(local_index)s += _r;");
    }

    #[test]
    fn exact_rejects_variable_coefficients() {
        let desc = rate_desc(
            "tau = 10.0",
            "du/dt = (r - u)/tau : exact\ntau * dr/dt + r = 1.0",
        );
        let mut tr = Translator::new(&desc);
        let err = tr.translate_variable(&desc.variables[0]).unwrap_err();
        assert!(matches!(err, AnalyzerError::UnsupportedMethod { .. }));
    }

    #[test]
    fn unresolved_symbol_is_reported() {
        let desc = rate_desc("tau = 10.0", "tau * dr/dt + r = baselin");
        let mut tr = Translator::new(&desc);
        let err = tr.translate_variable(&desc.variables[0]).unwrap_err();
        assert!(matches!(err, AnalyzerError::UnresolvedSymbol { .. }));
    }

    #[test]
    fn random_draw_becomes_prefetched_buffer() {
        let desc = rate_desc("tau = 10.0", "r = Uniform(0.0, 1.0) * tau");
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        assert_eq!(out.randoms.len(), 1);
        assert_eq!(out.randoms[0].name, "rand_0");
        assert!(out.cpp.contains("rand_0%(local_index)s"));
        assert!(out.dependencies.contains("rand_0"));
    }

    #[test]
    fn global_reduction_becomes_placeholder() {
        let desc = rate_desc("tau = 10.0", "r = mean(r) / tau");
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        assert_eq!(out.global_ops.len(), 1);
        assert_eq!(out.global_ops[0].var, "r");
        assert!(out.cpp.contains("_mean_r"));
        assert!(out.dependencies.contains("__mean_r__"));
    }

    #[test]
    fn conditional_renders_as_ternary() {
        let desc = rate_desc(
            "tau = 10.0\nbaseline = 0.0",
            "r = if baseline > 0.5 then baseline else 0.0",
        );
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        assert!(out.cpp.contains('?'));
        assert!(out.cpp.contains("baseline%(local_index)s"));
    }

    #[test]
    fn midpoint_emits_two_stage_switch() {
        let desc = rate_desc("tau = 10.0", "tau * dv/dt + v = 1.0 : midpoint");
        let mut tr = Translator::new(&desc);
        let out = tr.translate_variable(&desc.variables[0]).unwrap();
        let switch = out.switch.unwrap();
        assert!(switch.contains("_k_v"));
        assert!(switch.lines().count() == 2);
        assert_eq!(out.cpp, "v%(local_index)s += dt*_v;");
    }
}
