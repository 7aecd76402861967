//! Expression AST with the symbolic operations the translator needs:
//! free-identifier collection, substitution, constant folding, numeric
//! evaluation, and rendering into the emitted dialect.

use std::collections::{BTreeMap, BTreeSet};

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
    /// Boolean negation
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `and`
    And,
    /// `or`
    Or,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div => 5,
            BinOp::Pow => 7,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Num(f64),
    /// Boolean literal
    Bool(bool),
    /// Identifier, possibly dotted (`pre.r`) or a placeholder (`__sum_exc__`)
    Ident(String),
    /// Unary application
    Unary(UnaryOp, Box<Expr>),
    /// Binary application
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Function call
    Call(String, Vec<Expr>),
    /// `if cond then a else b`
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Built-in scalar functions of the surface language
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "exp", "log", "sqrt", "sin", "cos", "tan", "fabs", "pow", "min", "max",
];

impl Expr {
    /// Shorthand identifier constructor
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    /// Shorthand numeric constructor
    pub fn num(v: f64) -> Self {
        Expr::Num(v)
    }

    /// Build a binary node
    pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Arithmetic negation
    pub fn neg(e: Expr) -> Self {
        Expr::Unary(UnaryOp::Neg, Box::new(e))
    }

    /// Collect every free identifier into `out`
    pub fn free_idents(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) | Expr::Bool(_) => {}
            Expr::Ident(name) => {
                out.insert(name.clone());
            }
            Expr::Unary(_, e) => e.free_idents(out),
            Expr::Binary(_, l, r) => {
                l.free_idents(out);
                r.free_idents(out);
            }
            Expr::Call(_, args) => {
                for a in args {
                    a.free_idents(out);
                }
            }
            Expr::Ite(c, t, e) => {
                c.free_idents(out);
                t.free_idents(out);
                e.free_idents(out);
            }
        }
    }

    /// Collect every called function name into `out`
    pub fn called_functions(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Call(name, args) => {
                out.insert(name.clone());
                for a in args {
                    a.called_functions(out);
                }
            }
            Expr::Unary(_, e) => e.called_functions(out),
            Expr::Binary(_, l, r) => {
                l.called_functions(out);
                r.called_functions(out);
            }
            Expr::Ite(c, t, e) => {
                c.called_functions(out);
                t.called_functions(out);
                e.called_functions(out);
            }
            _ => {}
        }
    }

    /// True if the expression does not reference `name`
    pub fn is_free_of(&self, name: &str) -> bool {
        let mut idents = BTreeSet::new();
        self.free_idents(&mut idents);
        !idents.contains(name)
    }

    /// Replace every occurrence of identifier `name` with `with`
    pub fn substitute(&self, name: &str, with: &Expr) -> Expr {
        match self {
            Expr::Ident(n) if n == name => with.clone(),
            Expr::Num(_) | Expr::Bool(_) | Expr::Ident(_) => self.clone(),
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(e.substitute(name, with))),
            Expr::Binary(op, l, r) => Expr::bin(
                *op,
                l.substitute(name, with),
                r.substitute(name, with),
            ),
            Expr::Call(f, args) => Expr::Call(
                f.clone(),
                args.iter().map(|a| a.substitute(name, with)).collect(),
            ),
            Expr::Ite(c, t, e) => Expr::Ite(
                Box::new(c.substitute(name, with)),
                Box::new(t.substitute(name, with)),
                Box::new(e.substitute(name, with)),
            ),
        }
    }

    /// Constant-fold and apply identity simplifications. Keeps the result in
    /// a readable shape for emission; this is not a full simplifier.
    pub fn fold(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Bool(_) | Expr::Ident(_) => self.clone(),
            Expr::Unary(op, e) => {
                let e = e.fold();
                match (op, &e) {
                    (UnaryOp::Neg, Expr::Num(v)) => Expr::Num(-v),
                    (UnaryOp::Neg, Expr::Unary(UnaryOp::Neg, inner)) => (**inner).clone(),
                    (UnaryOp::Not, Expr::Bool(b)) => Expr::Bool(!b),
                    _ => Expr::Unary(*op, Box::new(e)),
                }
            }
            Expr::Binary(op, l, r) => fold_binary(*op, l.fold(), r.fold()),
            Expr::Call(f, args) => {
                Expr::Call(f.clone(), args.iter().map(|a| a.fold()).collect())
            }
            Expr::Ite(c, t, e) => {
                let c = c.fold();
                match c {
                    Expr::Bool(true) => t.fold(),
                    Expr::Bool(false) => e.fold(),
                    _ => Expr::Ite(Box::new(c), Box::new(t.fold()), Box::new(e.fold())),
                }
            }
        }
    }

    /// True if this is the literal zero
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(v) if *v == 0.0)
    }

    /// True if this is the literal one
    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Num(v) if *v == 1.0)
    }

    /// Numerically evaluate under an identifier environment. Returns `None`
    /// for unknown identifiers or non-numeric constructs.
    pub fn eval(&self, env: &BTreeMap<String, f64>) -> Option<f64> {
        match self {
            Expr::Num(v) => Some(*v),
            Expr::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Expr::Ident(name) => env.get(name).copied(),
            Expr::Unary(UnaryOp::Neg, e) => Some(-e.eval(env)?),
            Expr::Unary(UnaryOp::Not, e) => Some(if e.eval(env)? == 0.0 { 1.0 } else { 0.0 }),
            Expr::Binary(op, l, r) => {
                let a = l.eval(env)?;
                let b = r.eval(env)?;
                Some(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                    BinOp::Lt => bool_to_f64(a < b),
                    BinOp::Le => bool_to_f64(a <= b),
                    BinOp::Gt => bool_to_f64(a > b),
                    BinOp::Ge => bool_to_f64(a >= b),
                    BinOp::Eq => bool_to_f64(a == b),
                    BinOp::Ne => bool_to_f64(a != b),
                    BinOp::And => bool_to_f64(a != 0.0 && b != 0.0),
                    BinOp::Or => bool_to_f64(a != 0.0 || b != 0.0),
                })
            }
            Expr::Call(f, args) => {
                let vals: Option<Vec<f64>> = args.iter().map(|a| a.eval(env)).collect();
                let vals = vals?;
                match (f.as_str(), vals.as_slice()) {
                    ("exp", [x]) => Some(x.exp()),
                    ("log", [x]) => Some(x.ln()),
                    ("sqrt", [x]) => Some(x.sqrt()),
                    ("sin", [x]) => Some(x.sin()),
                    ("cos", [x]) => Some(x.cos()),
                    ("tan", [x]) => Some(x.tan()),
                    ("fabs", [x]) => Some(x.abs()),
                    ("pow", [x, y]) => Some(x.powf(*y)),
                    ("min", [x, y]) => Some(x.min(*y)),
                    ("max", [x, y]) => Some(x.max(*y)),
                    _ => None,
                }
            }
            Expr::Ite(c, t, e) => {
                if c.eval(env)? != 0.0 {
                    t.eval(env)
                } else {
                    e.eval(env)
                }
            }
        }
    }

    /// Render into the emitted dialect. Identifiers are looked up in `map`
    /// (attribute indexing); unmapped identifiers render verbatim.
    pub fn to_code(&self, map: &BTreeMap<String, String>) -> String {
        self.render(map, 0)
    }

    fn render(&self, map: &BTreeMap<String, String>, parent_prec: u8) -> String {
        match self {
            Expr::Num(v) => render_number(*v),
            Expr::Bool(b) => b.to_string(),
            Expr::Ident(name) => map.get(name).cloned().unwrap_or_else(|| name.clone()),
            Expr::Unary(op, e) => {
                let inner = e.render(map, 6);
                let text = match op {
                    UnaryOp::Neg => format!("-{}", inner),
                    UnaryOp::Not => format!("!{}", inner),
                };
                if parent_prec > 5 {
                    format!("({})", text)
                } else {
                    text
                }
            }
            Expr::Binary(BinOp::Pow, l, r) => {
                format!("pow({}, {})", l.render(map, 0), r.render(map, 0))
            }
            Expr::Binary(op, l, r) => {
                let prec = op.precedence();
                // Right operand of - and / needs one extra level
                let right_prec = match op {
                    BinOp::Sub | BinOp::Div => prec + 1,
                    _ => prec,
                };
                let text = format!(
                    "{} {} {}",
                    l.render(map, prec),
                    op.symbol(),
                    r.render(map, right_prec)
                );
                if prec < parent_prec {
                    format!("({})", text)
                } else {
                    text
                }
            }
            Expr::Call(f, args) => {
                let name = match f.as_str() {
                    "min" => "fmin",
                    "max" => "fmax",
                    other => other,
                };
                let rendered: Vec<String> = args.iter().map(|a| a.render(map, 0)).collect();
                format!("{}({})", name, rendered.join(", "))
            }
            Expr::Ite(c, t, e) => format!(
                "({} ? {} : {})",
                c.render(map, 0),
                t.render(map, 0),
                e.render(map, 0)
            ),
        }
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Render a double so that integral values keep a decimal point
fn render_number(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn fold_binary(op: BinOp, l: Expr, r: Expr) -> Expr {
    if let (Expr::Num(a), Expr::Num(b)) = (&l, &r) {
        let v = match op {
            BinOp::Add => Some(a + b),
            BinOp::Sub => Some(a - b),
            BinOp::Mul => Some(a * b),
            BinOp::Div if *b != 0.0 => Some(a / b),
            BinOp::Pow => Some(a.powf(*b)),
            _ => None,
        };
        if let Some(v) = v {
            return Expr::Num(v);
        }
    }
    match op {
        BinOp::Add => {
            if l.is_zero() {
                return r;
            }
            if r.is_zero() {
                return l;
            }
        }
        BinOp::Sub => {
            if r.is_zero() {
                return l;
            }
            if l.is_zero() {
                return Expr::neg(r).fold();
            }
        }
        BinOp::Mul => {
            if l.is_zero() || r.is_zero() {
                return Expr::Num(0.0);
            }
            if l.is_one() {
                return r;
            }
            if r.is_one() {
                return l;
            }
        }
        BinOp::Div => {
            if l.is_zero() {
                return Expr::Num(0.0);
            }
            if r.is_one() {
                return l;
            }
        }
        BinOp::Pow => {
            if r.is_one() {
                return l;
            }
            if r.is_zero() {
                return Expr::Num(1.0);
            }
        }
        _ => {}
    }
    Expr::bin(op, l, r)
}
