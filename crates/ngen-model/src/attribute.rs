//! Typed attributes of a neuron or synapse description

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::error::{ModelError, Result};

/// Whether an attribute is constant across a step or updated by it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Constant across the step
    Parameter,
    /// Updated by the step
    Variable,
}

/// One value per unit, or one value shared by the whole group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// One value per neuron (populations) or per synapse (projections)
    Local,
    /// One value per population (neurons) or per dendrite (synapses)
    Global,
}

/// Scalar type of an attribute in the emitted dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    /// Double-precision float (the default)
    Double,
    /// Signed integer
    Int,
    /// Boolean
    Bool,
}

impl CType {
    /// Type name in the emitted dialect
    pub fn name(self) -> &'static str {
        match self {
            CType::Double => "double",
            CType::Int => "int",
            CType::Bool => "bool",
        }
    }

    /// Zero value of this type, as emitted text
    pub fn zero(self) -> &'static str {
        match self {
            CType::Double => "0.0",
            CType::Int => "0",
            CType::Bool => "false",
        }
    }
}

impl Display for CType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Supported random distributions for initial values and per-step draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DistributionKind {
    /// Uniform(min, max)
    Uniform,
    /// Normal(mu, sigma)
    Normal,
    /// LogNormal(mu, sigma)
    LogNormal,
    /// Gamma(shape, scale)
    Gamma,
    /// Exponential(lambda)
    Exponential,
    /// Bernoulli(p)
    Bernoulli,
    /// Binomial(n, p)
    Binomial,
}

impl DistributionKind {
    /// Resolve a distribution from its declaration-surface name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Uniform" => Some(Self::Uniform),
            "Normal" => Some(Self::Normal),
            "LogNormal" => Some(Self::LogNormal),
            "Gamma" => Some(Self::Gamma),
            "Exponential" => Some(Self::Exponential),
            "Bernoulli" => Some(Self::Bernoulli),
            "Binomial" => Some(Self::Binomial),
        _ => None,
        }
    }

    /// Declaration-surface name
    pub fn name(self) -> &'static str {
        match self {
            Self::Uniform => "Uniform",
            Self::Normal => "Normal",
            Self::LogNormal => "LogNormal",
            Self::Gamma => "Gamma",
            Self::Exponential => "Exponential",
            Self::Bernoulli => "Bernoulli",
            Self::Binomial => "Binomial",
        }
    }

    /// Number of literal arguments the distribution takes
    pub fn arity(self) -> usize {
        match self {
            Self::Exponential | Self::Bernoulli => 1,
            _ => 2,
        }
    }
}

/// A reference to a random distribution with literal arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RandomRef {
    /// Distribution kind
    pub dist: DistributionKind,
    /// Literal arguments, in declaration order
    pub args: Vec<f64>,
}

impl Display for RandomRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}({})", self.dist.name(), args.join(", "))
    }
}

/// Initial value of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// Double literal
    Double(f64),
    /// Integer literal
    Int(i64),
    /// Boolean literal
    Bool(bool),
    /// Drawn once per unit at construction time
    Distribution(RandomRef),
}

impl Init {
    /// Default init for a ctype
    pub fn zero(ctype: CType) -> Self {
        match ctype {
            CType::Double => Init::Double(0.0),
            CType::Int => Init::Int(0),
            CType::Bool => Init::Bool(false),
        }
    }

    /// Emitted-dialect rendering of a literal init; distributions render as
    /// their draw expression and are handled separately by the emitter.
    pub fn to_code(&self) -> String {
        match self {
            Init::Double(v) => format_double(*v),
            Init::Int(v) => v.to_string(),
            Init::Bool(v) => v.to_string(),
            Init::Distribution(r) => r.to_string(),
        }
    }
}

/// Render a double so that integral values keep a decimal point
pub fn format_double(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Partial min/max/init bounds given as flags; stored as raw text and
/// re-parsed by the expression analyzer in return mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bounds {
    /// Lower clamp, applied after the update
    pub min: Option<String>,
    /// Upper clamp, applied after the update
    pub max: Option<String>,
    /// Raw init override text
    pub init: Option<String>,
}

impl Bounds {
    /// True if no bound is set
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.init.is_none()
    }
}

/// Translated form of one variable equation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Equation {
    /// Transformed equation text, special terms replaced by placeholders
    pub transformed_eq: String,
    /// Placeholder name to final dialect snippet
    pub untouched: BTreeMap<String, String>,
    /// Emitted update snippet
    pub cpp: String,
    /// Slope declaration for ODEs ("compute slope, then x += dt*slope")
    pub switch: Option<String>,
    /// Names of attributes, targets and draws the snippet reads
    pub dependencies: BTreeSet<String>,
}

/// A named scalar of a description
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Unique name within the description
    pub name: String,
    /// Parameter or variable
    pub kind: Kind,
    /// Local or global
    pub locality: Locality,
    /// Scalar type
    pub ctype: CType,
    /// Initial value
    pub init: Init,
    /// Optional min/max/init bounds
    pub bounds: Bounds,
    /// Raw flag tokens as declared
    pub flags: Vec<String>,
    /// Original equation text; empty for parameters
    pub eq: String,
    /// Numerical method tag parsed from flags
    pub method: Method,
    /// Translation result, filled by the analyzer for variables
    pub equation: Option<Equation>,
}

impl Attribute {
    /// True if the attribute carries the given flag
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Numerical method used to discretize an ODE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    /// Forward Euler (the default)
    #[default]
    Explicit,
    /// Backward Euler, linear in the updated variable
    Implicit,
    /// Explicit midpoint
    Midpoint,
    /// Exponential integration of the leaky form
    Exponential,
    /// Closed-form update for registered ODE shapes
    Exact,
}

impl Method {
    /// Flag token naming this method
    pub fn name(self) -> &'static str {
        match self {
            Method::Explicit => "explicit",
            Method::Implicit => "implicit",
            Method::Midpoint => "midpoint",
            Method::Exponential => "exponential",
            Method::Exact => "exact",
        }
    }

    /// Resolve a method from its flag token
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "explicit" => Some(Method::Explicit),
            "implicit" => Some(Method::Implicit),
            "midpoint" => Some(Method::Midpoint),
            "exponential" => Some(Method::Exponential),
            "exact" => Some(Method::Exact),
            _ => None,
        }
    }
}

/// Parse a scalar literal of the declaration surface
pub fn parse_literal(text: &str) -> Option<Init> {
    let t = text.trim();
    match t {
        "true" | "True" => return Some(Init::Bool(true)),
        "false" | "False" => return Some(Init::Bool(false)),
        _ => {}
    }
    if let Ok(i) = t.parse::<i64>() {
        // Keep integral literals as ints; the classifier widens per ctype
        return Some(Init::Int(i));
    }
    if let Ok(f) = t.parse::<f64>() {
        return Some(Init::Double(f));
    }
    None
}

/// Parse a distribution reference such as `Uniform(0.0, 1.0)`.
/// Arguments may name entries of `extra` instead of literals.
pub fn parse_random_ref(
    text: &str,
    extra: &BTreeMap<String, f64>,
) -> Result<Option<RandomRef>> {
    let t = text.trim();
    let Some(open) = t.find('(') else {
        return Ok(None);
    };
    let name = t[..open].trim();
    let Some(dist) = DistributionKind::from_name(name) else {
        return Ok(None);
    };
    if !t.ends_with(')') {
        return Err(ModelError::malformed(t, "unbalanced delimiters in distribution"));
    }
    let inner = &t[open + 1..t.len() - 1];
    let mut args = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if let Ok(v) = part.parse::<f64>() {
            args.push(v);
        } else if let Some(v) = extra.get(part) {
            args.push(*v);
        } else {
            return Err(ModelError::invalid_literal(
                name,
                part,
                "distribution arguments must be literals",
            ));
        }
    }
    if args.len() != dist.arity() {
        return Err(ModelError::invalid_literal(
            name,
            inner,
            format!("{} takes {} argument(s)", dist.name(), dist.arity()),
        ));
    }
    Ok(Some(RandomRef { dist, args }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_parsing() {
        assert_eq!(parse_literal("10.0"), Some(Init::Double(10.0)));
        assert_eq!(parse_literal("-65"), Some(Init::Int(-65)));
        assert_eq!(parse_literal("True"), Some(Init::Bool(true)));
        assert_eq!(parse_literal("v_rest + 1"), None);
    }

    #[test]
    fn random_ref_parsing() {
        let extra = BTreeMap::new();
        let r = parse_random_ref("Uniform(0.0, 1.0)", &extra).unwrap().unwrap();
        assert_eq!(r.dist, DistributionKind::Uniform);
        assert_eq!(r.args, vec![0.0, 1.0]);

        assert!(parse_random_ref("v_rest + 1", &extra).unwrap().is_none());
        assert!(parse_random_ref("Uniform(0.0)", &extra).is_err());
    }

    #[test]
    fn random_ref_resolves_extra_values() {
        let mut extra = BTreeMap::new();
        extra.insert("w_max".to_string(), 2.5);
        let r = parse_random_ref("Uniform(0.0, w_max)", &extra).unwrap().unwrap();
        assert_eq!(r.args, vec![0.0, 2.5]);
    }

    #[test]
    fn double_formatting_keeps_decimal_point() {
        assert_eq!(format_double(0.0), "0.0");
        assert_eq!(format_double(-65.0), "-65.0");
        assert_eq!(format_double(0.25), "0.25");
    }
}
