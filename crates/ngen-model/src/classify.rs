//! Attribute classifier: kind, locality, ctype, init and bound hints

use std::collections::BTreeMap;

use tracing::trace;

use crate::attribute::{
    parse_literal, parse_random_ref, Attribute, Bounds, CType, Equation, Init, Kind, Locality,
    Method,
};
use crate::description::ObjectKind;
use crate::error::{ModelError, Result};
use crate::extract::{Declaration, FlagToken};

/// Method flags accepted on variables only
const METHOD_FLAGS: &[&str] = &["explicit", "implicit", "midpoint", "exponential", "exact"];

/// Classify parameter declarations into attributes.
///
/// `extra` holds caller-supplied literal values that flags may reference by
/// name instead of writing a literal.
pub fn classify_parameters(
    decls: &[Declaration],
    extra: &BTreeMap<String, f64>,
    object: ObjectKind,
) -> Result<Vec<Attribute>> {
    let mut out: Vec<Attribute> = Vec::new();
    for decl in decls {
        if decl.op != "=" {
            return Err(ModelError::malformed(
                format!("{} {} {}", decl.lhs, decl.op, decl.rhs),
                "parameters take a plain assignment",
            ));
        }
        let attr = classify_one(decl, extra, object, Kind::Parameter)?;
        if out.iter().any(|a| a.name == attr.name) {
            return Err(ModelError::DuplicateAttribute { name: attr.name });
        }
        trace!(name = %attr.name, "classified parameter");
        out.push(attr);
    }
    Ok(out)
}

/// Classify equation declarations into variable attributes. The equation text
/// itself is kept verbatim for the expression analyzer.
pub fn classify_variables(
    decls: &[Declaration],
    extra: &BTreeMap<String, f64>,
    object: ObjectKind,
) -> Result<Vec<Attribute>> {
    let mut out: Vec<Attribute> = Vec::new();
    for decl in decls {
        if decl.op != "=" {
            return Err(ModelError::malformed(
                format!("{} {} {}", decl.lhs, decl.op, decl.rhs),
                "compound assignment is only allowed in reset-style blocks",
            ));
        }
        let mut attr = classify_one(decl, extra, object, Kind::Variable)?;
        attr.name = variable_name(&decl.lhs);
        attr.eq = format!("{} = {}", decl.lhs, decl.rhs);
        attr.equation = Some(Equation::default());
        if out.iter().any(|a| a.name == attr.name) {
            return Err(ModelError::DuplicateAttribute { name: attr.name });
        }
        trace!(name = %attr.name, "classified variable");
        out.push(attr);
    }
    Ok(out)
}

/// Strip a `d<name>/dt` left-hand side down to the variable name.
/// For composite forms like `tau * dr/dt + r` the derivative term wins.
pub fn variable_name(lhs: &str) -> String {
    if let Some(name) = find_derivative(lhs) {
        return name;
    }
    lhs.trim().to_string()
}

/// Scan for a `d<name>/dt` term and return `<name>`
pub fn find_derivative(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'd'
            && (i == 0 || !is_ident_char(bytes[i - 1]))
        {
            let mut j = i + 1;
            while j < bytes.len() && is_ident_char(bytes[j]) {
                j += 1;
            }
            if j > i + 1 {
                let rest = text[j..].trim_start();
                if let Some(stripped) = rest.strip_prefix('/') {
                    let rest = stripped.trim_start();
                    if rest.starts_with("dt")
                        && !rest[2..].starts_with(|c: char| c.is_alphanumeric() || c == '_')
                    {
                        return Some(text[i + 1..j].to_string());
                    }
                }
            }
        }
        i += 1;
    }
    None
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn classify_one(
    decl: &Declaration,
    extra: &BTreeMap<String, f64>,
    object: ObjectKind,
    kind: Kind,
) -> Result<Attribute> {
    let name = match kind {
        Kind::Parameter => decl.lhs.clone(),
        Kind::Variable => variable_name(&decl.lhs),
    };

    let mut locality = Locality::Local;
    let mut ctype: Option<CType> = None;
    let mut ctype_flag: Option<&str> = None;
    let mut bounds = Bounds::default();
    let mut method = Method::Explicit;
    let mut method_flag: Option<&str> = None;
    let mut flags = Vec::new();

    for FlagToken { name: fname, value } in &decl.flags {
        let fname = fname.as_str();
        if is_global_flag(fname, object) {
            locality = Locality::Global;
        } else if fname == "int" || fname == "bool" {
            let t = if fname == "int" { CType::Int } else { CType::Bool };
            if let Some(prev) = ctype_flag {
                if prev != fname {
                    return Err(ModelError::IncompatibleFlags {
                        attribute: name,
                        first: prev.to_string(),
                        second: fname.to_string(),
                    });
                }
            }
            ctype = Some(t);
            ctype_flag = Some(if fname == "int" { "int" } else { "bool" });
        } else if fname == "init" {
            bounds.init = value.clone();
        } else if fname == "min" {
            bounds.min = value.clone();
        } else if fname == "max" {
            bounds.max = value.clone();
        } else if kind == Kind::Variable && METHOD_FLAGS.contains(&fname) {
            let m = Method::from_flag(fname).unwrap();
            if let Some(prev) = method_flag {
                if prev != fname {
                    return Err(ModelError::IncompatibleFlags {
                        attribute: name,
                        first: prev.to_string(),
                        second: fname.to_string(),
                    });
                }
            }
            method = m;
            method_flag = Some(fname);
        } else if kind == Kind::Variable && fname == "unless_refractory" {
            // Constraint flag, consumed by the spike/reset analysis
        } else {
            return Err(ModelError::unknown_flag(fname, name));
        }
        let rendered = match value {
            Some(v) => format!("{}={}", fname, v),
            None => fname.to_string(),
        };
        flags.push(rendered);
    }

    let ctype = ctype.unwrap_or(CType::Double);
    let init = classify_init(&name, decl, &bounds, ctype, extra, kind)?;

    Ok(Attribute {
        name,
        kind,
        locality,
        ctype,
        init,
        bounds,
        flags,
        eq: String::new(),
        method,
        equation: None,
    })
}

fn is_global_flag(flag: &str, object: ObjectKind) -> bool {
    match object {
        ObjectKind::Neuron => flag == "population",
        ObjectKind::Synapse => flag == "postsynaptic" || flag == "projection",
    }
}

fn classify_init(
    name: &str,
    decl: &Declaration,
    bounds: &Bounds,
    ctype: CType,
    extra: &BTreeMap<String, f64>,
    kind: Kind,
) -> Result<Init> {
    // The init flag takes precedence over the right-hand side.
    if let Some(text) = &bounds.init {
        return init_from_text(name, text, ctype, extra);
    }
    match kind {
        // For parameters the right-hand side is the initial value
        Kind::Parameter => init_from_text(name, &decl.rhs, ctype, extra),
        // For variables the right-hand side is the equation; a literal one
        // still sets the start value, anything else starts at zero
        Kind::Variable => match parse_literal(&decl.rhs) {
            Some(lit) => Ok(widen(lit, ctype)),
            None => Ok(Init::zero(ctype)),
        },
    }
}

fn init_from_text(
    name: &str,
    text: &str,
    ctype: CType,
    extra: &BTreeMap<String, f64>,
) -> Result<Init> {
    if let Some(r) = parse_random_ref(text, extra)? {
        return Ok(Init::Distribution(r));
    }
    if let Some(lit) = parse_literal(text) {
        return Ok(widen(lit, ctype));
    }
    if let Some(v) = extra.get(text.trim()) {
        return Ok(widen(Init::Double(*v), ctype));
    }
    Err(ModelError::invalid_literal(
        name,
        text,
        "expected a literal, a distribution, or a named extra value",
    ))
}

/// Reconcile a parsed literal with the declared ctype
fn widen(lit: Init, ctype: CType) -> Init {
    match (lit, ctype) {
        (Init::Int(i), CType::Double) => Init::Double(i as f64),
        (Init::Double(f), CType::Int) => Init::Int(f as i64),
        (Init::Int(i), CType::Bool) => Init::Bool(i != 0),
        (other, _) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_declarations, DeclMode};

    fn params(text: &str) -> Vec<Attribute> {
        let decls = extract_declarations(text, DeclMode::Parameters).unwrap();
        classify_parameters(&decls, &BTreeMap::new(), ObjectKind::Neuron).unwrap()
    }

    #[test]
    fn locality_from_population_flag() {
        let attrs = params("tau = 10.0 : population\nbaseline = 0.0");
        assert_eq!(attrs[0].locality, Locality::Global);
        assert_eq!(attrs[1].locality, Locality::Local);
    }

    #[test]
    fn ctype_from_flags() {
        let attrs = params("n = 3 : int\nenabled = true : bool\ntau = 10.0");
        assert_eq!(attrs[0].ctype, CType::Int);
        assert_eq!(attrs[0].init, Init::Int(3));
        assert_eq!(attrs[1].ctype, CType::Bool);
        assert_eq!(attrs[2].ctype, CType::Double);
        assert_eq!(attrs[2].init, Init::Double(10.0));
    }

    #[test]
    fn distribution_rhs_is_kept_as_reference() {
        let attrs = params("w = Uniform(0.0, 1.0)");
        assert!(matches!(attrs[0].init, Init::Distribution(_)));
    }

    #[test]
    fn incompatible_ctype_flags_fail() {
        let decls = extract_declarations("n = 3 : int, bool", DeclMode::Parameters).unwrap();
        let err =
            classify_parameters(&decls, &BTreeMap::new(), ObjectKind::Neuron).unwrap_err();
        assert!(matches!(err, ModelError::IncompatibleFlags { .. }));
    }

    #[test]
    fn unknown_flag_fails() {
        let decls =
            extract_declarations("tau = 10.0 : postsynaptic", DeclMode::Parameters).unwrap();
        let err =
            classify_parameters(&decls, &BTreeMap::new(), ObjectKind::Neuron).unwrap_err();
        assert!(matches!(err, ModelError::UnknownFlag { .. }));
    }

    #[test]
    fn synapse_accepts_postsynaptic() {
        let decls =
            extract_declarations("tau = 2000 : postsynaptic", DeclMode::Parameters).unwrap();
        let attrs =
            classify_parameters(&decls, &BTreeMap::new(), ObjectKind::Synapse).unwrap();
        assert_eq!(attrs[0].locality, Locality::Global);
    }

    #[test]
    fn duplicate_attribute_fails() {
        let decls =
            extract_declarations("tau = 10.0\ntau = 20.0", DeclMode::Parameters).unwrap();
        let err =
            classify_parameters(&decls, &BTreeMap::new(), ObjectKind::Neuron).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateAttribute { .. }));
    }

    #[test]
    fn variable_name_from_derivative_lhs() {
        assert_eq!(variable_name("dr/dt"), "r");
        assert_eq!(variable_name("tau * dv/dt + v"), "v");
        assert_eq!(variable_name("r"), "r");
    }

    #[test]
    fn variable_literal_rhs_sets_init() {
        let decls = extract_declarations(
            "x = 5.0\nr = baseline + 0.5\ndv/dt = -0.1",
            DeclMode::Equations,
        )
        .unwrap();
        let attrs =
            classify_variables(&decls, &BTreeMap::new(), ObjectKind::Neuron).unwrap();
        assert_eq!(attrs[0].init, Init::Double(5.0));
        assert_eq!(attrs[1].init, Init::Double(0.0));
        assert_eq!(attrs[2].init, Init::Double(-0.1));
    }

    #[test]
    fn variable_init_from_flag() {
        let decls = extract_declarations(
            "tau * dv/dt + v = v_rest : init=-65.0, implicit",
            DeclMode::Equations,
        )
        .unwrap();
        let attrs =
            classify_variables(&decls, &BTreeMap::new(), ObjectKind::Neuron).unwrap();
        assert_eq!(attrs[0].name, "v");
        assert_eq!(attrs[0].init, Init::Double(-65.0));
        assert_eq!(attrs[0].method, Method::Implicit);
        assert_eq!(attrs[0].eq, "tau * dv/dt + v = v_rest");
    }
}
