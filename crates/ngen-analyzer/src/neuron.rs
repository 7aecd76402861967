//! Neuron description builder: orchestrates extraction, classification,
//! per-variable translation and the coupled-solver pass.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use ngen_model::{
    classify_parameters, classify_variables, extract_declarations, Attribute, Bounds, CType,
    DeclMode, Description, Equation, GeneratorConfig, Init, Kind, Locality, Method, ModelError,
    ModelType, ObjectKind, SpikeBlock,
};

use crate::coupled::{render_block, solve_coupled, CoupledVariable};
use crate::error::{AnalyzerError, Result};
use crate::expr::Expr;
use crate::functions::parse_functions;
use crate::translate::{find_sums, rebind_placeholders, Translator};

/// User-facing neuron model declaration
#[derive(Debug, Clone)]
pub struct NeuronModel {
    /// Model name
    pub name: String,
    /// Rate or spike
    pub model_type: ModelType,
    /// Parameter block
    pub parameters: String,
    /// Equation block
    pub equations: String,
    /// Optional function block
    pub functions: Option<String>,
    /// Spike condition (spiking models)
    pub spike: Option<String>,
    /// Reset block (spiking models)
    pub reset: Option<String>,
    /// Refractory period: literal or expression
    pub refractory: Option<String>,
    /// Extra literal values referenced from flags by name
    pub extra_values: BTreeMap<String, f64>,
}

impl NeuronModel {
    /// Rate-coded model with only parameters and equations
    pub fn rate(name: impl Into<String>, parameters: &str, equations: &str) -> Self {
        Self {
            name: name.into(),
            model_type: ModelType::Rate,
            parameters: parameters.to_string(),
            equations: equations.to_string(),
            functions: None,
            spike: None,
            reset: None,
            refractory: None,
            extra_values: BTreeMap::new(),
        }
    }

    /// Spiking model with condition and reset
    pub fn spiking(
        name: impl Into<String>,
        parameters: &str,
        equations: &str,
        spike: &str,
        reset: &str,
    ) -> Self {
        Self {
            name: name.into(),
            model_type: ModelType::Spike,
            parameters: parameters.to_string(),
            equations: equations.to_string(),
            functions: None,
            spike: Some(spike.to_string()),
            reset: Some(reset.to_string()),
            refractory: None,
            extra_values: BTreeMap::new(),
        }
    }
}

/// Analyse a neuron declaration into a frozen description
pub fn analyse_neuron(model: &NeuronModel, _config: &GeneratorConfig) -> Result<Description> {
    let mut desc = Description::new(&model.name, ObjectKind::Neuron, model.model_type);

    // Extract and classify
    let pdecls = extract_declarations(&model.parameters, DeclMode::Parameters)?;
    desc.parameters = classify_parameters(&pdecls, &model.extra_values, ObjectKind::Neuron)?;
    let vdecls = extract_declarations(&model.equations, DeclMode::Equations)?;
    desc.variables = classify_variables(&vdecls, &model.extra_values, ObjectKind::Neuron)?;
    check_unique(&desc)?;

    // Model-type defaults for the output variable
    match model.model_type {
        ModelType::Rate => {
            if !desc.variables.iter().any(|v| v.name == "r") {
                return Err(AnalyzerError::MissingRequiredVariable {
                    name: "r".into(),
                    model: model.name.clone(),
                });
            }
        }
        ModelType::Spike => {
            if desc
                .parameters
                .iter()
                .chain(desc.variables.iter())
                .any(|a| a.name == "r")
            {
                return Err(AnalyzerError::ForbiddenVariable {
                    name: "r".into(),
                    model: model.name.clone(),
                    reason: "it holds the smoothed firing-rate estimate".into(),
                });
            }
            desc.variables.push(synthesized("r", ""));
        }
    }

    // User functions must be known before equations are validated
    desc.functions = parse_functions(model.functions.as_deref().unwrap_or(""))?;

    // Targets referenced by sum(t); spiking models get default conductances
    let mut targets = BTreeSet::new();
    for var in &desc.variables {
        for t in find_sums(&var.eq) {
            targets.insert(t);
        }
    }
    desc.targets = targets.into_iter().collect();
    if model.model_type == ModelType::Spike {
        synthesize_conductances(&mut desc);
    }

    desc.rebuild_partitions();

    // Spike condition and reset
    let mut translator = Translator::new(&desc);
    if model.model_type == ModelType::Spike {
        desc.spike = Some(build_spike_block(model, &mut translator)?);
        desc.refractory = model.refractory.clone();
    }

    // Translate every variable equation
    translate_variables(&mut desc, &mut translator)?;

    info!(
        model = %model.name,
        parameters = desc.parameters.len(),
        variables = desc.variables.len(),
        "analysed neuron"
    );
    Ok(desc)
}

/// Translate each non-empty variable equation, then run the coupled pass
/// over interdependent implicit/midpoint variables. Shared by the neuron and
/// synapse builders.
pub(crate) fn translate_variables(
    desc: &mut Description,
    translator: &mut Translator,
) -> Result<()> {
    let mut slopes: BTreeMap<usize, Expr> = BTreeMap::new();
    let mut concurrent: Vec<usize> = Vec::new();

    for idx in 0..desc.variables.len() {
        let var = desc.variables[idx].clone();
        if var.eq.trim().is_empty() {
            continue;
        }
        let out = translator.translate_variable(&var)?;
        desc.variables[idx].equation = Some(Equation {
            transformed_eq: out.transformed_eq,
            untouched: out.untouched,
            cpp: out.cpp,
            switch: out.switch,
            dependencies: out.dependencies,
        });
        desc.random_distributions.extend(out.randoms);
        for op in out.global_ops {
            if !desc.global_operations.contains(&op) {
                desc.global_operations.push(op);
            }
        }
        if let Some(slope) = out.slope {
            if matches!(var.method, Method::Implicit | Method::Midpoint) {
                concurrent.push(idx);
            }
            slopes.insert(idx, slope);
        }
    }

    if concurrent.len() > 1 {
        couple_variables(desc, &concurrent, &slopes, translator)?;
    }
    Ok(())
}

/// Synthesized local double variable with init 0
pub(crate) fn synthesized(name: &str, eq: &str) -> Attribute {
    Attribute {
        name: name.to_string(),
        kind: Kind::Variable,
        locality: Locality::Local,
        ctype: CType::Double,
        init: Init::Double(0.0),
        bounds: Bounds::default(),
        flags: Vec::new(),
        eq: eq.to_string(),
        method: Method::Explicit,
        equation: None,
    }
}

pub(crate) fn check_unique(desc: &Description) -> Result<()> {
    let mut seen = BTreeSet::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        if !seen.insert(attr.name.clone()) {
            return Err(ModelError::DuplicateAttribute {
                name: attr.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Every referenced target gets a `g_<target>` conductance with a default
/// zero reset; conductances addressed directly in the equations register
/// their target too.
fn synthesize_conductances(desc: &mut Description) {
    let mut names: Vec<String> = desc
        .targets
        .iter()
        .map(|t| format!("g_{}", t))
        .collect();
    for var in &desc.variables {
        for ident in identifiers_in(&var.eq) {
            if ident.starts_with("g_") && ident.len() > 2 && !names.contains(&ident) {
                names.push(ident);
            }
        }
    }
    for name in names {
        let declared = desc
            .parameters
            .iter()
            .chain(desc.variables.iter())
            .any(|a| a.name == name);
        if !declared {
            let eq = format!("{} = 0.0", name);
            desc.variables.push(synthesized(&name, &eq));
        }
        let target = name.trim_start_matches("g_").to_string();
        if !desc.targets.contains(&target) {
            desc.targets.push(target);
        }
    }
    desc.targets.sort();
}

fn identifiers_in(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            out.push(text[start..i].to_string());
        } else {
            i += 1;
        }
    }
    out
}

fn build_spike_block(model: &NeuronModel, translator: &mut Translator) -> Result<SpikeBlock> {
    let cond_text = model.spike.as_deref().map(str::trim).unwrap_or("");
    if cond_text.is_empty() {
        return Err(ModelError::malformed(
            &model.name,
            "spiking neurons require a spike condition",
        )
        .into());
    }
    let (spike_cond, spike_cond_dependencies) = translator.translate_condition(cond_text)?;

    let reset_text = model.reset.as_deref().unwrap_or("");
    let rdecls = extract_declarations(reset_text, DeclMode::Equations)?;
    if rdecls.is_empty() {
        return Err(ModelError::malformed(
            &model.name,
            "spiking neurons require a non-empty reset block",
        )
        .into());
    }
    let mut spike_reset = Vec::new();
    for decl in &rdecls {
        let constraint = if decl.flags.iter().any(|f| f.name == "unless_refractory") {
            "unless_refractory"
        } else {
            ""
        };
        let eq = format!("{} {} {}", decl.lhs, decl.op, decl.rhs);
        spike_reset.push(translator.translate_assignment(
            &decl.lhs,
            &decl.op,
            &decl.rhs,
            constraint,
            &eq,
        )?);
    }
    Ok(SpikeBlock {
        spike_cond,
        spike_cond_dependencies,
        spike_reset,
    })
}

fn couple_variables(
    desc: &mut Description,
    concurrent: &[usize],
    slopes: &BTreeMap<usize, Expr>,
    translator: &mut Translator,
) -> Result<()> {
    let mut vars = Vec::new();
    for &idx in concurrent {
        let attr = &desc.variables[idx];
        let slope = slopes
            .get(&idx)
            .cloned()
            .ok_or_else(|| AnalyzerError::NonLinearImplicit {
                variable: attr.name.clone(),
            })?;
        vars.push(CoupledVariable {
            name: attr.name.clone(),
            method: attr.method,
            slope,
            ctype: attr.ctype.name(),
        });
    }

    let solutions = solve_coupled(&vars)?;
    let mut block = render_block(&vars, &solutions, translator);

    let mut merged_untouched = BTreeMap::new();
    let mut merged_deps = BTreeSet::new();
    for &idx in concurrent {
        if let Some(eq) = &desc.variables[idx].equation {
            merged_untouched.extend(eq.untouched.clone());
            merged_deps.extend(eq.dependencies.iter().cloned());
        }
    }

    // Clamp participants after the block, in block order
    for &idx in concurrent {
        let var = desc.variables[idx].clone();
        for clamp in translator.render_bounds(&var, &mut merged_deps)? {
            block.push('\n');
            block.push_str(&clamp);
        }
    }
    block = rebind_placeholders(block, &merged_untouched);

    // The first participant carries the atomic block; the others are
    // advanced by it and emit nothing of their own.
    for (pos, &idx) in concurrent.iter().enumerate() {
        let eq = desc.variables[idx].equation.as_mut().unwrap();
        eq.switch = None;
        eq.dependencies = merged_deps.clone();
        eq.cpp = if pos == 0 { block.clone() } else { String::new() };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GeneratorConfig {
        GeneratorConfig::default()
    }

    #[test]
    fn rate_neuron_with_leak() {
        let model = NeuronModel::rate(
            "leaky",
            "tau = 10.0 : population\nbaseline = 0.0",
            "tau * dr/dt + r = baseline : min=0.0",
        );
        let desc = analyse_neuron(&model, &cfg()).unwrap();

        assert_eq!(desc.model_type, ModelType::Rate);
        assert_eq!(desc.global, vec!["tau"]);
        assert_eq!(desc.local, vec!["baseline", "r"]);
        let r = desc.attribute("r").unwrap();
        assert_eq!(r.ctype, CType::Double);
        assert_eq!(r.init, Init::Double(0.0));
        let eq = r.equation.as_ref().unwrap();
        assert!(eq.switch.as_ref().unwrap().contains("double _r"));
        assert!(eq.cpp.contains("r%(local_index)s += dt*_r;"));
        assert!(eq.cpp.contains("if(r%(local_index)s < 0.0)"));
        assert!(desc.targets.is_empty());
        assert!(desc.random_distributions.is_empty());
        assert!(desc.global_operations.is_empty());
    }

    #[test]
    fn rate_neuron_requires_r() {
        let model = NeuronModel::rate("broken", "tau = 10.0", "dv/dt = -v / tau");
        let err = analyse_neuron(&model, &cfg()).unwrap_err();
        assert!(matches!(err, AnalyzerError::MissingRequiredVariable { .. }));
    }

    #[test]
    fn spiking_neuron_forbids_r() {
        let model = NeuronModel::spiking(
            "broken",
            "tau = 10.0",
            "dr/dt = -r / tau",
            "r > 1.0",
            "r = 0.0",
        );
        let err = analyse_neuron(&model, &cfg()).unwrap_err();
        assert!(matches!(err, AnalyzerError::ForbiddenVariable { .. }));
    }

    #[test]
    fn spiking_lif_with_refractory() {
        let mut model = NeuronModel::spiking(
            "lif",
            "tau = 20.0\nv_rest = -65.0\nv_thresh = -50.0\nv_reset = -70.0",
            "tau * dv/dt + v = v_rest + g_exc - g_inh",
            "v > v_thresh",
            "v = v_reset : unless_refractory",
        );
        model.refractory = Some("5.0".to_string());
        let desc = analyse_neuron(&model, &cfg()).unwrap();

        assert_eq!(desc.targets, vec!["exc", "inh"]);
        for name in ["g_exc", "g_inh", "r"] {
            let var = desc.attribute(name).unwrap();
            assert_eq!(var.init, Init::Double(0.0));
            assert_eq!(var.locality, Locality::Local);
        }
        let spike = desc.spike.as_ref().unwrap();
        assert!(spike.spike_cond.contains("v%(local_index)s > v_thresh%(local_index)s"));
        assert!(spike.spike_cond_dependencies.contains("v"));
        assert!(spike.spike_cond_dependencies.contains("v_thresh"));
        assert_eq!(spike.spike_reset.len(), 1);
        assert_eq!(spike.spike_reset[0].constraint, "unless_refractory");
        assert_eq!(desc.refractory.as_deref(), Some("5.0"));
    }

    #[test]
    fn conductances_reset_after_integration() {
        let model = NeuronModel::spiking(
            "lif",
            "tau = 20.0\nv_rest = -65.0",
            "tau * dv/dt + v = v_rest + g_exc",
            "v > -50.0",
            "v = v_rest",
        );
        let desc = analyse_neuron(&model, &cfg()).unwrap();
        let g = desc.attribute("g_exc").unwrap();
        let eq = g.equation.as_ref().unwrap();
        assert_eq!(eq.cpp, "g_exc%(local_index)s = 0.0;");
    }

    #[test]
    fn coupled_implicit_pair_shares_one_block() {
        let model = NeuronModel::rate(
            "osc",
            "tau = 10.0",
            "du/dt = -u + 2.0*w : implicit\ndw/dt = u - 3.0*w : implicit\ntau * dr/dt + r = u",
        );
        let desc = analyse_neuron(&model, &cfg()).unwrap();
        let u = desc.attribute("u").unwrap().equation.as_ref().unwrap();
        let w = desc.attribute("w").unwrap().equation.as_ref().unwrap();
        assert!(u.cpp.contains("double _u ="));
        assert!(u.cpp.contains("double _w ="));
        assert!(u.cpp.contains("u%(local_index)s = _u;"));
        assert!(u.cpp.contains("w%(local_index)s = _w;"));
        assert!(w.cpp.is_empty());
        assert!(u.switch.is_none() && w.switch.is_none());
    }

    #[test]
    fn duplicate_across_parameters_and_variables() {
        let model = NeuronModel::rate("dup", "r = 1.0", "dr/dt = -r");
        let err = analyse_neuron(&model, &cfg()).unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::Model(ModelError::DuplicateAttribute { .. })
        ));
    }
}
