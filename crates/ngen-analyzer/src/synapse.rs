//! Synapse description builder: per-dendrite locality, psp and event
//! statements, post-synaptic operation checks, structural plasticity.

use std::collections::BTreeMap;

use tracing::info;

use ngen_model::{
    classify_parameters, classify_variables, extract_declarations, Attribute, Bounds, CType,
    CodeExpression, DeclMode, Description, GeneratorConfig, Init, Kind, Locality, Method,
    ModelType, ObjectKind, PsOperation, ResetStatement,
};

use crate::error::{AnalyzerError, Result};
use crate::functions::parse_functions;
use crate::neuron::{check_unique, translate_variables};
use crate::translate::Translator;

/// User-facing synapse model declaration
#[derive(Debug, Clone)]
pub struct SynapseModel {
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
    /// Continuous transmission override
    pub psp: Option<String>,
    /// Post-synaptic accumulation over the dendrite
    pub operation: String,
    /// Statements run on a pre-synaptic spike (spiking synapses)
    pub pre_spike: Option<String>,
    /// Statements run on a post-synaptic spike (spiking synapses)
    pub post_spike: Option<String>,
    /// Structural-plasticity pruning condition
    pub pruning: Option<String>,
    /// Structural-plasticity creation condition
    pub creating: Option<String>,
    /// Extra literal values referenced from flags by name
    pub extra_values: BTreeMap<String, f64>,
}

impl SynapseModel {
    /// Rate-coded synapse with parameters and equations
    pub fn rate(name: impl Into<String>, parameters: &str, equations: &str) -> Self {
        Self {
            name: name.into(),
            model_type: ModelType::Rate,
            parameters: parameters.to_string(),
            equations: equations.to_string(),
            functions: None,
            psp: None,
            operation: "sum".to_string(),
            pre_spike: None,
            post_spike: None,
            pruning: None,
            creating: None,
            extra_values: BTreeMap::new(),
        }
    }

    /// Spiking synapse with default event transmission
    pub fn spiking(name: impl Into<String>, parameters: &str, equations: &str) -> Self {
        let mut model = Self::rate(name, parameters, equations);
        model.model_type = ModelType::Spike;
        model
    }
}

/// Analyse a synapse declaration into a frozen description
pub fn analyse_synapse(model: &SynapseModel, config: &GeneratorConfig) -> Result<Description> {
    let mut desc = Description::new(&model.name, ObjectKind::Synapse, model.model_type);

    let pdecls = extract_declarations(&model.parameters, DeclMode::Parameters)?;
    desc.parameters = classify_parameters(&pdecls, &model.extra_values, ObjectKind::Synapse)?;
    let vdecls = extract_declarations(&model.equations, DeclMode::Equations)?;
    desc.variables = classify_variables(&vdecls, &model.extra_values, ObjectKind::Synapse)?;
    check_unique(&desc)?;

    // Every synapse carries a weight; synthesize it when not declared
    if !desc
        .parameters
        .iter()
        .chain(desc.variables.iter())
        .any(|a| a.name == "w")
    {
        desc.parameters.push(Attribute {
            name: "w".to_string(),
            kind: Kind::Parameter,
            locality: Locality::Local,
            ctype: CType::Double,
            init: Init::Double(0.0),
            bounds: Bounds::default(),
            flags: Vec::new(),
            eq: String::new(),
            method: Method::Explicit,
            equation: None,
        });
    }

    desc.functions = parse_functions(model.functions.as_deref().unwrap_or(""))?;

    // Post-synaptic operation: spiking transmission is event-additive
    let operation = PsOperation::from_name(&model.operation).ok_or_else(|| {
        AnalyzerError::IllegalOperation {
            operation: model.operation.clone(),
            synapse: model.name.clone(),
            reason: "unknown post-synaptic operation".into(),
        }
    })?;
    if model.model_type == ModelType::Spike && operation != PsOperation::Sum {
        return Err(AnalyzerError::IllegalOperation {
            operation: model.operation.clone(),
            synapse: model.name.clone(),
            reason: "spiking synapses only support 'sum'".into(),
        });
    }
    desc.operation = operation;

    desc.rebuild_partitions();
    let mut translator = Translator::new(&desc);

    // Continuous transmission: explicit psp overrides the weighted rate
    match (&model.psp, model.model_type) {
        (Some(text), _) => {
            let (cpp, dependencies) = translator.translate_return(text)?;
            desc.psp = Some(CodeExpression {
                eq: text.clone(),
                cpp,
                dependencies,
            });
        }
        (None, ModelType::Rate) => {
            let text = "w * pre.r";
            let (cpp, dependencies) = translator.translate_return(text)?;
            desc.psp = Some(CodeExpression {
                eq: text.to_string(),
                cpp,
                dependencies,
            });
        }
        (None, ModelType::Spike) => {}
    }

    // Event statements
    if model.model_type == ModelType::Spike {
        let pre_text = model.pre_spike.as_deref().unwrap_or("g_target += w");
        desc.pre_spike = parse_event_block(pre_text, &mut translator)?;
        if let Some(post_text) = &model.post_spike {
            desc.post_spike = parse_event_block(post_text, &mut translator)?;
        }
    }

    // Structural plasticity requires the global enable flag
    if model.pruning.is_some() || model.creating.is_some() {
        if !config.structural_plasticity {
            return Err(AnalyzerError::StructuralPlasticityDisabled {
                synapse: model.name.clone(),
            });
        }
        if let Some(text) = &model.pruning {
            let (cpp, dependencies) = translator.translate_condition(text)?;
            desc.pruning = Some(CodeExpression {
                eq: text.clone(),
                cpp,
                dependencies,
            });
        }
        if let Some(text) = &model.creating {
            let (cpp, dependencies) = translator.translate_condition(text)?;
            desc.creating = Some(CodeExpression {
                eq: text.clone(),
                cpp,
                dependencies,
            });
        }
    }

    translate_variables(&mut desc, &mut translator)?;

    info!(
        model = %model.name,
        parameters = desc.parameters.len(),
        variables = desc.variables.len(),
        "analysed synapse"
    );
    Ok(desc)
}

fn parse_event_block(
    text: &str,
    translator: &mut Translator,
) -> Result<Vec<ResetStatement>> {
    let mut out = Vec::new();
    for decl in extract_declarations(text, DeclMode::Equations)? {
        let constraint = if decl.flags.iter().any(|f| f.name == "unless_refractory") {
            "unless_refractory"
        } else {
            ""
        };
        let eq = format!("{} {} {}", decl.lhs, decl.op, decl.rhs);
        out.push(translator.translate_assignment(
            &decl.lhs,
            &decl.op,
            &decl.rhs,
            constraint,
            &eq,
        )?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GeneratorConfig {
        GeneratorConfig::default()
    }

    #[test]
    fn oja_learning_rule() {
        let model = SynapseModel::rate(
            "oja",
            "tau = 2000.0 : postsynaptic\nalpha = 8.0 : postsynaptic",
            "tau * dw/dt = pre.r * post.r - alpha * post.r^2 * w",
        );
        let desc = analyse_synapse(&model, &cfg()).unwrap();

        assert_eq!(desc.global, vec!["tau", "alpha"]);
        assert_eq!(desc.local, vec!["w"]);
        let w = desc.attribute("w").unwrap();
        assert_eq!(w.kind, Kind::Variable);
        let eq = w.equation.as_ref().unwrap();
        for dep in ["pre.r", "post.r", "alpha", "w"] {
            assert!(eq.dependencies.contains(dep), "missing dep {}", dep);
        }
        assert!(!eq.dependencies.contains("tau"));
        let switch = eq.switch.as_ref().unwrap();
        assert!(switch.contains("_pre_r[%(pre_index)s]"));
        assert!(switch.contains("_post_r[%(post_index)s]"));
        assert!(switch.contains("alpha%(global_index)s"));
        assert!(eq.cpp.contains("w%(local_index)s += dt*_w;"));
    }

    #[test]
    fn default_psp_is_weighted_rate() {
        let model = SynapseModel::rate("plain", "eta = 0.1", "dw/dt = 0.0");
        let desc = analyse_synapse(&model, &cfg()).unwrap();
        let psp = desc.psp.as_ref().unwrap();
        assert_eq!(psp.eq, "w * pre.r");
        assert!(psp.cpp.contains("w%(local_index)s"));
        assert!(psp.cpp.contains("_pre_r[%(pre_index)s]"));
    }

    #[test]
    fn spiking_synapse_rejects_mean() {
        let mut model = SynapseModel::spiking("stdp", "tau = 20.0", "dw/dt = 0.0");
        model.operation = "mean".to_string();
        let err = analyse_synapse(&model, &cfg()).unwrap_err();
        match err {
            AnalyzerError::IllegalOperation { operation, synapse, .. } => {
                assert_eq!(operation, "mean");
                assert_eq!(synapse, "stdp");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn default_pre_spike_feeds_conductance() {
        let model = SynapseModel::spiking("simple", "w = 1.0", "");
        let desc = analyse_synapse(&model, &cfg()).unwrap();
        assert_eq!(desc.pre_spike.len(), 1);
        assert_eq!(
            desc.pre_spike[0].cpp,
            "_g_%(target)s[%(post_index)s] += w%(local_index)s;"
        );
    }

    #[test]
    fn structural_plasticity_requires_enable_flag() {
        let mut model = SynapseModel::rate("pruned", "eta = 0.1", "dw/dt = -eta * w");
        model.pruning = Some("w < 0.001".to_string());
        let err = analyse_synapse(&model, &cfg()).unwrap_err();
        assert!(matches!(err, AnalyzerError::StructuralPlasticityDisabled { .. }));

        let mut cfg = cfg();
        cfg.structural_plasticity = true;
        let desc = analyse_synapse(&model, &cfg).unwrap();
        let pruning = desc.pruning.as_ref().unwrap();
        assert!(pruning.cpp.contains("w%(local_index)s < 0.001"));
    }
}
