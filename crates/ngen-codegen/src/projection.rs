//! Per-projection source units: dendrite bookkeeping, psp accumulation,
//! synapse updates, event transmission, structural plasticity.

use tracing::debug;

use ngen_model::{
    Description, GeneratorConfig, Init, Kind, Locality, ModelType, ProjectionInstance,
    PsOperation,
};

use crate::backend::Backend;
use crate::error::Result;
use crate::order::order_variables;
use crate::profile::ProfileAnnotator;
use crate::render::{check_complete, fill, indent};
use crate::templates;
use crate::Artifact;

/// Emit the header, implementation and binding units for one projection
pub fn emit_projection(
    proj: &ProjectionInstance,
    desc: &Description,
    config: &GeneratorConfig,
    backend: Backend,
    profiler: &mut ProfileAnnotator,
) -> Result<Vec<Artifact>> {
    let class = format!("Projection{}", proj.id);
    debug!(%class, model = %desc.name, "emitting projection");

    // A per-dendrite update cannot read a per-synapse slot
    for var in &desc.variables {
        if var.locality != Locality::Global {
            continue;
        }
        if let Some(eq) = &var.equation {
            for dep in &eq.dependencies {
                if desc.is_local(dep) {
                    return Err(crate::error::EmitError::bug(
                        &class,
                        format!(
                            "per-dendrite variable '{}' depends on per-synapse attribute '{}'",
                            var.name, dep
                        ),
                    ));
                }
            }
        }
    }

    let order = order_variables(desc, &class)?;
    let spiking = desc.model_type == ModelType::Spike;

    // ------------------------------------------------------------- header
    let mut access = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        let template = match attr.locality {
            Locality::Local => templates::SYNAPSE_LOCAL_ACCESS,
            Locality::Global => templates::SYNAPSE_GLOBAL_ACCESS,
        };
        access.push_str(&fill(
            template,
            &[("name", attr.name.as_str()), ("type", attr.ctype.name())],
        ));
        if attr.kind == Kind::Variable {
            access.push_str(&record_access(attr.name.as_str(), attr.ctype.name(), attr.locality));
        }
    }
    for f in &desc.functions {
        let args: Vec<String> = f.args.iter().map(|a| format!("double {}", a)).collect();
        access.push_str(&format!(
            "\n    double {}({}) {{ return {}; }}\n",
            f.name,
            args.join(", "),
            f.body
        ));
    }
    access.push_str(&pointer_setters(spiking));

    let mut members = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        match attr.locality {
            Locality::Local => members.push_str(&format!(
                "    std::vector< std::vector<{}> > {};\n",
                attr.ctype.name(),
                attr.name
            )),
            Locality::Global => members.push_str(&format!(
                "    std::vector<{}> {};\n",
                attr.ctype.name(),
                attr.name
            )),
        }
        if attr.kind == Kind::Variable {
            match attr.locality {
                Locality::Local => members.push_str(&format!(
                    "    bool record_{0}_;\n    std::vector< std::vector< std::vector<{1}> > > recorded_{0}_;\n",
                    attr.name,
                    attr.ctype.name()
                )),
                Locality::Global => members.push_str(&format!(
                    "    bool record_{0}_;\n    std::vector< std::vector<{1}> > recorded_{0}_;\n",
                    attr.name,
                    attr.ctype.name()
                )),
            }
        }
    }
    let mut randoms = String::from("    std::mt19937 rng_;\n");
    for draw in &desc.random_distributions {
        match draw.locality {
            Locality::Local => randoms.push_str(&format!(
                "    std::vector< std::vector<double> > {};\n",
                draw.name
            )),
            Locality::Global => {
                randoms.push_str(&format!("    std::vector<double> {};\n", draw.name))
            }
        }
    }

    let event_api = if spiking {
        "\n    void preSpike(int pre);\n    void postSpike(int post);\n"
    } else {
        ""
    };
    let mut structural_api = if config.structural_plasticity {
        templates::STRUCTURAL_API_ENABLED.to_string()
    } else {
        templates::STRUCTURAL_API_DISABLED.to_string()
    };
    if config.structural_plasticity && desc.creating.is_some() {
        structural_api.push_str("    bool creating_test(int d, int j);\n");
    }

    let header = fill(
        templates::PROJECTION_HEADER,
        &[
            ("class", class.as_str()),
            ("pre", proj.pre.as_str()),
            ("post", proj.post.as_str()),
            ("target", proj.target.as_str()),
            ("model", desc.name.as_str()),
            ("event_api", event_api),
            ("structural_api", &structural_api),
            ("access", &access),
            ("pointers", &pointer_members(spiking)),
            ("members", &members),
            ("randoms", &randoms),
        ],
    );

    // --------------------------------------------------------------- body
    let compute_sum = profiler.annotate(
        &format!("proj{}_psp", proj.id),
        compute_sum_body(desc, spiking),
    );
    let update_synapse = profiler.annotate(
        &format!("proj{}_step", proj.id),
        update_synapse_body(desc, &order),
    );

    let body = fill(
        templates::PROJECTION_BODY,
        &[
            ("class", class.as_str()),
            ("dt", &ngen_model::attribute::format_double(config.dt)),
            ("pointer_init", &pointer_init(spiking)),
            ("ctor_body", &indent(&ctor_body(desc), 4)),
            ("dendrite_init", &indent(&dendrite_init(desc), 4)),
            ("compute_sum", &indent(&compute_sum, 4)),
            ("update_synapse", &indent(&update_synapse, 4)),
            ("record", &indent(&record_body(desc), 4)),
            ("event_impl", &if spiking { event_impl(desc, &class) } else { String::new() }),
            (
                "structural_impl",
                &if config.structural_plasticity {
                    structural_impl(desc, &class)
                } else {
                    String::new()
                },
            ),
        ],
    );

    let api = binding_surface(&class, desc);

    let header = bind_indexes(header, &proj.target);
    let body = bind_indexes(body, &proj.target);
    let api = bind_indexes(api, &proj.target);

    let header_name = format!("{}.h", class);
    let body_name = format!("{}.{}", class, backend.source_ext());
    let api_name = format!("{}_api.cpp", class);
    check_complete(&header_name, &header)?;
    check_complete(&body_name, &body)?;
    check_complete(&api_name, &api)?;

    Ok(vec![
        Artifact { name: header_name, contents: header },
        Artifact { name: body_name, contents: body },
        Artifact { name: api_name, contents: api },
    ])
}

fn record_access(name: &str, ctype: &str, locality: Locality) -> String {
    let recorded = match locality {
        Locality::Local => format!("std::vector< std::vector< std::vector<{}> > >", ctype),
        Locality::Global => format!("std::vector< std::vector<{}> >", ctype),
    };
    format!(
        r#"    void start_record_{name}() {{ record_{name}_ = true; }}
    void stop_record_{name}() {{ record_{name}_ = false; }}
    {recorded} get_recorded_{name}() {{ return recorded_{name}_; }}
    void clear_recorded_{name}() {{ recorded_{name}_.clear(); }}
"#
    )
}

fn pointer_members(spiking: bool) -> String {
    let mut out = String::from("    double* _pre_r;\n    double* _post_r;\n");
    if spiking {
        out.push_str("    double* _g_%(target)s;");
    } else {
        out.push_str("    double* _sum_%(target)s;");
    }
    out
}

fn pointer_init(spiking: bool) -> String {
    let mut out = String::from(", _pre_r(nullptr), _post_r(nullptr)");
    if spiking {
        out.push_str(", _g_%(target)s(nullptr)");
    } else {
        out.push_str(", _sum_%(target)s(nullptr)");
    }
    out
}

fn pointer_setters(spiking: bool) -> String {
    let mut out = String::from(
        "\n    // Runtime wiring\n    void set_pre_r(double* p) { _pre_r = p; }\n    void set_post_r(double* p) { _post_r = p; }\n",
    );
    if spiking {
        out.push_str("    void set_post_conductance(double* p) { _g_%(target)s = p; }\n");
    } else {
        out.push_str("    void set_post_sum(double* p) { _sum_%(target)s = p; }\n");
    }
    out
}

/// Record-flag and RNG initialization for the constructor body
fn ctor_body(desc: &Description) -> String {
    let mut out = String::new();
    for attr in &desc.variables {
        out.push_str(&format!("record_{}_ = false;\n", attr.name));
    }
    out.push_str("rng_.seed(1);");
    out
}

/// addDendrite body: size every per-synapse and per-dendrite container
fn dendrite_init(desc: &Description) -> String {
    let mut out = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        match (attr.name.as_str(), attr.locality) {
            ("w", Locality::Local) => out.push_str("w.push_back(weights);\n"),
            (_, Locality::Local) => out.push_str(&format!(
                "{}.push_back(std::vector<{}>(pre.size(), {}));\n",
                attr.name,
                attr.ctype.name(),
                init_code(&attr.init)
            )),
            (_, Locality::Global) => out.push_str(&format!(
                "{}.push_back({});\n",
                attr.name,
                init_code(&attr.init)
            )),
        }
    }
    for draw in &desc.random_distributions {
        if draw.locality == Locality::Local {
            out.push_str(&format!(
                "{}.push_back(std::vector<double>(pre.size(), 0.0));\n",
                draw.name
            ));
        }
    }
    out.pop();
    out
}

fn init_code(init: &Init) -> String {
    match init {
        // Distribution inits come through the wiring call, like the weights
        Init::Distribution(_) => "0.0".to_string(),
        other => other.to_code(),
    }
}

/// computeSum: accumulate the psp over every dendrite
fn compute_sum_body(desc: &Description, spiking: bool) -> String {
    if spiking {
        // Spiking transmission is event-driven through preSpike
        return String::from("// transmission is event-driven");
    }
    let Some(psp) = &desc.psp else {
        return String::from("// no continuous transmission");
    };
    let accumulate = match desc.operation {
        PsOperation::Sum => "sum += _psp;".to_string(),
        PsOperation::Min => "if (j == 0 || _psp < sum) sum = _psp;".to_string(),
        PsOperation::Max => "if (j == 0 || _psp > sum) sum = _psp;".to_string(),
        PsOperation::Mean => "sum += _psp;".to_string(),
    };
    let finish = match desc.operation {
        PsOperation::Mean => "_sum_%(target)s[post_rank_[d]] += sum / pre_rank_[d].size();",
        _ => "_sum_%(target)s[post_rank_[d]] += sum;",
    };
    format!(
        r#"if (_pre_r == nullptr || _sum_%(target)s == nullptr) return;
for (int d = 0; d < (int)post_rank_.size(); d++) {{
    double sum = 0.0;
    for (int j = 0; j < (int)pre_rank_[d].size(); j++) {{
        double _psp = {};
        {}
    }}
    {}
}}"#,
        psp.cpp, accumulate, finish
    )
}

/// updateSynapse: per-dendrite globals, then per-synapse locals
fn update_synapse_body(desc: &Description, order: &[usize]) -> String {
    let mut global_updates = String::new();
    let mut local_updates = String::new();
    for &idx in order {
        let var = &desc.variables[idx];
        let Some(eq) = &var.equation else { continue };
        if eq.cpp.is_empty() && eq.switch.is_none() {
            continue;
        }
        let out = match var.locality {
            Locality::Global => &mut global_updates,
            Locality::Local => &mut local_updates,
        };
        out.push_str(&format!("// {}\n", var.name));
        if let Some(switch) = &eq.switch {
            out.push_str(switch);
            out.push('\n');
        }
        if !eq.cpp.is_empty() {
            out.push_str(&eq.cpp);
            out.push('\n');
        }
    }
    if global_updates.is_empty() && local_updates.is_empty() {
        return String::from("// no synaptic dynamics\nt++;");
    }
    format!(
        "for (int d = 0; d < (int)post_rank_.size(); d++) {{\n{}    for (int j = 0; j < (int)pre_rank_[d].size(); j++) {{\n{}    }}\n}}\nt++;",
        indent(global_updates.trim_end(), 4),
        indent(local_updates.trim_end(), 8),
    )
}

fn record_body(desc: &Description) -> String {
    let mut out = String::new();
    for var in &desc.variables {
        out.push_str(&format!(
            "if (record_{0}_) recorded_{0}_.push_back({0});\n",
            var.name
        ));
    }
    if out.is_empty() {
        return String::from("// nothing to record");
    }
    out.pop();
    out
}

/// Event transmission and trace updates on pre/post spikes
fn event_impl(desc: &Description, class: &str) -> String {
    let mut pre_stmts = String::new();
    for stmt in &desc.pre_spike {
        pre_stmts.push_str(&format!("                {}\n", stmt.cpp));
    }
    let mut post_stmts = String::new();
    for stmt in &desc.post_spike {
        post_stmts.push_str(&format!("                {}\n", stmt.cpp));
    }
    let post_block = if post_stmts.is_empty() {
        String::new()
    } else {
        format!(
            r#"
void {class}::postSpike(int post) {{
    for (int d = 0; d < (int)post_rank_.size(); d++) {{
        if (post_rank_[d] != post) continue;
        for (int j = 0; j < (int)pre_rank_[d].size(); j++) {{
{post_stmts}        }}
    }}
}}"#
        )
    };
    let post_fallback = if post_stmts.is_empty() {
        format!("\nvoid {class}::postSpike(int) {{\n}}", class = class)
    } else {
        String::new()
    };
    format!(
        r#"
void {class}::preSpike(int pre) {{
    for (int d = 0; d < (int)post_rank_.size(); d++) {{
        for (int j = 0; j < (int)pre_rank_[d].size(); j++) {{
            if (pre_rank_[d][j] == pre) {{
{pre_stmts}            }}
        }}
    }}
}}{post_block}{post_fallback}
"#
    )
}

/// add/remove synapse plus the pruning pass; creation sites are enumerated
/// by the runtime, which calls the emitted predicate per candidate pair.
fn structural_impl(desc: &Description, class: &str) -> String {
    let mut locals_push = String::new();
    let mut locals_erase = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        if attr.locality != Locality::Local {
            continue;
        }
        if attr.name == "w" {
            locals_push.push_str("        w[d].push_back(w_val);\n");
        } else {
            locals_push.push_str(&format!(
                "        {}[d].push_back({});\n",
                attr.name,
                init_code(&attr.init)
            ));
        }
        locals_erase.push_str(&format!(
            "        {0}[d].erase({0}[d].begin() + j);\n",
            attr.name
        ));
    }
    let pruning = match &desc.pruning {
        Some(cond) => format!(
            r#"    for (int d = 0; d < (int)post_rank_.size(); d++) {{
        for (int j = (int)pre_rank_[d].size() - 1; j >= 0; j--) {{
            if ({}) {{
                remove_synapse(post_rank_[d], pre_rank_[d][j]);
            }}
        }}
    }}"#,
            cond.cpp
        ),
        None => "    // no pruning clause".to_string(),
    };
    let creating = match &desc.creating {
        Some(cond) => format!(
            r#"

bool {class}::creating_test(int d, int j) {{
    return {};
}}"#,
            cond.cpp
        ),
        None => String::new(),
    };
    format!(
        r#"
void {class}::add_synapse(int post, int pre, double w_val, int delay_steps) {{
    for (int d = 0; d < (int)post_rank_.size(); d++) {{
        if (post_rank_[d] != post) continue;
        if (std::find(pre_rank_[d].begin(), pre_rank_[d].end(), pre) != pre_rank_[d].end())
            throw std::invalid_argument("synapse already exists");
        pre_rank_[d].push_back(pre);
        delay_[d].push_back(delay_steps);
{locals_push}        return;
    }}
    throw std::out_of_range("no dendrite for the post-synaptic rank");
}}

void {class}::remove_synapse(int post, int pre) {{
    for (int d = 0; d < (int)post_rank_.size(); d++) {{
        if (post_rank_[d] != post) continue;
        for (int j = 0; j < (int)pre_rank_[d].size(); j++) {{
            if (pre_rank_[d][j] != pre) continue;
            pre_rank_[d].erase(pre_rank_[d].begin() + j);
            delay_[d].erase(delay_[d].begin() + j);
{locals_erase}            return;
        }}
    }}
    throw std::out_of_range("no such synapse");
}}

void {class}::structuralStep() {{
{pruning}
}}{creating}
"#
    )
}

fn binding_surface(class: &str, desc: &Description) -> String {
    let mut bindings = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        let n = &attr.name;
        let t = attr.ctype.name();
        match attr.locality {
            Locality::Local => {
                bindings.push_str(&format!(
                    r#"{t} {class}_get_synapse_{n}(void* proj, int d, int j) {{ return static_cast<{class}*>(proj)->get_synapse_{n}(d, j); }}
void {class}_set_synapse_{n}(void* proj, int d, int j, {t} value) {{ static_cast<{class}*>(proj)->set_synapse_{n}(d, j, value); }}
void {class}_get_dendrite_{n}(void* proj, int d, {t}* out) {{ auto v = static_cast<{class}*>(proj)->get_dendrite_{n}(d); std::copy(v.begin(), v.end(), out); }}
void {class}_set_dendrite_{n}(void* proj, int d, const {t}* data, int size) {{ static_cast<{class}*>(proj)->set_dendrite_{n}(d, std::vector<{t}>(data, data + size)); }}
"#
                ));
            }
            Locality::Global => {
                bindings.push_str(&format!(
                    r#"{t} {class}_get_dendrite_{n}(void* proj, int d) {{ return static_cast<{class}*>(proj)->get_dendrite_{n}(d); }}
void {class}_set_dendrite_{n}(void* proj, int d, {t} value) {{ static_cast<{class}*>(proj)->set_dendrite_{n}(d, value); }}
"#
                ));
            }
        }
    }
    bindings.push_str(&format!(
        r#"void {class}_pre_rank(void* proj, int d, int* out) {{ auto v = static_cast<{class}*>(proj)->pre_rank(d); std::copy(v.begin(), v.end(), out); }}
"#
    ));

    let mut api = fill(
        templates::PROJECTION_API,
        &[("class", class), ("bindings", &bindings)],
    );
    api = format!("#include <algorithm>\n#include <vector>\n{}", api);
    api
}

/// Bind the index tags for a projection context
fn bind_indexes(text: String, target: &str) -> String {
    text.replace("%(local_index)s", "[d][j]")
        .replace("%(global_index)s", "[d]")
        .replace("%(pre_index)s", "pre_rank_[d][j]")
        .replace("%(post_index)s", "post_rank_[d]")
        .replace("%(target)s", target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngen_analyzer::{analyse_synapse, SynapseModel};

    fn oja() -> (ProjectionInstance, Description) {
        let model = SynapseModel::rate(
            "oja",
            "tau = 2000.0 : postsynaptic\nalpha = 8.0 : postsynaptic",
            "tau * dw/dt = pre.r * post.r - alpha * post.r^2 * w",
        );
        let desc = analyse_synapse(&model, &GeneratorConfig::default()).unwrap();
        let proj = ProjectionInstance {
            id: 0,
            pre: "In".into(),
            post: "Out".into(),
            target: "exc".into(),
            synapse: Some("oja".into()),
        };
        (proj, desc)
    }

    #[test]
    fn rate_projection_artifacts() {
        let (proj, desc) = oja();
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let arts =
            emit_projection(&proj, &desc, &cfg, Backend::SingleThreaded, &mut prof).unwrap();
        assert_eq!(arts.len(), 3);
        let header = &arts[0].contents;
        assert!(header.contains("get_synapse_w(int d, int j)"));
        assert!(header.contains("get_dendrite_tau(int d)"));
        assert!(header.contains("int nb_synapses(int d)"));
        let body = &arts[1].contents;
        assert!(body.contains("w[d][j] += dt*_w;"));
        assert!(body.contains("_pre_r[pre_rank_[d][j]]"));
        assert!(body.contains("_post_r[post_rank_[d]]"));
        assert!(body.contains("_sum_exc[post_rank_[d]] += sum;"));
        assert!(!body.contains("%("));
    }

    #[test]
    fn disabled_structural_plasticity_throws() {
        let (proj, desc) = oja();
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let arts =
            emit_projection(&proj, &desc, &cfg, Backend::SingleThreaded, &mut prof).unwrap();
        let header = &arts[0].contents;
        assert!(header.contains("structural plasticity is disabled"));
    }

    #[test]
    fn spiking_projection_routes_events() {
        let model = SynapseModel::spiking("simple", "w = 1.0", "");
        let desc = analyse_synapse(&model, &GeneratorConfig::default()).unwrap();
        let proj = ProjectionInstance {
            id: 2,
            pre: "A".into(),
            post: "B".into(),
            target: "inh".into(),
            synapse: Some("simple".into()),
        };
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let arts =
            emit_projection(&proj, &desc, &cfg, Backend::SingleThreaded, &mut prof).unwrap();
        let body = &arts[1].contents;
        assert!(body.contains("void Projection2::preSpike(int pre)"));
        assert!(body.contains("_g_inh[post_rank_[d]] += w[d][j];"));
        let header = &arts[0].contents;
        assert!(header.contains("double* _g_inh;"));
    }

    #[test]
    fn pruning_pass_is_emitted_when_enabled() {
        let mut model = SynapseModel::rate("pruned", "eta = 0.1", "dw/dt = -eta * w");
        model.pruning = Some("w < 0.001".to_string());
        let mut cfg = GeneratorConfig::default();
        cfg.structural_plasticity = true;
        let desc = analyse_synapse(&model, &cfg).unwrap();
        let proj = ProjectionInstance {
            id: 1,
            pre: "A".into(),
            post: "B".into(),
            target: "exc".into(),
            synapse: Some("pruned".into()),
        };
        let mut prof = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let arts =
            emit_projection(&proj, &desc, &cfg, Backend::SingleThreaded, &mut prof).unwrap();
        let body = &arts[1].contents;
        assert!(body.contains("void Projection1::add_synapse"));
        assert!(body.contains("remove_synapse(post_rank_[d], pre_rank_[d][j]);"));
        assert!(body.contains("w[d][j] < 0.001"));
    }
}
