//! Per-population source units: typed accessors, constructor, meta-steps,
//! reductions, recording, spike emission and reset handling.

use tracing::debug;

use ngen_model::{
    Attribute, Description, GeneratorConfig, GlobalOp, Init, Kind, Locality, ModelType,
    PopulationInstance, RandomDraw,
};

use crate::backend::Backend;
use crate::error::{EmitError, Result};
use crate::order::order_variables;
use crate::profile::ProfileAnnotator;
use crate::render::{check_complete, fill, indent};
use crate::templates;
use crate::Artifact;

/// Emit the header, implementation and binding units for one population
pub fn emit_population(
    pop: &PopulationInstance,
    desc: &Description,
    config: &GeneratorConfig,
    backend: Backend,
    profiler: &mut ProfileAnnotator,
) -> Result<Vec<Artifact>> {
    let class = format!("Population{}", pop.id);
    debug!(%class, model = %desc.name, "emitting population");

    verify_locality_routing(desc, &class)?;
    let order = order_variables(desc, &class)?;

    let spiking = desc.model_type == ModelType::Spike;
    let rate = desc.model_type == ModelType::Rate;

    // ------------------------------------------------------------- header
    let mut access = String::from(templates::ACCESS_GUARDS);
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        let template = match (attr.kind, attr.locality) {
            (Kind::Parameter, Locality::Local) => templates::LOCAL_PARAMETER_ACCESS,
            (Kind::Parameter, Locality::Global) => templates::GLOBAL_PARAMETER_ACCESS,
            (Kind::Variable, Locality::Local) => templates::LOCAL_VARIABLE_ACCESS,
            (Kind::Variable, Locality::Global) => templates::GLOBAL_VARIABLE_ACCESS,
        };
        access.push_str(&fill(
            template,
            &[("name", attr.name.as_str()), ("type", attr.ctype.name())],
        ));
    }

    let mut functions = String::new();
    for f in &desc.functions {
        let args: Vec<String> = f.args.iter().map(|a| format!("double {}", a)).collect();
        functions.push_str(&format!(
            "    double {}({}) {{ return {}; }}\n",
            f.name,
            args.join(", "),
            f.body
        ));
    }

    let includes = match backend {
        Backend::ParallelThreads => "#include <omp.h>\n",
        _ => "",
    };
    let header = fill(
        templates::POPULATION_HEADER,
        &[
            ("class", class.as_str()),
            ("name", pop.name.as_str()),
            ("model", desc.name.as_str()),
            ("type", if rate { "rate" } else { "spike" }),
            ("includes", includes),
            ("local_decl", local_decl(backend)),
            ("spike_api", if spiking { templates::SPIKE_API } else { "" }),
            ("access", &access),
            ("functions", &functions),
            ("members", &member_block(desc, pop, backend, spiking)),
            ("randoms", &random_members(&desc.random_distributions)),
        ],
    );

    // --------------------------------------------------------------- body
    let local_body = local_meta_step(desc, &order, spiking, backend);
    let global_body = global_meta_step(desc, &order);
    let body = match backend {
        Backend::Gpu => gpu_body(pop, desc, config, &class, &local_body, &global_body, profiler)?,
        _ => cpu_body(pop, desc, config, backend, &class, &local_body, &global_body, profiler)?,
    };

    let api = binding_surface(&class, desc, spiking);

    let header = bind_indexes(header);
    let body = bind_indexes(body);
    let api = bind_indexes(api);

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

/// Local attributes are updated only in the local meta-step; a global
/// variable whose update reads a local attribute has no well-formed
/// rendering and is a generator defect.
fn verify_locality_routing(desc: &Description, class: &str) -> Result<()> {
    for var in &desc.variables {
        if var.locality != Locality::Global {
            continue;
        }
        if let Some(eq) = &var.equation {
            for dep in &eq.dependencies {
                if desc.is_local(dep) {
                    return Err(EmitError::bug(
                        class,
                        format!(
                            "global variable '{}' depends on local attribute '{}'",
                            var.name, dep
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn local_decl(backend: Backend) -> &'static str {
    match backend {
        Backend::Gpu => "    void upload();\n    void download();\n    void uploadRandoms();\n",
        _ => "    void localMetaStep(int i);\n",
    }
}

fn member_block(
    desc: &Description,
    pop: &PopulationInstance,
    backend: Backend,
    spiking: bool,
) -> String {
    let mut out = String::new();
    out.push_str("    // Parameters\n");
    for attr in &desc.parameters {
        out.push_str(&member_decl(attr));
    }
    out.push_str("    // Variables\n");
    for attr in &desc.variables {
        out.push_str(&member_decl(attr));
        match attr.locality {
            Locality::Local => {
                out.push_str(&format!(
                    "    bool record_{0}_;\n    std::vector< std::vector<{1}> > recorded_{0}_;\n",
                    attr.name,
                    attr.ctype.name()
                ));
            }
            Locality::Global => {
                out.push_str(&format!(
                    "    bool record_{0}_;\n    std::vector<{1}> recorded_{0}_;\n",
                    attr.name,
                    attr.ctype.name()
                ));
            }
        }
    }
    if !desc.targets.is_empty() {
        out.push_str("    // Summed inputs per target\n");
        for target in &desc.targets {
            out.push_str(&format!("    std::vector<double> _sum_{};\n", target));
        }
    }
    if !desc.global_operations.is_empty() {
        out.push_str("    // Per-step reductions\n");
        for op in &desc.global_operations {
            out.push_str(&format!("    double _{}_{};\n", op.op.name(), op.var));
        }
    }
    if spiking {
        out.push_str(templates::SPIKE_MEMBERS);
        if backend == Backend::ParallelThreads {
            out.push_str("    std::vector<char> has_spiked_;\n");
        }
    }
    if desc.model_type == ModelType::Rate && pop.max_delay_steps > 1 {
        out.push_str(&format!(
            "    // Delayed output ring buffer ({} steps)\n    std::deque< std::vector<double> > delayed_r_;\n",
            pop.max_delay_steps
        ));
    }
    if backend == Backend::Gpu {
        out.push_str("    // Device mirrors\n");
        for attr in desc.parameters.iter().chain(desc.variables.iter()) {
            if attr.locality == Locality::Local {
                out.push_str(&format!("    {}* d_{};\n", attr.ctype.name(), attr.name));
            }
        }
        for target in &desc.targets {
            out.push_str(&format!("    double* d__sum_{};\n", target));
        }
        for draw in &desc.random_distributions {
            if draw.locality == Locality::Local {
                out.push_str(&format!("    double* d_{};\n", draw.name));
            }
        }
        if spiking {
            out.push_str("    char* d_has_spiked_;\n    int* d_refractory_counter_;\n");
        }
    }
    out
}

fn member_decl(attr: &Attribute) -> String {
    match attr.locality {
        Locality::Local => format!("    std::vector<{}> {};\n", attr.ctype.name(), attr.name),
        Locality::Global => format!("    {} {};\n", attr.ctype.name(), attr.name),
    }
}

fn random_members(randoms: &[RandomDraw]) -> String {
    let mut out = String::from("    std::mt19937 rng_;\n");
    for draw in randoms {
        match draw.locality {
            Locality::Local => {
                out.push_str(&format!("    std::vector<double> {};\n", draw.name))
            }
            Locality::Global => out.push_str(&format!("    double {};\n", draw.name)),
        }
    }
    out
}

/// Constructor body: size every local container and apply init values
fn constructor(
    desc: &Description,
    pop: &PopulationInstance,
    config: &GeneratorConfig,
    backend: Backend,
    spiking: bool,
) -> String {
    let mut out = String::new();
    if backend == Backend::ParallelThreads && config.num_threads > 1 {
        out.push_str(&format!("omp_set_num_threads({});\n", config.num_threads));
    }
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        match (&attr.init, attr.locality) {
            (Init::Distribution(r), Locality::Local) => {
                out.push_str(&format!(
                    "{0}.resize(size_);\n{1}\nfor (int i = 0; i < size_; i++) {0}[i] = dist_init_{0}(rng_);\n",
                    attr.name,
                    distribution_decl(&format!("dist_init_{}", attr.name), r.dist.name(), &r.args)
                ));
            }
            (init, Locality::Local) => {
                out.push_str(&format!(
                    "{}.assign(size_, {});\n",
                    attr.name,
                    init.to_code()
                ));
            }
            (Init::Distribution(r), Locality::Global) => {
                out.push_str(&format!(
                    "{1}\n{0} = dist_init_{0}(rng_);\n",
                    attr.name,
                    distribution_decl(&format!("dist_init_{}", attr.name), r.dist.name(), &r.args)
                ));
            }
            (init, Locality::Global) => {
                out.push_str(&format!("{} = {};\n", attr.name, init.to_code()));
            }
        }
        if attr.kind == Kind::Variable {
            out.push_str(&format!("record_{}_ = false;\n", attr.name));
        }
    }
    for target in &desc.targets {
        out.push_str(&format!("_sum_{}.assign(size_, 0.0);\n", target));
    }
    for op in &desc.global_operations {
        out.push_str(&format!("_{}_{} = 0.0;\n", op.op.name(), op.var));
    }
    for draw in &desc.random_distributions {
        if draw.locality == Locality::Local {
            out.push_str(&format!("{}.assign(size_, 0.0);\n", draw.name));
        }
    }
    if spiking {
        out.push_str("refractory_counter_.assign(size_, 0);\n");
    }
    if desc.model_type == ModelType::Rate && pop.max_delay_steps > 1 {
        out.push_str(&format!(
            "for (int d = 0; d < {}; d++) delayed_r_.push_back(r);\n",
            pop.max_delay_steps
        ));
    }
    out.push_str("rng_.seed(size_);");
    out
}

fn distribution_decl(name: &str, dist: &str, args: &[f64]) -> String {
    let fmt = |v: f64| ngen_model::attribute::format_double(v);
    match (dist, args) {
        ("Uniform", [a, b]) => {
            format!("std::uniform_real_distribution<double> {}({}, {});", name, fmt(*a), fmt(*b))
        }
        ("Normal", [mu, sigma]) => {
            format!("std::normal_distribution<double> {}({}, {});", name, fmt(*mu), fmt(*sigma))
        }
        ("LogNormal", [mu, sigma]) => {
            format!("std::lognormal_distribution<double> {}({}, {});", name, fmt(*mu), fmt(*sigma))
        }
        ("Gamma", [shape, scale]) => {
            format!("std::gamma_distribution<double> {}({}, {});", name, fmt(*shape), fmt(*scale))
        }
        ("Exponential", [lambda]) => {
            format!("std::exponential_distribution<double> {}({});", name, fmt(*lambda))
        }
        ("Bernoulli", [p]) => {
            format!("std::bernoulli_distribution {}({});", name, fmt(*p))
        }
        ("Binomial", [n, p]) => {
            format!("std::binomial_distribution<int> {}({}, {});", name, fmt(*n), fmt(*p))
        }
        _ => format!("std::uniform_real_distribution<double> {}(0.0, 1.0);", name),
    }
}

/// Per-unit update section: ordered variable updates, spike emission
fn local_meta_step(
    desc: &Description,
    order: &[usize],
    spiking: bool,
    backend: Backend,
) -> String {
    let mut out = String::new();
    let mut updates = String::new();
    for &idx in order {
        let var = &desc.variables[idx];
        if var.locality != Locality::Local {
            continue;
        }
        let Some(eq) = &var.equation else { continue };
        if eq.cpp.is_empty() && eq.switch.is_none() {
            continue;
        }
        updates.push_str(&format!("// {}\n", var.name));
        if let Some(switch) = &eq.switch {
            updates.push_str(switch);
            updates.push('\n');
        }
        if !eq.cpp.is_empty() {
            updates.push_str(&eq.cpp);
            updates.push('\n');
        }
    }
    if spiking {
        // The spike condition is still evaluated on refractory units; their
        // state is frozen apart from the conductance count-down.
        out.push_str(&format!(
            "if (refractory_counter_[i] > 0) {{\n    refractory_counter_[i]--;\n    refractoryStep(i);\n}} else {{\n{}\n}}\n",
            indent(updates.trim_end(), 4)
        ));
    } else {
        out.push_str(&updates);
    }
    if spiking {
        if let Some(spike) = &desc.spike {
            let emit = match backend {
                Backend::SingleThreaded => "spiked_.push_back(i);",
                // Cross-thread pushes are externalized to the global step
                _ => "has_spiked_[i] = 1;",
            };
            out.push_str(&fill(
                templates::SPIKE_EMISSION,
                &[("cond", spike.spike_cond.as_str()), ("emit", emit)],
            ));
            out.push('\n');
        }
    }
    out.pop();
    out
}

/// Global update section: global variables only
fn global_meta_step(desc: &Description, order: &[usize]) -> String {
    let mut out = String::new();
    for &idx in order {
        let var = &desc.variables[idx];
        if var.locality != Locality::Global {
            continue;
        }
        let Some(eq) = &var.equation else { continue };
        if eq.cpp.is_empty() && eq.switch.is_none() {
            continue;
        }
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
    out.pop();
    out
}

fn reduction_loop(op: GlobalOp, var: &str, backend: Backend) -> String {
    let pragma = if backend == Backend::ParallelThreads {
        match op {
            GlobalOp::Min => "#pragma omp parallel for reduction(min:_tmp)\n",
            GlobalOp::Max => "#pragma omp parallel for reduction(max:_tmp)\n",
            _ => "#pragma omp parallel for reduction(+:_tmp)\n",
        }
    } else {
        ""
    };
    let body = match op {
        GlobalOp::Min => format!(
            "double _tmp = {0}[0];\n{1}for (int k = 1; k < size_; k++) if ({0}[k] < _tmp) _tmp = {0}[k];\n_min_{0} = _tmp;",
            var, pragma
        ),
        GlobalOp::Max => format!(
            "double _tmp = {0}[0];\n{1}for (int k = 1; k < size_; k++) if ({0}[k] > _tmp) _tmp = {0}[k];\n_max_{0} = _tmp;",
            var, pragma
        ),
        GlobalOp::Mean => format!(
            "double _tmp = 0.0;\n{1}for (int k = 0; k < size_; k++) _tmp += {0}[k];\n_mean_{0} = _tmp / size_;",
            var, pragma
        ),
        GlobalOp::Norm1 => format!(
            "double _tmp = 0.0;\n{1}for (int k = 0; k < size_; k++) _tmp += std::fabs({0}[k]);\n_norm1_{0} = _tmp;",
            var, pragma
        ),
        GlobalOp::Norm2 => format!(
            "double _tmp = 0.0;\n{1}for (int k = 0; k < size_; k++) _tmp += {0}[k] * {0}[k];\n_norm2_{0} = std::sqrt(_tmp);",
            var, pragma
        ),
    };
    format!("{{\n{}\n}}\n", indent(&body, 4))
}

fn global_operations(desc: &Description, backend: Backend) -> String {
    let mut out = String::new();
    for op in &desc.global_operations {
        out.push_str(&format!("// {} of {}\n", op.op.name(), op.var));
        out.push_str(&reduction_loop(op.op, &op.var, backend));
    }
    out.pop();
    out
}

fn record_body(desc: &Description) -> String {
    let mut out = String::new();
    for var in &desc.variables {
        out.push_str(&format!(
            "if (record_{0}_) recorded_{0}_.push_back({0});\n",
            var.name
        ));
    }
    out.pop();
    out
}

fn draw_randoms(desc: &Description, backend: Backend) -> String {
    let mut out = String::new();
    for draw in &desc.random_distributions {
        out.push_str(&distribution_decl(
            &format!("dist_{}", draw.name),
            draw.dist.name(),
            &draw.args,
        ));
        out.push('\n');
        match draw.locality {
            Locality::Local => out.push_str(&format!(
                "for (int i = 0; i < size_; i++) {0}[i] = dist_{0}(rng_);\n",
                draw.name
            )),
            Locality::Global => {
                out.push_str(&format!("{0} = dist_{0}(rng_);\n", draw.name))
            }
        }
    }
    if backend == Backend::Gpu && !desc.random_distributions.is_empty() {
        out.push_str("uploadRandoms();\n");
    }
    out.pop();
    out
}

fn refractory_steps(desc: &Description) -> String {
    match desc.refractory.as_deref() {
        None => "0".to_string(),
        Some(text) => match text.trim().parse::<f64>() {
            Ok(ms) => format!("(int)({} / dt)", ngen_model::attribute::format_double(ms)),
            // Expression: an attribute holding a per-unit duration
            Err(_) => format!("(int)(({}) / dt)", bind_local(text.trim())),
        },
    }
}

fn bind_local(name: &str) -> String {
    format!("{}[i]", name)
}

/// Reset statements guarded by their constraint; refractory-step updates for
/// conductance dynamics during the count-down.
fn spike_impl(desc: &Description, class: &str) -> String {
    let Some(spike) = &desc.spike else {
        return String::new();
    };
    let mut resets = String::new();
    for entry in &spike.spike_reset {
        if entry.constraint == "unless_refractory" {
            resets.push_str(&format!(
                "        if (refractory_counter_[i] <= 0) {{ {} }}\n",
                entry.cpp
            ));
        } else {
            resets.push_str(&format!("        {}\n", entry.cpp));
        }
    }
    resets.pop();

    let updates = refractory_updates(desc);
    fill(
        templates::SPIKE_IMPL,
        &[
            ("class", class),
            ("resets", &resets),
            ("refractory_steps", &refractory_steps(desc)),
            ("refractory_updates", &indent(updates.trim_end(), 4)),
        ],
    )
}

/// During refractoriness only the conductances keep integrating
fn refractory_updates(desc: &Description) -> String {
    let mut out = String::new();
    for var in &desc.variables {
        if !var.name.starts_with("g_") {
            continue;
        }
        if let Some(eq) = &var.equation {
            if let Some(switch) = &eq.switch {
                out.push_str(switch);
                out.push('\n');
            }
            if !eq.cpp.is_empty() {
                out.push_str(&eq.cpp);
                out.push('\n');
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn cpu_body(
    pop: &PopulationInstance,
    desc: &Description,
    config: &GeneratorConfig,
    backend: Backend,
    class: &str,
    local_body: &str,
    global_body: &str,
    profiler: &mut ProfileAnnotator,
) -> Result<String> {
    let spiking = desc.model_type == ModelType::Spike;

    let mut step_prologue = String::new();
    if spiking {
        step_prologue.push_str("    spiked_.clear();\n");
        if backend == Backend::ParallelThreads {
            step_prologue.push_str("    has_spiked_.assign(size_, 0);\n");
        }
    }
    if desc.model_type == ModelType::Rate && pop.max_delay_steps > 1 {
        step_prologue.push_str(
            "    delayed_r_.push_front(r);\n    delayed_r_.pop_back();\n",
        );
    }
    step_prologue.pop();

    let pragma = if backend == Backend::ParallelThreads {
        "    #pragma omp parallel for\n"
    } else {
        ""
    };
    let local_loop = profiler.annotate(
        &format!("pop{}_neur_step", pop.id),
        format!(
            "{}    for (int i = 0; i < size_; i++) {{\n        localMetaStep(i);\n    }}",
            pragma
        ),
    );

    let mut spike_resolution = String::new();
    if spiking {
        if backend == Backend::ParallelThreads {
            spike_resolution.push_str(
                "for (int i = 0; i < size_; i++) {\n    if (has_spiked_[i]) spiked_.push_back(i);\n}\n",
            );
        }
        spike_resolution.push_str("applyResets();");
    }

    let body = fill(
        templates::POPULATION_BODY,
        &[
            ("class", class),
            ("dt", &ngen_model::attribute::format_double(config.dt)),
            (
                "constructor",
                &indent(&constructor(desc, pop, config, backend, spiking), 4),
            ),
            ("step_prologue", &step_prologue),
            ("local_loop", &local_loop),
            ("local_meta_step", &indent(local_body, 4)),
            ("global_meta_step", &indent(global_body, 4)),
            ("spike_resolution", &indent(&spike_resolution, 4)),
            ("global_ops", &indent(&global_operations(desc, backend), 4)),
            ("record", &indent(&record_body(desc), 4)),
            ("draw_randoms", &indent(&draw_randoms(desc, backend), 4)),
            ("spike_impl", &if spiking { spike_impl(desc, class) } else { String::new() }),
        ],
    );
    Ok(body)
}

#[allow(clippy::too_many_arguments)]
fn gpu_body(
    pop: &PopulationInstance,
    desc: &Description,
    config: &GeneratorConfig,
    class: &str,
    local_body: &str,
    global_body: &str,
    profiler: &mut ProfileAnnotator,
) -> Result<String> {
    let spiking = desc.model_type == ModelType::Spike;

    // Kernel arguments: locals as device pointers, globals by value
    let mut params = Vec::new();
    let mut args = Vec::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        match attr.locality {
            Locality::Local => {
                params.push(format!("{}* {}", attr.ctype.name(), attr.name));
                args.push(format!("d_{}", attr.name));
            }
            Locality::Global => {
                params.push(format!("{} {}", attr.ctype.name(), attr.name));
                args.push(attr.name.clone());
            }
        }
    }
    for target in &desc.targets {
        params.push(format!("double* _sum_{}", target));
        args.push(format!("d__sum_{}", target));
    }
    for draw in &desc.random_distributions {
        match draw.locality {
            Locality::Local => {
                params.push(format!("double* {}", draw.name));
                args.push(format!("d_{}", draw.name));
            }
            Locality::Global => {
                params.push(format!("double {}", draw.name));
                args.push(draw.name.clone());
            }
        }
    }
    if spiking {
        params.push("char* has_spiked_".to_string());
        params.push("int* refractory_counter_".to_string());
        args.push("d_has_spiked_".to_string());
        args.push("d_refractory_counter_".to_string());
    }

    // The kernel cannot call host members, so the refractory variant is
    // inlined at its call site.
    let refr = refractory_updates(desc);
    let kernel_body = local_body.replace(
        "refractoryStep(i);",
        refr.trim_end().replace('\n', "\n    ").as_str(),
    );

    let mut mirrors = String::new();
    let mut uploads = String::new();
    let mut downloads = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        if attr.locality != Locality::Local {
            continue;
        }
        let t = attr.ctype.name();
        mirrors.push_str(&format!(
            "cudaMalloc(&d_{0}, size_ * sizeof({1}));\n",
            attr.name, t
        ));
        uploads.push_str(&format!(
            "cudaMemcpy(d_{0}, {0}.data(), size_ * sizeof({1}), cudaMemcpyHostToDevice);\n",
            attr.name, t
        ));
        if attr.kind == Kind::Variable {
            downloads.push_str(&format!(
                "cudaMemcpy({0}.data(), d_{0}, size_ * sizeof({1}), cudaMemcpyDeviceToHost);\n",
                attr.name, t
            ));
        }
    }
    for target in &desc.targets {
        mirrors.push_str(&format!("cudaMalloc(&d__sum_{}, size_ * sizeof(double));\n", target));
        uploads.push_str(&format!(
            "cudaMemcpy(d__sum_{0}, _sum_{0}.data(), size_ * sizeof(double), cudaMemcpyHostToDevice);\n",
            target
        ));
    }
    let mut rand_uploads = String::new();
    for draw in &desc.random_distributions {
        if draw.locality == Locality::Local {
            mirrors.push_str(&format!("cudaMalloc(&d_{}, size_ * sizeof(double));\n", draw.name));
            rand_uploads.push_str(&format!(
                "cudaMemcpy(d_{0}, {0}.data(), size_ * sizeof(double), cudaMemcpyHostToDevice);\n",
                draw.name
            ));
        }
    }
    if spiking {
        mirrors.push_str(
            "cudaMalloc(&d_has_spiked_, size_ * sizeof(char));\ncudaMalloc(&d_refractory_counter_, size_ * sizeof(int));\n",
        );
        uploads.push_str(
            "cudaMemset(d_has_spiked_, 0, size_ * sizeof(char));\ncudaMemcpy(d_refractory_counter_, refractory_counter_.data(), size_ * sizeof(int), cudaMemcpyHostToDevice);\n",
        );
        downloads.push_str(
            "std::vector<char> _flags(size_);\ncudaMemcpy(_flags.data(), d_has_spiked_, size_ * sizeof(char), cudaMemcpyDeviceToHost);\ncudaMemcpy(refractory_counter_.data(), d_refractory_counter_, size_ * sizeof(int), cudaMemcpyDeviceToHost);\nfor (int i = 0; i < size_; i++) if (_flags[i]) spiked_.push_back(i);\n",
        );
    }
    mirrors.pop();
    uploads.pop();
    downloads.pop();

    let mut spike_resolution = String::new();
    if spiking {
        spike_resolution.push_str("applyResets();");
    }

    let launch = profiler.annotate(
        &format!("pop{}_neur_step", pop.id),
        fill(
            r#"    int threads = 128;
    int blocks = (size_ + threads - 1) / threads;
    %(class)s_local_step<<<blocks, threads>>>(size_, dt, t, %(args)s);
    cudaDeviceSynchronize();"#,
            &[("class", class), ("args", &args.join(", "))],
        ),
    );
    let step = fill(
        r#"void %(class)s::step() {
    drawRandoms();
%(step_prologue)s
    upload();
%(launch)s
    download();
    globalMetaStep();
    globalOperations();
    record();
    t++;
}"#,
        &[
            ("class", class),
            ("launch", &launch),
            (
                "step_prologue",
                if spiking { "    spiked_.clear();" } else { "" },
            ),
        ],
    );

    let body = fill(
        r#"#include "%(class)s.h"
#include <cuda_runtime.h>

__global__ void %(class)s_local_step(int size_, double dt, long t, %(params)s) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= size_) return;
%(kernel_body)s
}

%(class)s::%(class)s(int size) : size_(size), dt(%(dt)s), t(0) {
%(constructor)s
%(mirrors)s
}

void %(class)s::upload() {
%(uploads)s
}

void %(class)s::download() {
%(downloads)s
}

void %(class)s::uploadRandoms() {
%(rand_uploads)s
}

%(step)s

void %(class)s::globalMetaStep() {
%(global_meta_step)s
}

void %(class)s::globalOperations() {
%(spike_resolution)s
%(global_ops)s
}

void %(class)s::record() {
%(record)s
}

void %(class)s::drawRandoms() {
%(draw_randoms)s
}
%(spike_impl)s
"#,
        &[
            ("class", class),
            ("params", &params.join(", ")),
            ("kernel_body", &indent(&kernel_body, 4)),
            ("dt", &ngen_model::attribute::format_double(config.dt)),
            (
                "constructor",
                &indent(&constructor(desc, pop, config, Backend::Gpu, spiking), 4),
            ),
            ("mirrors", &indent(&mirrors, 4)),
            ("uploads", &indent(&uploads, 4)),
            ("downloads", &indent(&downloads, 4)),
            ("rand_uploads", &indent(&rand_uploads, 4)),
            ("step", &step),
            ("global_meta_step", &indent(global_body, 4)),
            ("spike_resolution", &indent(&spike_resolution, 4)),
            (
                "global_ops",
                &indent(&global_operations(desc, Backend::Gpu), 4),
            ),
            ("record", &indent(&record_body(desc), 4)),
            ("draw_randoms", &indent(&draw_randoms(desc, Backend::Gpu), 4)),
            (
                "spike_impl",
                &if spiking { spike_impl(desc, class) } else { String::new() },
            ),
        ],
    );
    Ok(body)
}

/// Flat C wrappers over the accessor surface
fn binding_surface(class: &str, desc: &Description, spiking: bool) -> String {
    let mut bindings = String::new();
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        let n = &attr.name;
        let t = attr.ctype.name();
        match attr.locality {
            Locality::Local => {
                bindings.push_str(&format!(
                    r#"{t} {class}_get_single_{n}(void* pop, int rank) {{ return static_cast<{class}*>(pop)->get_single_{n}(rank); }}
void {class}_set_single_{n}(void* pop, int rank, {t} value) {{ static_cast<{class}*>(pop)->set_single_{n}(rank, value); }}
void {class}_get_{n}(void* pop, {t}* out) {{ auto v = static_cast<{class}*>(pop)->get_{n}(); std::copy(v.begin(), v.end(), out); }}
void {class}_set_{n}(void* pop, const {t}* data, int size) {{ static_cast<{class}*>(pop)->set_{n}(std::vector<{t}>(data, data + size)); }}
"#
                ));
            }
            Locality::Global => {
                bindings.push_str(&format!(
                    r#"{t} {class}_get_{n}(void* pop) {{ return static_cast<{class}*>(pop)->get_{n}(); }}
void {class}_set_{n}(void* pop, {t} value) {{ static_cast<{class}*>(pop)->set_{n}(value); }}
"#
                ));
            }
        }
        if attr.kind == Kind::Variable {
            bindings.push_str(&format!(
                r#"void {class}_start_record_{n}(void* pop) {{ static_cast<{class}*>(pop)->start_record_{n}(); }}
void {class}_stop_record_{n}(void* pop) {{ static_cast<{class}*>(pop)->stop_record_{n}(); }}
void {class}_clear_recorded_{n}(void* pop) {{ static_cast<{class}*>(pop)->clear_recorded_{n}(); }}
"#
            ));
            if attr.locality == Locality::Local {
                bindings.push_str(&format!(
                    r#"int {class}_recorded_{n}_rows(void* pop) {{ return (int)static_cast<{class}*>(pop)->get_recorded_{n}().size(); }}
void {class}_get_recorded_{n}(void* pop, {t}* out) {{
    auto rows = static_cast<{class}*>(pop)->get_recorded_{n}();
    size_t k = 0;
    for (auto& row : rows) for (auto v : row) out[k++] = v;
}}
"#
                ));
            }
        }
    }
    if spiking {
        bindings.push_str(&format!(
            r#"int {class}_nb_spiked(void* pop) {{ return (int)static_cast<{class}*>(pop)->get_spiked().size(); }}
void {class}_get_spiked(void* pop, int* out) {{ auto v = static_cast<{class}*>(pop)->get_spiked(); std::copy(v.begin(), v.end(), out); }}
"#
        ));
    }

    let mut api = fill(
        templates::POPULATION_API,
        &[("class", class), ("bindings", &bindings)],
    );
    api = format!("#include <algorithm>\n#include <vector>\n{}", api);
    api
}

/// Bind the index tags for a population context
fn bind_indexes(text: String) -> String {
    text.replace("%(local_index)s", "[i]")
        .replace("%(global_index)s", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngen_analyzer::{analyse_neuron, NeuronModel};

    fn leaky() -> (PopulationInstance, Description) {
        let model = NeuronModel::rate(
            "leaky",
            "tau = 10.0 : population\nbaseline = 0.0",
            "tau * dr/dt + r = baseline : min=0.0",
        );
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let pop = PopulationInstance {
            id: 0,
            name: "Exc".into(),
            size: 100,
            neuron: "leaky".into(),
            max_delay_steps: 0,
        };
        (pop, desc)
    }

    #[test]
    fn rate_population_artifacts() {
        let (pop, desc) = leaky();
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let arts =
            emit_population(&pop, &desc, &cfg, Backend::SingleThreaded, &mut prof).unwrap();
        assert_eq!(arts.len(), 3);
        let header = &arts[0].contents;
        assert!(header.contains("std::vector<double> get_r()"));
        assert!(header.contains("double get_tau()"));
        assert!(header.contains("void start_record_r()"));
        let body = &arts[1].contents;
        assert!(body.contains("r[i] += dt*_r;"));
        assert!(body.contains("if(r[i] < 0.0) r[i] = 0.0;"));
        assert!(!body.contains("%("));
        let api = &arts[2].contents;
        assert!(api.contains("Population0_get_single_r"));
    }

    #[test]
    fn spiking_population_resets_and_refractory() {
        let mut model = NeuronModel::spiking(
            "lif",
            "tau = 20.0\nv_rest = -65.0\nv_thresh = -50.0\nv_reset = -70.0",
            "tau * dv/dt + v = v_rest + g_exc - g_inh",
            "v > v_thresh",
            "v = v_reset : unless_refractory",
        );
        model.refractory = Some("5.0".to_string());
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let pop = PopulationInstance {
            id: 1,
            name: "Spk".into(),
            size: 10,
            neuron: "lif".into(),
            max_delay_steps: 0,
        };
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let arts =
            emit_population(&pop, &desc, &cfg, Backend::SingleThreaded, &mut prof).unwrap();
        let body = &arts[1].contents;
        assert!(body.contains("spiked_.push_back(i);"));
        assert!(body.contains("if (refractory_counter_[i] <= 0) { v[i] = v_reset[i]; }"));
        assert!(body.contains("refractory_counter_[i] = (int)(5.0 / dt);"));
        assert!(body.contains("g_exc[i] = 0.0;"));
    }

    #[test]
    fn parallel_backend_externalizes_spike_writes() {
        let model = NeuronModel::spiking(
            "lif",
            "v_thresh = -50.0",
            "dv/dt = 1.0",
            "v > v_thresh",
            "v = -70.0",
        );
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let pop = PopulationInstance {
            id: 0,
            name: "P".into(),
            size: 10,
            neuron: "lif".into(),
            max_delay_steps: 0,
        };
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::ParallelThreads);
        let arts =
            emit_population(&pop, &desc, &cfg, Backend::ParallelThreads, &mut prof).unwrap();
        let body = &arts[1].contents;
        assert!(body.contains("#pragma omp parallel for"));
        assert!(body.contains("has_spiked_[i] = 1;"));
        assert!(!local_section(body).contains("spiked_.push_back"));
    }

    fn local_section(body: &str) -> &str {
        let start = body.find("localMetaStep(int i)").unwrap();
        let end = body[start..].find("globalMetaStep").unwrap();
        &body[start..start + end]
    }

    #[test]
    fn gpu_backend_emits_kernel() {
        let (pop, desc) = leaky();
        let cfg = GeneratorConfig::default();
        let mut prof = ProfileAnnotator::new(false, Backend::Gpu);
        let arts = emit_population(&pop, &desc, &cfg, Backend::Gpu, &mut prof).unwrap();
        assert!(arts[1].name.ends_with(".cu"));
        let body = &arts[1].contents;
        assert!(body.contains("__global__ void Population0_local_step"));
        assert!(body.contains("cudaMemcpy"));
        assert!(body.contains("double tau"));
        assert!(body.contains("double* r"));
    }
}
