//! End-to-end emission checks over full model-to-source pipelines

use ngen_analyzer::{analyse_neuron, analyse_synapse, NeuronModel, SynapseModel};
use ngen_codegen::{emit_network, Artifact, Backend};
use ngen_model::{GeneratorConfig, Registry};

fn emit(registry: &Registry, config: &GeneratorConfig, backend: Backend) -> Vec<Artifact> {
    emit_network(registry, config, backend).unwrap()
}

fn find<'a>(artifacts: &'a [Artifact], name: &str) -> &'a Artifact {
    artifacts
        .iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("missing artifact {}", name))
}

fn summed_rate_registry(cfg: &GeneratorConfig) -> Registry {
    let model = NeuronModel::rate(
        "summed",
        "tau = 10.0 : population",
        "tau * dr/dt + r = sum(exc)",
    );
    let desc = analyse_neuron(&model, cfg).unwrap();
    let mut reg = Registry::new();
    reg.add_description(desc);
    reg.add_population("Exc", 64, "summed");
    reg.add_projection("Exc", "Exc", "exc", None);
    reg
}

#[test]
fn summed_input_binds_to_indexed_buffer() {
    let cfg = GeneratorConfig::default();
    let reg = summed_rate_registry(&cfg);
    let arts = emit(&reg, &cfg, Backend::SingleThreaded);
    let body = &find(&arts, "Population0.cpp").contents;

    assert!(body.contains("_sum_exc[i]"), "backend binding present");
    assert!(!body.contains("sum("), "no surface syntax leaks:\n{}", body);
    assert!(!body.contains("%("), "no template tags leak");
}

#[test]
fn locality_separation_in_emitted_meta_steps() {
    let cfg = GeneratorConfig::default();
    let model = NeuronModel::rate(
        "mixedloc",
        "tau = 10.0 : population",
        "tau * dr/dt + r = baseline\nbaseline = 0.5\ngmod = mean(r) : population",
    );
    let desc = analyse_neuron(&model, &cfg).unwrap();
    let local_names: Vec<String> = desc.local.clone();
    let global_vars: Vec<String> = desc
        .variables
        .iter()
        .filter(|v| desc.is_global(&v.name))
        .map(|v| v.name.clone())
        .collect();

    let mut reg = Registry::new();
    reg.add_description(desc);
    reg.add_population("P", 10, "mixedloc");
    let arts = emit(&reg, &cfg, Backend::SingleThreaded);
    let body = &find(&arts, "Population0.cpp").contents;

    let global_section = section(body, "::globalMetaStep()", "::globalOperations()");
    for name in &local_names {
        assert!(
            !contains_identifier(global_section, name),
            "local '{}' appears in the global meta-step:\n{}",
            name,
            global_section
        );
    }
    let local_section =
        section(body, "::localMetaStep(int i)", "void Population0::globalMetaStep");
    for name in &global_vars {
        assert!(
            !contains_identifier(local_section, name),
            "global variable '{}' updated in the local meta-step",
            name
        );
    }
}

fn section<'a>(body: &'a str, from: &str, to: &str) -> &'a str {
    let start = body.find(from).unwrap();
    let end = body[start..].find(to).unwrap();
    &body[start + from.len()..start + end]
}

fn contains_identifier(text: &str, name: &str) -> bool {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(name) {
        let i = from + pos;
        let before_ok = i == 0
            || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
        let j = i + name.len();
        let after_ok =
            j >= bytes.len() || !(bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_');
        if before_ok && after_ok {
            return true;
        }
        from = i + name.len();
    }
    false
}

#[test]
fn spiking_network_wires_conductance_events() {
    let cfg = GeneratorConfig::default();
    let mut model = NeuronModel::spiking(
        "lif",
        "tau = 20.0\nv_rest = -65.0\nv_thresh = -50.0\nv_reset = -70.0",
        "tau * dv/dt + v = v_rest + g_exc",
        "v > v_thresh",
        "v = v_reset : unless_refractory",
    );
    model.refractory = Some("5.0".to_string());
    let neuron = analyse_neuron(&model, &cfg).unwrap();
    let synapse = analyse_synapse(
        &SynapseModel::spiking("simple", "w = 1.0", ""),
        &cfg,
    )
    .unwrap();

    let mut reg = Registry::new();
    reg.add_description(neuron);
    reg.add_description(synapse);
    reg.add_population("A", 50, "lif");
    reg.add_population("B", 50, "lif");
    reg.add_projection("A", "B", "exc", Some("simple".to_string()));

    let arts = emit(&reg, &cfg, Backend::SingleThreaded);
    let pop = &find(&arts, "Population0.cpp").contents;
    assert!(pop.contains("spiked_.push_back(i);"));
    assert!(pop.contains("applyResets();"));
    let proj = &find(&arts, "Projection0.cpp").contents;
    assert!(proj.contains("_g_exc[post_rank_[d]] += w[d][j];"));
}

#[test]
fn every_backend_emits_a_complete_tree() {
    let cfg = GeneratorConfig::default();
    for backend in [Backend::SingleThreaded, Backend::ParallelThreads, Backend::Gpu] {
        let reg = summed_rate_registry(&cfg);
        let arts = emit(&reg, &cfg, backend);
        let manifest = &find(&arts, "manifest.json").contents;
        assert!(manifest.contains(backend.name()));
        let makefile = &find(&arts, "Makefile").contents;
        match backend {
            Backend::Gpu => assert!(makefile.contains("nvcc")),
            Backend::ParallelThreads => assert!(makefile.contains("-fopenmp")),
            Backend::SingleThreaded => assert!(makefile.contains("g++")),
        }
        for art in &arts {
            assert!(
                !art.contents.contains("%("),
                "tag leak in {} ({})",
                art.name,
                backend
            );
        }
    }
}

#[test]
fn accessor_surface_matches_the_contract() {
    let cfg = GeneratorConfig::default();
    let reg = summed_rate_registry(&cfg);
    let arts = emit(&reg, &cfg, Backend::SingleThreaded);

    let pop_header = &find(&arts, "Population0.h").contents;
    for needle in [
        "std::vector<double> get_r()",
        "void set_r(std::vector<double> value)",
        "double get_single_r(int rank)",
        "void set_single_r(int rank, double value)",
        "void start_record_r()",
        "void stop_record_r()",
        "get_recorded_r()",
        "void clear_recorded_r()",
        "double get_tau()",
        "void set_tau(double value)",
    ] {
        assert!(pop_header.contains(needle), "missing accessor: {}", needle);
    }

    let proj_header = &find(&arts, "Projection0.h").contents;
    for needle in [
        "std::vector<int> pre_rank(int d)",
        "int nb_synapses(int d)",
        "get_dendrite_w(int d)",
        "get_synapse_w(int d, int j)",
        "structural plasticity is disabled",
    ] {
        assert!(proj_header.contains(needle), "missing accessor: {}", needle);
    }
}
