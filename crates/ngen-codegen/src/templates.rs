//! Source-unit templates. Tags are bound with [`crate::render::fill`]; any
//! tag left over after rendering is an emitter bug.

/// Header for a population type
pub const POPULATION_HEADER: &str = r#"#ifndef __NGEN_%(class)s_H__
#define __NGEN_%(class)s_H__

#include <cmath>
#include <cstdlib>
#include <deque>
#include <random>
#include <stdexcept>
#include <vector>
%(includes)s
// %(class)s: %(name)s (%(model)s, %(type)s-coded)
class %(class)s {
public:
    %(class)s(int size);

    int size() const { return size_; }

    void step();
%(local_decl)s    void globalMetaStep();
    void globalOperations();
    void record();
%(spike_api)s
%(access)s
%(functions)s
private:
    void drawRandoms();

    int size_;
    double dt;
    long t;

%(members)s
%(randoms)s
};
#endif
"#;

/// Access block for a local parameter
pub const LOCAL_PARAMETER_ACCESS: &str = r#"
    // Local parameter %(name)s
    std::vector<%(type)s> get_%(name)s() { return %(name)s; }
    void set_%(name)s(std::vector<%(type)s> value) { check_size(value.size(), "%(name)s"); %(name)s = value; }
    %(type)s get_single_%(name)s(int rank) { check_rank(rank, "%(name)s"); return %(name)s[rank]; }
    void set_single_%(name)s(int rank, %(type)s value) { check_rank(rank, "%(name)s"); %(name)s[rank] = value; }
"#;

/// Access block for a local variable (adds recording)
pub const LOCAL_VARIABLE_ACCESS: &str = r#"
    // Local variable %(name)s
    std::vector<%(type)s> get_%(name)s() { return %(name)s; }
    void set_%(name)s(std::vector<%(type)s> value) { check_size(value.size(), "%(name)s"); %(name)s = value; }
    %(type)s get_single_%(name)s(int rank) { check_rank(rank, "%(name)s"); return %(name)s[rank]; }
    void set_single_%(name)s(int rank, %(type)s value) { check_rank(rank, "%(name)s"); %(name)s[rank] = value; }
    void start_record_%(name)s() { record_%(name)s_ = true; }
    void stop_record_%(name)s() { record_%(name)s_ = false; }
    std::vector< std::vector<%(type)s> > get_recorded_%(name)s() { return recorded_%(name)s_; }
    void clear_recorded_%(name)s() { recorded_%(name)s_.clear(); }
"#;

/// Access block for a global parameter
pub const GLOBAL_PARAMETER_ACCESS: &str = r#"
    // Global parameter %(name)s
    %(type)s get_%(name)s() { return %(name)s; }
    void set_%(name)s(%(type)s value) { %(name)s = value; }
"#;

/// Access block for a global variable (adds recording)
pub const GLOBAL_VARIABLE_ACCESS: &str = r#"
    // Global variable %(name)s
    %(type)s get_%(name)s() { return %(name)s; }
    void set_%(name)s(%(type)s value) { %(name)s = value; }
    void start_record_%(name)s() { record_%(name)s_ = true; }
    void stop_record_%(name)s() { record_%(name)s_ = false; }
    std::vector<%(type)s> get_recorded_%(name)s() { return recorded_%(name)s_; }
    void clear_recorded_%(name)s() { recorded_%(name)s_.clear(); }
"#;

/// Bounds-checking helpers shared by every accessor
pub const ACCESS_GUARDS: &str = r#"
    void check_rank(int rank, const char* attribute) const {
        if (rank < 0 || rank >= size_)
            throw std::out_of_range(std::string(attribute) + ": rank out of range");
    }
    void check_size(size_t n, const char* attribute) const {
        if ((int)n != size_)
            throw std::invalid_argument(std::string(attribute) + ": size mismatch");
    }
"#;

/// Body of a population implementation unit
pub const POPULATION_BODY: &str = r#"#include "%(class)s.h"

%(class)s::%(class)s(int size) : size_(size), dt(%(dt)s), t(0) {
%(constructor)s
}

void %(class)s::step() {
    drawRandoms();
%(step_prologue)s
%(local_loop)s
    globalMetaStep();
    globalOperations();
    record();
    t++;
}

void %(class)s::localMetaStep(int i) {
%(local_meta_step)s
}

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
"#;

/// Spike bookkeeping declarations inside the population header
pub const SPIKE_API: &str = r#"
    void applyResets();
    void refractoryStep(int i);
    std::vector<int> get_spiked() { return spiked_; }
"#;

/// Spike bookkeeping members inside the population header
pub const SPIKE_MEMBERS: &str = r#"    std::vector<int> spiked_;
    std::vector<int> refractory_counter_;
"#;

/// Spike emission inside the local meta-step
pub const SPIKE_EMISSION: &str = r#"if (%(cond)s) {
    %(emit)s
}"#;

/// Reset and refractory routines of a spiking population
pub const SPIKE_IMPL: &str = r#"
void %(class)s::applyResets() {
    for (size_t idx = 0; idx < spiked_.size(); idx++) {
        int i = spiked_[idx];
%(resets)s
        refractory_counter_[i] = %(refractory_steps)s;
    }
}

void %(class)s::refractoryStep(int i) {
%(refractory_updates)s
}
"#;

/// C binding surface over the population accessors
pub const POPULATION_API: &str = r#"#include "%(class)s.h"

// Flat C surface over %(class)s for the outer process-wide state
extern "C" {

void* %(class)s_new(int size) { return new %(class)s(size); }
void %(class)s_delete(void* pop) { delete static_cast<%(class)s*>(pop); }
int %(class)s_size(void* pop) { return static_cast<%(class)s*>(pop)->size(); }
void %(class)s_step(void* pop) { static_cast<%(class)s*>(pop)->step(); }
%(bindings)s
}
"#;

/// Header for a projection type
pub const PROJECTION_HEADER: &str = r#"#ifndef __NGEN_%(class)s_H__
#define __NGEN_%(class)s_H__

#include <algorithm>
#include <cmath>
#include <random>
#include <stdexcept>
#include <vector>

// %(class)s: %(pre)s -> %(post)s on target '%(target)s' (%(model)s)
class %(class)s {
public:
    %(class)s();

    int nb_dendrites() const { return (int)post_rank_.size(); }
    int nb_synapses(int d) const { check_dendrite(d); return (int)pre_rank_[d].size(); }
    std::vector<int> pre_rank(int d) const { check_dendrite(d); return pre_rank_[d]; }
    std::vector<int> post_rank() const { return post_rank_; }

    void addDendrite(int post, const std::vector<int>& pre,
                     const std::vector<double>& weights,
                     const std::vector<int>& delay_steps);
    void computeSum();
    void updateSynapse();
    void record();
%(event_api)s
%(structural_api)s
%(access)s
private:
    void check_dendrite(int d) const {
        if (d < 0 || d >= (int)post_rank_.size())
            throw std::out_of_range("dendrite index out of range");
    }

    double dt;
    long t;

    std::vector<int> post_rank_;
    std::vector< std::vector<int> > pre_rank_;
    std::vector< std::vector<int> > delay_;

    // Bound to the runtime containers at wiring time
%(pointers)s
%(members)s
%(randoms)s
};
#endif
"#;

/// Per-dendrite and per-synapse access for a local synaptic attribute
pub const SYNAPSE_LOCAL_ACCESS: &str = r#"
    // Local synaptic attribute %(name)s
    std::vector<%(type)s> get_dendrite_%(name)s(int d) { check_dendrite(d); return %(name)s[d]; }
    void set_dendrite_%(name)s(int d, std::vector<%(type)s> value) { check_dendrite(d); %(name)s[d] = value; }
    %(type)s get_synapse_%(name)s(int d, int j) { check_dendrite(d); return %(name)s[d].at(j); }
    void set_synapse_%(name)s(int d, int j, %(type)s value) { check_dendrite(d); %(name)s[d].at(j) = value; }
"#;

/// Per-dendrite access for a global (post-synaptic) attribute
pub const SYNAPSE_GLOBAL_ACCESS: &str = r#"
    // Post-synaptic attribute %(name)s
    %(type)s get_dendrite_%(name)s(int d) { check_dendrite(d); return %(name)s[d]; }
    void set_dendrite_%(name)s(int d, %(type)s value) { check_dendrite(d); %(name)s[d] = value; }
"#;

/// Structural-plasticity surface when the enable flag is on
pub const STRUCTURAL_API_ENABLED: &str = r#"
    void add_synapse(int post, int pre, double w, int delay_steps);
    void remove_synapse(int post, int pre);
    void structuralStep();
"#;

/// Structural-plasticity surface when the enable flag is off
pub const STRUCTURAL_API_DISABLED: &str = r#"
    void add_synapse(int, int, double, int) {
        throw std::runtime_error("structural plasticity is disabled");
    }
    void remove_synapse(int, int) {
        throw std::runtime_error("structural plasticity is disabled");
    }
"#;

/// Body of a projection implementation unit
pub const PROJECTION_BODY: &str = r#"#include "%(class)s.h"

%(class)s::%(class)s()
    : dt(%(dt)s), t(0)%(pointer_init)s {
%(ctor_body)s
}

void %(class)s::addDendrite(int post, const std::vector<int>& pre,
                            const std::vector<double>& weights,
                            const std::vector<int>& delay_steps) {
    post_rank_.push_back(post);
    pre_rank_.push_back(pre);
    delay_.push_back(delay_steps);
%(dendrite_init)s
}

void %(class)s::computeSum() {
%(compute_sum)s
}

void %(class)s::updateSynapse() {
%(update_synapse)s
}

void %(class)s::record() {
%(record)s
}
%(event_impl)s
%(structural_impl)s
"#;

/// C binding surface over the projection accessors
pub const PROJECTION_API: &str = r#"#include "%(class)s.h"

// Flat C surface over %(class)s for the outer process-wide state
extern "C" {

void* %(class)s_new() { return new %(class)s(); }
void %(class)s_delete(void* proj) { delete static_cast<%(class)s*>(proj); }
int %(class)s_nb_dendrites(void* proj) { return static_cast<%(class)s*>(proj)->nb_dendrites(); }
int %(class)s_nb_synapses(void* proj, int d) { return static_cast<%(class)s*>(proj)->nb_synapses(d); }
%(bindings)s
}
"#;
