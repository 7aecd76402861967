//! Same-step emission order for variable updates.
//!
//! Variables whose dependencies name another variable of the same step are
//! emitted after it (stable topological sort). A coupled implicit/midpoint
//! block counts as a single node. Synthesized conductance zero-resets are
//! pinned to the tail: their whole point is to run after the integration
//! that consumed the accumulated input.

use std::collections::BTreeSet;

use ngen_model::{Description, Method};

use crate::error::{EmitError, Result};

/// Return variable indices in emission order
pub fn order_variables(desc: &Description, class: &str) -> Result<Vec<usize>> {
    let n = desc.variables.len();

    // Coupled variables share one node, represented by the first member
    let coupled: Vec<usize> = (0..n)
        .filter(|&i| {
            matches!(desc.variables[i].method, Method::Implicit | Method::Midpoint)
                && desc.variables[i].equation.is_some()
        })
        .collect();
    let rep = |i: usize| -> usize {
        if coupled.len() > 1 && coupled.contains(&i) {
            coupled[0]
        } else {
            i
        }
    };

    let tail: Vec<usize> = (0..n).filter(|&i| is_conductance_reset(desc, i)).collect();
    let heads: Vec<usize> = (0..n).filter(|&i| !tail.contains(&i)).collect();

    // Edges between representatives: dep -> user
    let mut nodes: Vec<usize> = Vec::new();
    for &i in &heads {
        let r = rep(i);
        if !nodes.contains(&r) {
            nodes.push(r);
        }
    }
    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for &i in &heads {
        let Some(eq) = &desc.variables[i].equation else {
            continue;
        };
        for dep in &eq.dependencies {
            let Some(j) = desc.variables.iter().position(|v| &v.name == dep) else {
                continue;
            };
            if tail.contains(&j) {
                continue;
            }
            let (ru, rv) = (rep(j), rep(i));
            if ru != rv {
                edges.insert((ru, rv));
            }
        }
    }

    // Kahn, preferring declaration order among the ready nodes
    let mut ordered_reps = Vec::new();
    let mut remaining = nodes.clone();
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .copied()
            .find(|&v| {
                !edges
                    .iter()
                    .any(|&(u, to)| to == v && remaining.contains(&u))
            })
            .ok_or_else(|| {
                let names: Vec<&str> = remaining
                    .iter()
                    .map(|&i| desc.variables[i].name.as_str())
                    .collect();
                EmitError::DependencyCycle {
                    variables: names.join(", "),
                    description: class.to_string(),
                }
            })?;
        ordered_reps.push(next);
        remaining.retain(|&v| v != next);
    }

    // Expand representatives back to member indices, then append the tail
    let mut out = Vec::with_capacity(n);
    for r in ordered_reps {
        if coupled.len() > 1 && r == coupled[0] {
            out.extend(coupled.iter().copied());
        } else {
            out.push(r);
        }
    }
    for &i in &tail {
        out.push(i);
    }
    Ok(out)
}

/// True for the synthesized `g_<target> = 0.0` zero-reset variables
fn is_conductance_reset(desc: &Description, idx: usize) -> bool {
    let var = &desc.variables[idx];
    var.name.starts_with("g_")
        && var
            .equation
            .as_ref()
            .map(|eq| eq.cpp.ends_with("= 0.0;") && eq.dependencies.is_empty())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngen_analyzer::{analyse_neuron, NeuronModel};
    use ngen_model::GeneratorConfig;

    #[test]
    fn reader_is_emitted_after_its_source() {
        // s reads r, so r's update must come first even though s is declared
        // before it
        let model = NeuronModel::rate(
            "chained",
            "tau = 10.0",
            "s = r * 2.0\ntau * dr/dt + r = 1.0",
        );
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let order = order_variables(&desc, "Population0").unwrap();
        let names: Vec<&str> = order
            .iter()
            .map(|&i| desc.variables[i].name.as_str())
            .collect();
        let r = names.iter().position(|n| *n == "r").unwrap();
        let s = names.iter().position(|n| *n == "s").unwrap();
        assert!(r < s);
    }

    #[test]
    fn conductance_resets_stay_last() {
        let model = NeuronModel::spiking(
            "lif",
            "tau = 20.0\nv_rest = -65.0",
            "tau * dv/dt + v = v_rest + g_exc",
            "v > -50.0",
            "v = v_rest",
        );
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let order = order_variables(&desc, "Population0").unwrap();
        let names: Vec<&str> = order
            .iter()
            .map(|&i| desc.variables[i].name.as_str())
            .collect();
        assert_eq!(*names.last().unwrap(), "g_exc");
        let v = names.iter().position(|n| *n == "v").unwrap();
        assert!(v < names.len() - 1);
    }

    #[test]
    fn direct_cycle_is_reported() {
        let model = NeuronModel::rate(
            "cyclic",
            "tau = 10.0",
            "a = b + 1.0\nb = a + 1.0\ntau * dr/dt + r = 0.0",
        );
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let err = order_variables(&desc, "Population0").unwrap_err();
        assert!(matches!(err, EmitError::DependencyCycle { .. }));
    }

    #[test]
    fn coupled_block_is_one_node() {
        let model = NeuronModel::rate(
            "pair",
            "tau = 10.0",
            "du/dt = -u + w : implicit\ndw/dt = u - w : implicit\ntau * dr/dt + r = u",
        );
        let desc = analyse_neuron(&model, &GeneratorConfig::default()).unwrap();
        let order = order_variables(&desc, "Population0").unwrap();
        let names: Vec<&str> = order
            .iter()
            .map(|&i| desc.variables[i].name.as_str())
            .collect();
        let u = names.iter().position(|n| *n == "u").unwrap();
        let w = names.iter().position(|n| *n == "w").unwrap();
        let r = names.iter().position(|n| *n == "r").unwrap();
        assert!(u < r && w < r);
        assert_eq!(w, u + 1);
    }
}
