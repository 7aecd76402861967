//! CLI behavior over a real model file

use assert_cmd::Command;
use predicates::prelude::*;

const MODEL: &str = r#"
[network]
dt = 1.0

[neuron.leaky]
type = "rate"
parameters = """
tau = 10.0 : population
baseline = 0.0
"""
equations = "tau * dr/dt + r = baseline : min=0.0"

[neuron.lif]
type = "spike"
parameters = """
tau = 20.0
v_rest = -65.0
v_thresh = -50.0
v_reset = -70.0
"""
equations = "tau * dv/dt + v = v_rest + g_exc"
spike = "v > v_thresh"
reset = "v = v_reset : unless_refractory"
refractory = "5.0"

[[population]]
name = "In"
size = 64
neuron = "leaky"

[[population]]
name = "Out"
size = 16
neuron = "lif"

[[projection]]
pre = "In"
post = "Out"
target = "exc"
"#;

fn write_model(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("model.toml");
    std::fs::write(&path, MODEL).unwrap();
    path
}

#[test]
fn check_reports_every_description() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(&dir);
    Command::cargo_bin("ngen")
        .unwrap()
        .arg("check")
        .arg(&model)
        .assert()
        .success()
        .stdout(predicate::str::contains("neuron 'leaky' (rate-coded)"))
        .stdout(predicate::str::contains("neuron 'lif' (spike-coded)"))
        .stdout(predicate::str::contains("targets: exc"))
        .stdout(predicate::str::contains("2 population(s), 1 projection(s)"));
}

#[test]
fn check_fails_on_unresolved_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[neuron.broken]
type = "rate"
parameters = "tau = 10.0"
equations = "tau * dr/dt + r = baselin"
"#,
    )
    .unwrap();
    Command::cargo_bin("ngen")
        .unwrap()
        .arg("check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("baselin"));
}

#[test]
fn generate_writes_the_source_tree() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(&dir);
    let out = dir.path().join("generated");
    Command::cargo_bin("ngen")
        .unwrap()
        .arg("generate")
        .arg(&model)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Population0.h"))
        .stdout(predicate::str::contains("manifest.json"));

    assert!(out.join("Population0.h").exists());
    assert!(out.join("Population1.cpp").exists());
    assert!(out.join("Projection0.h").exists());
    assert!(out.join("Makefile").exists());

    let manifest = std::fs::read_to_string(out.join("manifest.json")).unwrap();
    assert!(manifest.contains("single-threaded"));
}

#[test]
fn generate_rejects_unknown_backend() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(&dir);
    Command::cargo_bin("ngen")
        .unwrap()
        .arg("generate")
        .arg(&model)
        .arg("--backend")
        .arg("simd")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn ops_lists_the_vocabulary() {
    Command::cargo_bin("ngen")
        .unwrap()
        .arg("ops")
        .assert()
        .success()
        .stdout(predicate::str::contains("explicit"))
        .stdout(predicate::str::contains("Uniform(min, max)"))
        .stdout(predicate::str::contains("sum(target)"));
}
