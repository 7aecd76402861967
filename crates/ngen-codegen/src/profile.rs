//! Profiling-annotation mixin: brackets named regions of the emitted step
//! with measurement start/stop markers. A pure pre-emit wrapper; regions are
//! never reordered.

use crate::backend::Backend;

/// Collects annotated regions and wraps code sections
#[derive(Debug)]
pub struct ProfileAnnotator {
    enabled: bool,
    backend: Backend,
    regions: Vec<String>,
}

impl ProfileAnnotator {
    /// New annotator; disabled annotators pass code through untouched
    pub fn new(enabled: bool, backend: Backend) -> Self {
        Self {
            enabled,
            backend,
            regions: Vec::new(),
        }
    }

    /// True when annotations are being emitted
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Wrap a code section with start/stop markers for `region`
    pub fn annotate(&mut self, region: &str, code: String) -> String {
        if !self.enabled || code.trim().is_empty() {
            return code;
        }
        if !self.regions.iter().any(|r| r == region) {
            self.regions.push(region.to_string());
        }
        format!(
            "Profiling::instance().start(\"{region}\");\n{code}\nProfiling::instance().stop(\"{region}\");",
        )
    }

    /// Regions annotated so far, in first-use order
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Source of the measurement primitive, emitted once per tree
    pub fn support_header(&self) -> String {
        let clock = match self.backend {
            Backend::Gpu => "cudaEvent-based timing collapses to the host clock here",
            _ => "steady-clock wall time per named region",
        };
        format!(
            r#"#ifndef __NGEN_Profiling_H__
#define __NGEN_Profiling_H__

// {clock}
#include <chrono>
#include <map>
#include <string>

class Profiling {{
public:
    static Profiling& instance() {{
        static Profiling singleton;
        return singleton;
    }}

    void start(const std::string& region) {{
        running_[region] = std::chrono::steady_clock::now();
    }}

    void stop(const std::string& region) {{
        auto it = running_.find(region);
        if (it == running_.end()) return;
        double us = std::chrono::duration_cast<std::chrono::microseconds>(
            std::chrono::steady_clock::now() - it->second).count();
        total_us_[region] += us;
        calls_[region] += 1;
    }}

    double total_us(const std::string& region) const {{
        auto it = total_us_.find(region);
        return it == total_us_.end() ? 0.0 : it->second;
    }}

    long calls(const std::string& region) const {{
        auto it = calls_.find(region);
        return it == calls_.end() ? 0 : it->second;
    }}

private:
    std::map<std::string, std::chrono::steady_clock::time_point> running_;
    std::map<std::string, double> total_us_;
    std::map<std::string, long> calls_;
}};
#endif
"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_annotator_is_identity() {
        let mut p = ProfileAnnotator::new(false, Backend::SingleThreaded);
        let code = "r[i] += dt*_r;".to_string();
        assert_eq!(p.annotate("pop0_step", code.clone()), code);
        assert!(p.regions().is_empty());
    }

    #[test]
    fn enabled_annotator_brackets_the_region() {
        let mut p = ProfileAnnotator::new(true, Backend::SingleThreaded);
        let out = p.annotate("pop0_step", "r[i] += dt*_r;".to_string());
        assert!(out.starts_with("Profiling::instance().start(\"pop0_step\");"));
        assert!(out.ends_with("Profiling::instance().stop(\"pop0_step\");"));
        assert_eq!(p.regions(), ["pop0_step"]);
    }
}
