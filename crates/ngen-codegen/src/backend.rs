//! Target backends and their source-level conventions

use std::fmt::{Display, Formatter};

/// Backend the emitted sources are written for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Straight-line step over contiguous arrays
    #[default]
    SingleThreaded,
    /// OpenMP-partitioned local meta-step
    ParallelThreads,
    /// CUDA kernel over unit indices
    Gpu,
}

impl Backend {
    /// CLI / manifest tag
    pub fn name(self) -> &'static str {
        match self {
            Backend::SingleThreaded => "single-threaded",
            Backend::ParallelThreads => "parallel-threads",
            Backend::Gpu => "gpu",
        }
    }

    /// Resolve from the CLI / manifest tag
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "single-threaded" | "single" => Some(Backend::SingleThreaded),
            "parallel-threads" | "openmp" => Some(Backend::ParallelThreads),
            "gpu" | "cuda" => Some(Backend::Gpu),
            _ => None,
        }
    }

    /// Implementation-unit extension
    pub fn source_ext(self) -> &'static str {
        match self {
            Backend::Gpu => "cu",
            _ => "cpp",
        }
    }

    /// Libraries the build manifest must link
    pub fn link_libs(self) -> Vec<&'static str> {
        match self {
            Backend::SingleThreaded => vec!["m"],
            Backend::ParallelThreads => vec!["m", "gomp"],
            Backend::Gpu => vec!["m", "cudart"],
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for b in [Backend::SingleThreaded, Backend::ParallelThreads, Backend::Gpu] {
            assert_eq!(Backend::from_name(b.name()), Some(b));
        }
        assert_eq!(Backend::from_name("simd"), None);
    }
}
