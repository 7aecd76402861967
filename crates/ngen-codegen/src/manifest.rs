//! Build manifest and generated Makefile

use serde::Serialize;

use crate::backend::Backend;

/// One generated file, in dependency order
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    /// File name inside the generated tree
    pub file: String,
    /// Role of the file: header, source, binding, support
    pub role: String,
}

/// Manifest of a generated source tree
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Backend tag
    pub backend: String,
    /// Generated files, dependency order
    pub files: Vec<ManifestEntry>,
    /// External libraries to link
    pub link_libs: Vec<String>,
    /// Profiling regions compiled into the tree
    pub profile_regions: Vec<String>,
}

impl Manifest {
    /// Empty manifest for a backend
    pub fn new(backend: Backend) -> Self {
        Self {
            backend: backend.name().to_string(),
            files: Vec::new(),
            link_libs: backend.link_libs().iter().map(|s| s.to_string()).collect(),
            profile_regions: Vec::new(),
        }
    }

    /// Record a generated file
    pub fn push(&mut self, file: impl Into<String>, role: &str) {
        self.files.push(ManifestEntry {
            file: file.into(),
            role: role.to_string(),
        });
    }

    /// Serialize to pretty JSON (deterministic field order)
    pub fn to_json(&self) -> String {
        let mut text = serde_json::to_string_pretty(self).unwrap_or_default();
        text.push('\n');
        text
    }

    /// Generated Makefile matching the backend toolchain
    pub fn makefile(&self, backend: Backend) -> String {
        let libs: Vec<String> = self.link_libs.iter().map(|l| format!("-l{}", l)).collect();
        let libs = libs.join(" ");
        match backend {
            Backend::SingleThreaded => format!(
                "# Makefile generated by ngen\nall:\n\tg++ -O2 -shared -fPIC -std=c++14 \\\n\t    *.cpp -o libnetwork.so \\\n\t    {libs}\n\nclean:\n\trm -rf *.o\n\trm -rf *.so\n",
            ),
            Backend::ParallelThreads => format!(
                "# Makefile generated by ngen\nall:\n\tg++ -O2 -shared -fPIC -std=c++14 -fopenmp \\\n\t    *.cpp -o libnetwork.so \\\n\t    {libs}\n\nclean:\n\trm -rf *.o\n\trm -rf *.so\n",
            ),
            Backend::Gpu => format!(
                "# Makefile generated by ngen\nall:\n\tnvcc -O2 -Xcompiler -fPIC -shared \\\n\t    *.cu -o libnetwork.so \\\n\t    {libs}\n\nclean:\n\trm -rf *.o\n\trm -rf *.so\n",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lists_files_in_push_order() {
        let mut m = Manifest::new(Backend::SingleThreaded);
        m.push("Population0.h", "header");
        m.push("Population0.cpp", "source");
        let json = m.to_json();
        let h = json.find("Population0.h").unwrap();
        let c = json.find("Population0.cpp").unwrap();
        assert!(h < c);
        assert!(json.contains("\"single-threaded\""));
    }

    #[test]
    fn makefile_matches_backend_toolchain() {
        let m = Manifest::new(Backend::Gpu);
        let mk = m.makefile(Backend::Gpu);
        assert!(mk.contains("nvcc"));
        assert!(mk.contains("-lcudart"));
        let m = Manifest::new(Backend::ParallelThreads);
        assert!(m.makefile(Backend::ParallelThreads).contains("-fopenmp"));
    }
}
