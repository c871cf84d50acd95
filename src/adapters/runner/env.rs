//! Native runtime environment resolution.
//!
//! The tabular models run on XGBoost, which needs an OpenMP runtime. When
//! the interpreter's loader cannot find one on its own, we probe a fixed
//! ordered list of install locations and prepend the first hit to the child
//! process's dynamic-library search path. No match is not an error: the run
//! proceeds and may fail at model-load time with a message the parser will
//! surface.

use std::path::{Path, PathBuf};

/// Dynamic-loader search path variable for the target platform.
#[cfg(target_os = "macos")]
pub(crate) const LOADER_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(target_os = "macos"))]
pub(crate) const LOADER_PATH_VAR: &str = "LD_LIBRARY_PATH";

#[cfg(target_os = "macos")]
const OPENMP_LIB: &str = "libomp.dylib";
#[cfg(not(target_os = "macos"))]
const OPENMP_LIB: &str = "libomp.so.5";

/// Probed in order; first directory containing the OpenMP library wins.
#[cfg(target_os = "macos")]
const CANDIDATE_DIRS: [&str; 3] = [
    "/opt/homebrew/opt/libomp/lib",
    "/usr/local/opt/libomp/lib",
    "/usr/local/Cellar/llvm/21.1.1/lib",
];
#[cfg(not(target_os = "macos"))]
const CANDIDATE_DIRS: [&str; 4] = [
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib64",
    "/usr/local/lib",
    "/usr/lib",
];

/// Directory holding the OpenMP runtime, if any candidate matches.
pub(crate) fn resolve_openmp_dir() -> Option<PathBuf> {
    CANDIDATE_DIRS
        .iter()
        .map(Path::new)
        .find(|dir| dir.join(OPENMP_LIB).exists())
        .map(Path::to_path_buf)
}

/// Prepend `dir` to an existing search path value.
pub(crate) fn prepend_search_path(dir: &Path, existing: Option<&str>) -> String {
    match existing {
        Some(rest) if !rest.is_empty() => format!("{}:{rest}", dir.display()),
        _ => dir.display().to_string(),
    }
}
