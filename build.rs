use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Tokens that mark I/O or process-level setup; only the binary may use them.
const LIBRARY_FORBIDDEN: [&str; 4] = ["std::fs", "csv::", "println!", "env_logger"];

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let build_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=SPHERESMOOTH_BUILD_TIMESTAMP={build_ts}");

    check_library_is_pure(Path::new("src"));
}

fn library_sources(dir: &Path, binary_entry: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            library_sources(&path, binary_entry, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") && path != binary_entry {
            out.push(path);
        }
    }
}

fn check_library_is_pure(src: &Path) {
    let mut files = Vec::new();
    library_sources(src, &src.join("main.rs"), &mut files);
    files.sort();

    let violations: Vec<String> = files
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok().map(|text| (path, text)))
        .flat_map(|(path, text)| {
            text.lines()
                .enumerate()
                .flat_map(|(i, line)| {
                    LIBRARY_FORBIDDEN
                        .iter()
                        .filter(|token| line.contains(*token))
                        .map(|token| format!("{}:{}: '{token}'", path.display(), i + 1))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        })
        .collect();

    if !violations.is_empty() {
        panic!(
            "library modules must leave I/O to src/main.rs:\n  {}",
            violations.join("\n  ")
        );
    }
}
