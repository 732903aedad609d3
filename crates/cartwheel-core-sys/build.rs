use std::{
    env, fs,
    path::{Path, PathBuf},
};

fn main() {
    let bundled = env::var_os("CARGO_FEATURE_BUNDLED").is_some();
    let system = env::var_os("CARGO_FEATURE_SYSTEM").is_some();

    if bundled && system {
        panic!("cartwheel-core-sys: enable only one of 'bundled' or 'system'");
    }

    if bundled {
        build_bundled();
    } else if system {
        link_system();
    }
    // Neither feature: link nothing. `cartwheel-session` only references these
    // symbols when its `native` adapter is enabled.
}

fn link_system() {
    println!("cargo:rerun-if-env-changed=VBACORE_LIB_DIR");
    if let Some(dir) = env::var_os("VBACORE_LIB_DIR") {
        println!(
            "cargo:rustc-link-search=native={}",
            PathBuf::from(dir).display()
        );
    }

    // Windows: expects vbacore.lib (MSVC) or libvbacore.a (GNU) in the search path.
    println!("cargo:rustc-link-lib=vbacore");

    if env::var_os("CARGO_CFG_UNIX").is_some() {
        // The core is C++ underneath the C ABI.
        let runtime = if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
            "c++"
        } else {
            "stdc++"
        };
        println!("cargo:rustc-link-lib={runtime}");
    }
}

fn build_bundled() {
    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
    let workspace_root = manifest_dir.join("..").join("..");

    let vendor_dir = match env::var_os("VBACORE_SRC_DIR") {
        Some(src) => PathBuf::from(src),
        None => workspace_root.join("vendor").join("vbacore"),
    };

    if !vendor_dir.exists() {
        panic!(
            "cartwheel-core-sys (bundled): missing vendored core source at {}\n\n\
Place the core checkout at vendor/vbacore or set VBACORE_SRC_DIR,\n\
then rebuild with: cargo build -p cartwheel-session --features bundled\n",
            vendor_dir.display()
        );
    }

    if !vendor_dir.join("vbacore.h").exists() {
        panic!(
            "cartwheel-core-sys (bundled): {} is not a core checkout (no vbacore.h)",
            vendor_dir.display()
        );
    }

    println!("cargo:rerun-if-changed={}", vendor_dir.display());
    println!("cargo:rerun-if-env-changed=VBACORE_SRC_DIR");

    let sources = collect_sources(&vendor_dir);
    if sources.is_empty() {
        panic!(
            "cartwheel-core-sys (bundled): found no C/C++ sources under {}",
            vendor_dir.display()
        );
    }

    let mut build = cc::Build::new();
    build.cpp(true).include(&vendor_dir).define("C_CORE", None);
    for file in sources {
        build.file(file);
    }
    build.warnings(false);
    build.compile("vbacore");
}

fn is_source_extension(ext: &str) -> bool {
    matches!(ext.to_ascii_lowercase().as_str(), "c" | "cpp" | "cc")
}

fn collect_sources(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let name = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();

                // Frontends and tools shipped alongside the core are not part of the library.
                if name.contains("test")
                    || name.contains("frontend")
                    || name.contains("tools")
                    || name == ".git"
                {
                    continue;
                }

                stack.push(path);
                continue;
            }

            let is_source = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(is_source_extension);
            if file_type.is_file() && is_source {
                out.push(path);
            }
        }
    }

    out.sort();
    out
}
