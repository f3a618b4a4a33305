// build.rs
// Compiles the sprite shaders to SPIR-V with glslc from the Vulkan SDK

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_DIR: &str = "resources/shaders";
const TARGET_DIR: &str = "../../target/shaders";

/// `sprite.vert` -> `sprite_vert.spv`, so stages of one shader don't collide
fn output_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stage = path.extension()?.to_str()?;
    match stage {
        "vert" | "frag" | "comp" | "geom" | "tesc" | "tese" => Some(format!("{stem}_{stage}.spv")),
        _ => None,
    }
}

fn is_stale(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|m| m.modified()),
        std::fs::metadata(output).and_then(|m| m.modified()),
    ) {
        (Ok(src), Ok(dst)) => src > dst,
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-changed={SHADER_DIR}");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{vulkan_sdk}\\Bin\\glslc.exe")
    } else {
        format!("{vulkan_sdk}/bin/glslc")
    };

    if !Path::new(&glslc).exists() {
        eprintln!("error: glslc not found at: {glslc}");
        eprintln!("hint: Ensure Vulkan SDK is properly installed");
        panic!("Shader compiler not found");
    }

    let target_dir = PathBuf::from(TARGET_DIR);
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {e}");
        return;
    }

    let entries = match std::fs::read_dir(SHADER_DIR) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {SHADER_DIR}");
            return;
        }
    };

    let mut compiled_count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = output_name(&path) else {
            continue;
        };
        let out_file = target_dir.join(&name);

        if !is_stale(&path, &out_file) {
            eprintln!("info: Shader {name} is up to date");
            continue;
        }

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {} -> {name}", path.display());
                compiled_count += 1;
            }
            Ok(s) => {
                eprintln!("error: glslc failed for {} with exit code: {}", path.display(), s.code().unwrap_or(-1));
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: Failed to run glslc for {}: {e}", path.display());
                panic!("Failed to execute shader compiler");
            }
        }
    }

    if compiled_count > 0 {
        eprintln!("info: Successfully compiled {compiled_count} shader(s)");
    } else {
        eprintln!("info: All shaders are up to date");
    }
}
