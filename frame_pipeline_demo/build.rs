// Build script to compile the HLSL shaders to SPIR-V
//
// Every shader file holds both stages: VSMain becomes <name>.vert.spv and
// PSMain becomes <name>.frag.spv, written to OUT_DIR.

use std::env;
use std::path::Path;
use std::process::Command;

const SHADERS: &[&str] = &["triangle", "textured"];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    for name in SHADERS {
        let input = format!("shaders/{}.hlsl", name);
        compile_stage(&input, "vert", "VSMain", &Path::new(&out_dir).join(format!("{}.vert.spv", name)));
        compile_stage(&input, "frag", "PSMain", &Path::new(&out_dir).join(format!("{}.frag.spv", name)));
    }
}

fn compile_stage(input: &str, stage: &str, entry_point: &str, output: &Path) {
    // Check if glslc is available
    let result = Command::new("glslc")
        .arg("-x")
        .arg("hlsl")
        .arg(format!("-fshader-stage={}", stage))
        .arg(format!("-fentry-point={}", entry_point))
        .arg(input)
        .arg("-o")
        .arg(output)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {} ({}): exit code {:?}", input, entry_point, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!(
                "cargo:warning=Install the Vulkan SDK or run: glslc -x hlsl -fshader-stage={} -fentry-point={} {} -o {}",
                stage,
                entry_point,
                input,
                output.display()
            );
        }
    }
}
