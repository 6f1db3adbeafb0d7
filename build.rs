// Adds the library directory of the Python interpreter to the runtime search path, so that the
// unit tests linking against libpython can be run via 'cargo test' within a Conda environment.
// See: https://github.com/PyO3/pyo3/issues/4283#issuecomment-2187322612

use std::process::Command;

pub fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let python_inline_script = "import sysconfig;print(sysconfig.get_config_var('LIBDIR') or '')";
    let output = ["python3", "python"].iter()
        .find_map(|py| Command::new(py).arg("-c").arg(python_inline_script).output().ok())
        .filter(|output| output.status.success());
    match output {
        Some(output) => {
            let python_lib_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !python_lib_path.is_empty() {
                println!("cargo:rustc-link-arg=-Wl,-rpath,{}", python_lib_path);
            }
        },
        None => println!("cargo:warning=Could not find the library directory of Python"),
    }
}
