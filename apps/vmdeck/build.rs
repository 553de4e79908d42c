use chrono::Utc;

fn main() {
    // Stamp the binary so `vmdeck --version` identifies the console build.
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    println!("cargo:rustc-env=VMDECK_BUILD_STAMP={stamp}");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/");
}
