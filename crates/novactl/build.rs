// Build script for novactl - embeds version at compile time

fn main() {
    // Release builds may pin the version through the environment
    let version =
        std::env::var("NOVA_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=NOVA_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=NOVA_VERSION");
}
