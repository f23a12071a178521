#[path = "src/crds.rs"]
mod crds;

use std::fs;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../api/src");

    let out_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    fs::write(Path::new(&out_dir).join("crds.yaml"), crds::crds_yaml()?)?;

    Ok(())
}
