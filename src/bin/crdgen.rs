//! # CRD Generator
//!
//! Prints the `Attester` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/attester.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use attester_controller::crd::Attester;
use kube::CustomResourceExt;

fn main() {
    let crd = Attester::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the Rust types in src/crd/ and regenerate");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
