//! Prints the CustomResourceDefinitions of the modelled Cluster API resources.
//!
//! Real clusters get these CRDs from Cluster API and CAPV. The generated
//! manifests only cover the fields the controller touches and are meant for
//! throwaway development clusters.

use crds::{Machine, VSphereMachine};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("---\n{}", serde_yaml::to_string(&VSphereMachine::crd())?);
    print!("---\n{}", serde_yaml::to_string(&Machine::crd())?);
    Ok(())
}
