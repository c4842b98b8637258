//! Cluster API resource definitions
//!
//! Typed views of the Cluster API resources the machine IPAM controller
//! reconciles. Only the fields the controller reads or writes are modelled;
//! everything else round-trips through flattened `extra` maps so that a full
//! replace never drops data owned by other controllers.

pub mod constants;
pub mod machine;
pub mod vsphere_machine;

pub use constants::*;
pub use machine::*;
pub use vsphere_machine::*;
