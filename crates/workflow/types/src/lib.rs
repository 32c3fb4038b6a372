//! Workflow Domain Types
//!
//! An application workflow is a directed graph of **stages** connected by
//! **transitions**. Applications (case records owned by an external system)
//! are pinned to one revision of a definition and move through its stages
//! either automatically, when a transition's conditions hold, or manually,
//! when an authorized actor asks for it.
//!
//! # Key Concepts
//!
//! - **WorkflowDefinition**: the stage graph for one application category.
//!   At most one definition per category is active at a time.
//! - **Stage**: a processing phase with required documents, required
//!   actions and notification triggers.
//! - **Transition**: a directed edge with a conjunctive condition list and a
//!   required-permission set; automatic transitions fire on their own.
//! - **ApplicationWorkflowState**: the per-application stage pointer and
//!   history, pinned to the definition revision it started on.
//! - **AuditEntry**: one immutable, hash-linked record per mutation.
//!
//! This crate holds no I/O; the engine crate owns storage and behavior.

#![deny(unsafe_code)]

/// Declares a store-allocated numeric identifier.
///
/// Ids are allocated in ascending order, so ordering by id is creation order.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

mod application;
mod audit;
mod definition;
mod errors;
mod requests;
mod transition;

pub use application::*;
pub use audit::*;
pub use definition::*;
pub use errors::*;
pub use requests::*;
pub use transition::*;
