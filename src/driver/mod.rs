//! Cluster driver abstraction layer
//!
//! Each way of building a cluster (RKE node pools, custom registered nodes,
//! hosted providers) implements the [`ClusterDriver`] trait. The host wizard
//! calls `validate` before every save attempt, `will_save` just before
//! persistence, and `done_saving` once the save has gone through.

mod rke;

pub use rke::{NodeSource, RegistrySource, RkeDriver, RkeDriverOptions};

use async_trait::async_trait;

use crate::Result;

/// Capability interface implemented per cluster driver type
#[async_trait]
pub trait ClusterDriver: Send {
    /// Validate the cluster configuration
    ///
    /// Appends any violations to the driver's error list - composing with
    /// externally-supplied messages already present - and returns whether
    /// the save may proceed.
    fn validate(&mut self) -> bool;

    /// Adjust the configuration immediately before persistence
    fn will_save(&mut self) -> Result<()>;

    /// React to a completed save (fetch tokens, advance the wizard)
    async fn done_saving(&mut self) -> Result<()>;
}
