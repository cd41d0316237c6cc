use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::ProvisionResult;
use crate::wifi::ProfileDescriptor;

/// Abstraction over the operating system's wireless radio.
///
/// Implementations hold no per-device state; the connection session drives
/// them one call at a time.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkControl: Send + Sync {
    /// Names of the networks currently visible to the radio.
    async fn list_visible_networks(&self) -> ProvisionResult<Vec<String>>;

    /// Name of the network the radio is associated with, if any.
    async fn associated_network(&self) -> ProvisionResult<Option<String>>;

    /// Remove a stored connection profile. Removing an unknown profile may fail;
    /// callers that only want a clean slate ignore the error.
    async fn delete_profile(&self, name: &str) -> ProvisionResult<()>;

    /// Store a connection profile, replacing any with the same name.
    async fn add_profile(&self, name: &str, descriptor: &ProfileDescriptor) -> ProvisionResult<()>;

    /// Ask the radio to connect using the stored profile `name`.
    async fn connect(&self, name: &str) -> ProvisionResult<()>;
}
