//! Cloud provider abstraction

use crate::Result;
use crate::instance::Instance;
use async_trait::async_trait;
use loko_core::ProviderKind;

/// Parameters of a new instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Instance name (tag or VM name)
    pub name: String,
    /// Machine image
    pub image: String,
    /// Instance type / VM size
    pub instance_type: String,
    /// Root volume size in GB
    pub volume_size_gb: u32,
    /// Security group name
    pub security_group: String,
    /// Name of the registered SSH key
    pub key_name: String,
}

/// One cloud backend
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider tag recorded in the state file
    fn kind(&self) -> ProviderKind;

    /// Region instances are created in
    fn region(&self) -> Option<&str>;

    /// Create an instance and return its id
    async fn create(&self, request: &CreateRequest) -> Result<String>;

    /// Current view of an instance; an unknown id yields state `Missing`
    async fn get(&self, id: &str) -> Result<Instance>;

    /// Delete an instance and the resources created with it
    async fn terminate(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl<T: CloudProvider + ?Sized> CloudProvider for Box<T> {
    fn kind(&self) -> ProviderKind {
        (**self).kind()
    }

    fn region(&self) -> Option<&str> {
        (**self).region()
    }

    async fn create(&self, request: &CreateRequest) -> Result<String> {
        (**self).create(request).await
    }

    async fn get(&self, id: &str) -> Result<Instance> {
        (**self).get(id).await
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        (**self).terminate(id).await
    }
}
