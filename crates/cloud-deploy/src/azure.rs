//! Azure virtual machines through the `az` CLI
//!
//! Azure identifies everything by resource path, e.g.
//! `/subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Compute/virtualMachines/<name>`.
//! Deleting a VM leaves its network interface, public IP and OS disk behind,
//! so [`AzureProvider::terminate`] removes those too.

use crate::cli::{CloudCli, args, failed_with};
use crate::instance::{Instance, InstanceState};
use crate::provider::{CloudProvider, CreateRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use loko_core::ProviderKind;
use serde_json::Value;
use std::fmt;

/// Default location
pub const DEFAULT_LOCATION: &str = "westeurope";
/// Default resource group, network security group and virtual network name
pub const DEFAULT_GROUP: &str = "loko";

const NOT_FOUND: &[&str] = &["ResourceNotFound", "ResourceGroupNotFound", "was not found"];

/// A decomposed Azure resource id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureResourceId {
    /// Subscription id
    pub subscription: String,
    /// Resource group name
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.Compute`
    pub namespace: String,
    /// Resource type, e.g. `virtualMachines`
    pub resource_type: String,
    /// Resource name
    pub name: String,
}

impl AzureResourceId {
    /// Parse a resource path; child resource segments after the name are ignored
    pub fn parse(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.trim().trim_start_matches('/').split('/').collect();
        let invalid = || Error::ProvisionFailure(format!("invalid Azure resource id: {id}"));
        if parts.len() < 8
            || !parts[0].eq_ignore_ascii_case("subscriptions")
            || !parts[2].eq_ignore_ascii_case("resourceGroups")
            || !parts[4].eq_ignore_ascii_case("providers")
            || parts.iter().take(8).any(|p| p.is_empty())
        {
            return Err(invalid());
        }
        Ok(Self {
            subscription: parts[1].to_string(),
            resource_group: parts[3].to_string(),
            namespace: parts[5].to_string(),
            resource_type: parts[6].to_string(),
            name: parts[7].to_string(),
        })
    }
}

impl fmt::Display for AzureResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription, self.resource_group, self.namespace, self.resource_type, self.name
        )
    }
}

/// Azure backend
#[derive(Debug, Clone)]
pub struct AzureProvider<C> {
    cli: C,
    location: String,
    resource_group: String,
    virtual_network: String,
    admin_user: String,
}

impl<C: CloudCli> AzureProvider<C> {
    /// Manage VMs in `location` with default group names
    pub fn new(cli: C, location: impl Into<String>) -> Self {
        Self {
            cli,
            location: location.into(),
            resource_group: DEFAULT_GROUP.to_string(),
            virtual_network: DEFAULT_GROUP.to_string(),
            admin_user: "ubuntu".to_string(),
        }
    }

    /// Resource group new VMs are created in
    pub fn resource_group(mut self, group: impl Into<String>) -> Self {
        self.resource_group = group.into();
        self
    }

    /// Virtual network new VMs are attached to
    pub fn virtual_network(mut self, vnet: impl Into<String>) -> Self {
        self.virtual_network = vnet.into();
        self
    }

    /// Login created on new VMs
    pub fn admin_user(mut self, user: impl Into<String>) -> Self {
        self.admin_user = user.into();
        self
    }

    async fn az(&self, parts: &[&str]) -> Result<Value> {
        let mut argv = args(parts);
        argv.extend(args(&["--output", "json"]));
        self.cli.run_json("az", &argv).await
    }

    async fn delete(&self, kind: &[&str], id: &str, confirm: bool) -> Result<()> {
        let mut parts = kind.to_vec();
        parts.extend(["delete", "--ids", id]);
        if confirm {
            parts.push("--yes");
        }
        tracing::debug!(resource = %id, "deleting");
        self.az(&parts).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: CloudCli> CloudProvider for AzureProvider<C> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn region(&self) -> Option<&str> {
        Some(&self.location)
    }

    async fn create(&self, request: &CreateRequest) -> Result<String> {
        let disk_size = request.volume_size_gb.to_string();
        tracing::info!(
            name = %request.name,
            resource_group = %self.resource_group,
            location = %self.location,
            "creating azure vm, this can take a few minutes"
        );
        let out = self
            .az(&[
                "vm",
                "create",
                "--resource-group",
                &self.resource_group,
                "--name",
                &request.name,
                "--location",
                &self.location,
                "--image",
                &request.image,
                "--size",
                &request.instance_type,
                "--os-disk-size-gb",
                &disk_size,
                "--nsg",
                &request.security_group,
                "--vnet-name",
                &self.virtual_network,
                "--subnet",
                "default",
                "--public-ip-sku",
                "Standard",
                "--admin-username",
                &self.admin_user,
                "--ssh-key-name",
                &request.key_name,
            ])
            .await?;
        let id = out
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ProvisionFailure("vm create returned no id".into()))?;
        AzureResourceId::parse(id)?;
        Ok(id.to_string())
    }

    async fn get(&self, id: &str) -> Result<Instance> {
        AzureResourceId::parse(id)?;
        let out = match self.az(&["vm", "show", "-d", "--ids", id]).await {
            Ok(out) => out,
            Err(e) if failed_with(&e, NOT_FOUND) => return Ok(Instance::gone(id)),
            Err(e) => return Err(e),
        };
        Ok(parse_vm(id, &out))
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        let vm_id = AzureResourceId::parse(id)?;
        let vm = match self.az(&["vm", "show", "--ids", id]).await {
            Ok(vm) => vm,
            Err(e) if failed_with(&e, NOT_FOUND) => {
                tracing::warn!(vm = %vm_id.name, "vm already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let nics = ids_at(&vm, "/networkProfile/networkInterfaces", "/id");
        let mut public_ips = Vec::new();
        for nic in &nics {
            let nic = self.az(&["network", "nic", "show", "--ids", nic]).await?;
            public_ips.extend(ids_at(&nic, "/ipConfigurations", "/publicIPAddress/id"));
        }
        let disk = vm
            .pointer("/storageProfile/osDisk/managedDisk/id")
            .and_then(Value::as_str)
            .map(str::to_string);

        tracing::info!(vm = %vm_id.name, resource_group = %vm_id.resource_group, "deleting vm");
        self.delete(&["vm"], id, true).await?;
        for nic in &nics {
            self.delete(&["network", "nic"], nic, false).await?;
        }
        for ip in &public_ips {
            self.delete(&["network", "public-ip"], ip, false).await?;
        }
        if let Some(disk) = &disk {
            self.delete(&["disk"], disk, true).await?;
        }
        Ok(())
    }
}

// Collects `<item><field>` string values from the array at `array`.
fn ids_at(doc: &Value, array: &str, field: &str) -> Vec<String> {
    doc.pointer(array)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.pointer(field).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_vm(id: &str, vm: &Value) -> Instance {
    let text = |key: &str| {
        vm.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let state = text("powerState")
        .or_else(|| text("provisioningState"))
        .unwrap_or_else(|| "unknown".to_string());
    Instance {
        id: id.to_string(),
        state: InstanceState::parse(&state),
        public_dns: text("fqdns").and_then(|f| f.split(',').next().map(str::to_string)),
        public_ip: text("publicIps").and_then(|ips| ips.split(',').next().map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VM: &str = "/subscriptions/0000-1111/resourceGroups/loko/providers/Microsoft.Compute/virtualMachines/shop";

    #[test]
    fn test_parse_resource_id() {
        let id = AzureResourceId::parse(VM).unwrap();
        assert_eq!(id.subscription, "0000-1111");
        assert_eq!(id.resource_group, "loko");
        assert_eq!(id.namespace, "Microsoft.Compute");
        assert_eq!(id.resource_type, "virtualMachines");
        assert_eq!(id.name, "shop");
        assert_eq!(id.to_string(), VM);
    }

    #[test]
    fn test_parse_child_resource_and_case() {
        let id = AzureResourceId::parse(
            "/subscriptions/s/resourcegroups/RG/providers/Microsoft.Network/networkInterfaces/nic1/ipConfigurations/ipconfig1",
        )
        .unwrap();
        assert_eq!(id.resource_group, "RG");
        assert_eq!(id.name, "nic1");
    }

    #[test]
    fn test_reject_invalid_ids() {
        assert!(AzureResourceId::parse("i-0abc").is_err());
        assert!(AzureResourceId::parse("/subscriptions/s/resourceGroups//providers/x/y/z").is_err());
    }

    #[test]
    fn test_parse_vm() {
        let vm = json!({"powerState": "VM running", "publicIps": "20.1.2.3", "fqdns": ""});
        let instance = parse_vm(VM, &vm);
        assert!(instance.state.is_running());
        assert_eq!(instance.address(), Some("20.1.2.3"));

        let deleting = parse_vm(VM, &json!({"powerState": null, "provisioningState": "Deleting"}));
        assert_eq!(deleting.state, InstanceState::Terminated);
    }

    #[test]
    fn test_ids_at() {
        let vm = json!({"networkProfile": {"networkInterfaces": [{"id": "a"}, {"id": "b"}, {}]}});
        assert_eq!(ids_at(&vm, "/networkProfile/networkInterfaces", "/id"), vec!["a", "b"]);
        assert!(ids_at(&vm, "/missing", "/id").is_empty());
    }
}
