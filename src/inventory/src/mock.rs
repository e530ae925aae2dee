//! In-memory Inventory implementation for unit tests.
//!
//! Stores IPs in memory. Networks must be seeded with available addresses
//! before `allocate_ip` can hand any out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::Inventory;
use crate::error::InventoryError;
use crate::model::{Ip, IpAllocateRequest, IpFindRequest, IpType, IpUpdateRequest};

#[derive(Clone, Default)]
pub struct MockInventory {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    ips: HashMap<String, Ip>,
    available: HashMap<String, Vec<String>>,
    allocated: Vec<String>,
    freed: Vec<String>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip(self, ip: Ip) -> Self {
        self.state
            .lock()
            .unwrap()
            .ips
            .insert(ip.address.clone(), ip);
        self
    }

    pub fn with_available(self, network: &str, addresses: &[&str]) -> Self {
        self.state.lock().unwrap().available.insert(
            network.to_string(),
            addresses.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    /// Snapshot of all stored IPs, sorted by address.
    pub fn ips(&self) -> Vec<Ip> {
        let state = self.state.lock().unwrap();
        let mut ips: Vec<Ip> = state.ips.values().cloned().collect();
        ips.sort_by(|a, b| a.address.cmp(&b.address));
        ips
    }

    pub fn allocations(&self) -> Vec<String> {
        self.state.lock().unwrap().allocated.clone()
    }

    pub fn freed(&self) -> Vec<String> {
        self.state.lock().unwrap().freed.clone()
    }
}

#[async_trait::async_trait]
impl Inventory for MockInventory {
    async fn find_ips(&self, req: &IpFindRequest) -> Result<Vec<Ip>, InventoryError> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<Ip> = state
            .ips
            .values()
            .filter(|ip| match &req.project {
                Some(project) => ip.project.eq(project),
                None => true,
            })
            .filter(|ip| match &req.address {
                Some(address) => ip.address.eq(address),
                None => true,
            })
            .filter(|ip| match &req.network {
                Some(network) => ip.network.as_ref().map(|n| n.eq(network)).unwrap_or(false),
                None => true,
            })
            .filter(|ip| req.tags.iter().all(|t| ip.tags.contains(t)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(found)
    }

    async fn get_ip(&self, address: &str) -> Result<Ip, InventoryError> {
        self.state
            .lock()
            .unwrap()
            .ips
            .get(address)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(address.to_string()))
    }

    async fn allocate_ip(&self, req: IpAllocateRequest) -> Result<Ip, InventoryError> {
        let mut state = self.state.lock().unwrap();
        let address = state
            .available
            .get_mut(&req.network)
            .and_then(|addresses| {
                if addresses.is_empty() {
                    None
                } else {
                    Some(addresses.remove(0))
                }
            })
            .ok_or_else(|| InventoryError::Api(format!("network {} exhausted", req.network)))?;
        let ip = Ip {
            address: address.clone(),
            network: Some(req.network),
            project: req.project,
            ip_type: req.ip_type,
            tags: req.tags,
            name: req.name,
            description: req.description,
        };
        state.ips.insert(address.clone(), ip.clone());
        state.allocated.push(address);
        Ok(ip)
    }

    async fn update_ip(&self, req: IpUpdateRequest) -> Result<Ip, InventoryError> {
        let mut state = self.state.lock().unwrap();
        let ip = state
            .ips
            .get_mut(&req.address)
            .ok_or_else(|| InventoryError::NotFound(req.address.clone()))?;
        ip.tags = req.tags;
        Ok(ip.clone())
    }

    async fn free_ip(&self, address: &str) -> Result<(), InventoryError> {
        let mut state = self.state.lock().unwrap();
        let ip = state
            .ips
            .remove(address)
            .ok_or_else(|| InventoryError::NotFound(address.to_string()))?;
        if ip.ip_type == IpType::Static {
            return Err(InventoryError::InvalidRequest(format!(
                "static address {address} cannot be freed"
            )));
        }
        state.freed.push(address.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocates_from_seeded_network_only() {
        let mock = MockInventory::new().with_available("internet", &["84.1.1.1"]);
        let req = IpAllocateRequest {
            network: "internet".to_string(),
            project: "project-a".to_string(),
            ip_type: IpType::Ephemeral,
            tags: vec![],
            name: None,
            description: None,
        };
        let ip = mock.allocate_ip(req.clone()).await.unwrap();
        assert_eq!(ip.address, "84.1.1.1");
        assert!(mock.allocate_ip(req).await.is_err());
    }

    #[tokio::test]
    async fn find_filters_by_tag() {
        let mock = MockInventory::new()
            .with_ip(Ip {
                address: "84.1.1.1".to_string(),
                network: Some("internet".to_string()),
                project: "project-a".to_string(),
                ip_type: IpType::Ephemeral,
                tags: vec!["t1".to_string()],
                name: None,
                description: None,
            })
            .with_ip(Ip {
                address: "84.1.1.2".to_string(),
                network: Some("internet".to_string()),
                project: "project-a".to_string(),
                ip_type: IpType::Ephemeral,
                tags: vec!["t2".to_string()],
                name: None,
                description: None,
            });
        let found = mock
            .find_ips(&IpFindRequest {
                tags: vec!["t1".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "84.1.1.1");
    }
}
