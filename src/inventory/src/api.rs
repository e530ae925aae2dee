//! Inventory trait for mocking
//!
//! The concrete HTTP client implements this trait; tests run against the
//! in-memory mock implementation.

use crate::error::InventoryError;
use crate::model::{Ip, IpAllocateRequest, IpFindRequest, IpUpdateRequest};

#[async_trait::async_trait]
pub trait Inventory: Send + Sync {
    /// Search IPs by project, address and/or tags.
    async fn find_ips(&self, req: &IpFindRequest) -> Result<Vec<Ip>, InventoryError>;

    /// Get a single IP by address.
    async fn get_ip(&self, address: &str) -> Result<Ip, InventoryError>;

    /// Allocate a new address from the given network.
    async fn allocate_ip(&self, req: IpAllocateRequest) -> Result<Ip, InventoryError>;

    /// Replace the tag set of an existing IP.
    async fn update_ip(&self, req: IpUpdateRequest) -> Result<Ip, InventoryError>;

    /// Release an address back to its network.
    async fn free_ip(&self, address: &str) -> Result<(), InventoryError>;
}
