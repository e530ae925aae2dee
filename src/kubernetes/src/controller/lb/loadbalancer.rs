//! The per-Service load balancer contract: acquire and release externally
//! reachable addresses and keep the data plane configuration in sync.

use std::collections::HashSet;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service, ServiceSpec};
use kube::{api::PostParams, Api, Client, ResourceExt};
use tokio::sync::Mutex;

use stahld_inventory::{
    api::Inventory,
    model::{Ip, IpAllocateRequest, IpFindRequest, IpType, IpUpdateRequest},
    tag,
};

use crate::{
    backoff::{retry, Backoff},
    controller::{config::Config, error::Error},
    util::{get_namespace, get_namespaced_name},
};

use super::backend::Backend;
use super::synthesis::synthesize;

/// Overrides the network a Service's address is allocated from. The pool a
/// Service lands in follows from `(network, type)`.
pub const SERVICE_NETWORK_ANNOTATION: &str = "service.stahl.io/network";

const LB_IP_PATCH_ATTEMPTS: u32 = 5;

pub struct LoadBalancerController {
    client: Client,
    inventory: Arc<dyn Inventory>,
    backend: Arc<dyn Backend>,
    cluster_id: String,
    project_id: String,
    default_network: String,
    networks: HashSet<String>,
    tag_backoff: Backoff,
    // Guards single-IP tag updates: fixed-IP association and untag/free.
    ip_tag_lock: Mutex<()>,
    // Guards the whole acquire -> patch -> reconcile sequence so concurrent
    // Ensure calls cannot race on the cluster-wide IP snapshot.
    allocation_lock: Mutex<()>,
    // Guards backend reconciliation against overlapping garbage collection.
    config_lock: Mutex<()>,
}

impl LoadBalancerController {
    pub fn new(
        client: Client,
        inventory: Arc<dyn Inventory>,
        backend: Arc<dyn Backend>,
        config: &Config,
    ) -> Self {
        let mut networks: HashSet<String> =
            config.additional_networks.iter().cloned().collect();
        networks.insert(config.default_external_network.clone());
        Self {
            client,
            inventory,
            backend,
            cluster_id: config.cluster_id.clone(),
            project_id: config.project_id.clone(),
            default_network: config.default_external_network.clone(),
            networks,
            tag_backoff: Backoff::default(),
            ip_tag_lock: Mutex::new(()),
            allocation_lock: Mutex::new(()),
            config_lock: Mutex::new(()),
        }
    }

    /// Existence and status are derived solely from the Service's ingress
    /// entries. No inventory call is made.
    pub fn get_load_balancer(&self, svc: &Service) -> Option<LoadBalancerStatus> {
        let ingress = svc.status.as_ref()?.load_balancer.as_ref()?.ingress.as_ref()?;
        if ingress.is_empty() {
            return None;
        }
        Some(LoadBalancerStatus {
            ingress: Some(ingress.clone()),
        })
    }

    #[tracing::instrument(skip_all, fields(service = %get_namespaced_name(svc)))]
    pub async fn ensure_load_balancer(
        &self,
        svc: &Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus, Error> {
        if let Some(fixed) = svc.spec.as_ref().and_then(|s| s.load_balancer_ip.clone()) {
            return self.associate_fixed_ip(svc, &fixed).await;
        }

        // Acquisition is idempotent. A Service already carrying an ingress
        // address never gets a second allocation.
        if let Some(status) = self.get_load_balancer(svc) {
            return Ok(status);
        }

        let _guard = self.allocation_lock.lock().await;

        let ns = get_namespace(svc).map_err(Error::KubeLibrary)?;
        let network = self.target_network(svc);
        let service_tag = tag::service_tag(&self.cluster_id, &ns, &svc.name_any());
        let ip = self
            .inventory
            .allocate_ip(IpAllocateRequest {
                network: network.clone(),
                project: self.project_id.clone(),
                ip_type: IpType::Ephemeral,
                tags: vec![service_tag],
                name: Some(format!("{ns}-{}", svc.name_any())),
                description: None,
            })
            .await
            .map_err(Error::Inventory)?;

        tracing::info!(
            address = ip.address,
            network = network,
            "Allocated ephemeral address"
        );

        if let Err(e) = self.commit_allocation(svc, &ip, nodes).await {
            self.rollback_allocation(&ip).await;
            return Err(e);
        }

        Ok(ingress_status(&ip.address))
    }

    /// Re-synthesize and reconcile the configuration for the current node
    /// set. Performs no IP mutation.
    pub async fn update_load_balancer(&self, nodes: &[Node]) -> Result<(), Error> {
        self.reconcile_config(nodes).await
    }

    /// Strip this Service's ownership tag from every inventory IP carrying
    /// it and free ephemeral addresses that become unowned. Deliberately
    /// triggers no config reconciliation; the periodic resync converges the
    /// data plane.
    #[tracing::instrument(skip_all, fields(service = %get_namespaced_name(svc)))]
    pub async fn ensure_load_balancer_deleted(&self, svc: &Service) -> Result<(), Error> {
        let ns = get_namespace(svc).map_err(Error::KubeLibrary)?;
        let service_tag = tag::service_tag(&self.cluster_id, &ns, &svc.name_any());

        let owned = self
            .inventory
            .find_ips(&IpFindRequest {
                project: Some(self.project_id.clone()),
                tags: vec![service_tag.clone()],
                ..Default::default()
            })
            .await
            .map_err(Error::Inventory)?;

        for ip in owned.iter() {
            let _guard = self.ip_tag_lock.lock().await;
            retry(&self.tag_backoff, || {
                let inventory = self.inventory.clone();
                let address = ip.address.clone();
                let service_tag = service_tag.clone();
                async move {
                    let fresh = inventory.get_ip(&address).await?;
                    let (remaining, last) = tag::remove_tag(&fresh.tags, &service_tag);
                    if remaining.len() != fresh.tags.len() {
                        inventory
                            .update_ip(IpUpdateRequest {
                                address: fresh.address.clone(),
                                tags: remaining,
                            })
                            .await?;
                    }
                    if last && fresh.ip_type == IpType::Ephemeral {
                        tracing::info!(address = fresh.address, "Free unowned ephemeral address");
                        inventory.free_ip(&fresh.address).await?;
                    }
                    Ok(())
                }
            })
            .await
            .map_err(Error::Inventory)?;
        }

        Ok(())
    }

    /// Associate a user-requested fixed address with the Service. The
    /// allocation path is skipped entirely.
    async fn associate_fixed_ip(
        &self,
        svc: &Service,
        address: &str,
    ) -> Result<LoadBalancerStatus, Error> {
        let _guard = self.ip_tag_lock.lock().await;

        let ip = self
            .inventory
            .get_ip(address)
            .await
            .map_err(Error::Inventory)?;
        if ip.tags.iter().any(|t| tag::is_machine_tag(t)) {
            return Err(Error::IpOwnedByMachine(ip.address));
        }
        if ip.tags.iter().any(|t| tag::is_egress_tag(t)) {
            return Err(Error::IpReservedForEgress(ip.address));
        }

        let ns = get_namespace(svc).map_err(Error::KubeLibrary)?;
        let service_tag = tag::service_tag(&self.cluster_id, &ns, &svc.name_any());
        if !ip.tags.contains(&service_tag) {
            let mut tags = ip.tags.clone();
            tags.push(service_tag);
            self.inventory
                .update_ip(IpUpdateRequest {
                    address: ip.address.clone(),
                    tags,
                })
                .await
                .map_err(Error::Inventory)?;
            tracing::info!(address = ip.address, "Associated fixed address");
        }

        Ok(ingress_status(&ip.address))
    }

    async fn commit_allocation(
        &self,
        svc: &Service,
        ip: &Ip,
        nodes: &[Node],
    ) -> Result<(), Error> {
        self.patch_load_balancer_ip(svc, &ip.address).await?;
        self.reconcile_config(nodes).await
    }

    /// Undo a partial allocation. Secondary failures are logged only; the
    /// caller's original error is the one that surfaces.
    async fn rollback_allocation(&self, ip: &Ip) {
        if let Err(e) = self
            .inventory
            .update_ip(IpUpdateRequest {
                address: ip.address.clone(),
                tags: Vec::new(),
            })
            .await
        {
            tracing::error!(error = %e, address = ip.address, "Rollback failed to strip tags");
        }
        if let Err(e) = self.inventory.free_ip(&ip.address).await {
            tracing::error!(error = %e, address = ip.address, "Rollback failed to free address");
        } else {
            tracing::warn!(address = ip.address, "Rolled back address allocation");
        }
    }

    /// Write the allocated address into `spec.loadBalancerIP` with a bounded
    /// optimistic-concurrency retry.
    async fn patch_load_balancer_ip(&self, svc: &Service, address: &str) -> Result<(), Error> {
        let ns = get_namespace(svc).map_err(Error::KubeLibrary)?;
        let api = Api::<Service>::namespaced(self.client.clone(), &ns);

        for _ in 0..LB_IP_PATCH_ATTEMPTS {
            let mut current = api.get(&svc.name_any()).await.map_err(Error::Kube)?;
            match current.spec.as_mut() {
                Some(spec) => {
                    if spec.load_balancer_ip.as_deref() == Some(address) {
                        return Ok(());
                    }
                    spec.load_balancer_ip = Some(address.to_string());
                }
                None => {
                    current.spec = Some(ServiceSpec {
                        load_balancer_ip: Some(address.to_string()),
                        ..Default::default()
                    });
                }
            }
            match api
                .replace(&svc.name_any(), &PostParams::default(), &current)
                .await
            {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    tracing::warn!(
                        service = svc.name_any(),
                        "Conflict on loadBalancerIP update, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(Error::Kube(e)),
            }
        }

        Err(Error::TooManyConflicts)
    }

    /// Full pass: snapshot the cluster's owned IPs, synthesize the desired
    /// config and hand it to the backend.
    async fn reconcile_config(&self, nodes: &[Node]) -> Result<(), Error> {
        let _guard = self.config_lock.lock().await;

        let ips = self
            .inventory
            .find_ips(&IpFindRequest {
                project: Some(self.project_id.clone()),
                ..Default::default()
            })
            .await
            .map_err(Error::Inventory)?;
        let owned: Vec<Ip> = ips
            .into_iter()
            .filter(|ip| {
                ip.tags
                    .iter()
                    .any(|t| tag::is_cluster_service_tag(t, &self.cluster_id))
            })
            .collect();

        let desired = synthesize(&owned, &self.networks, nodes)?;
        tracing::info!(
            pools = desired.address_pools.len(),
            peers = desired.peers.len(),
            "Reconcile load balancer config"
        );
        self.backend.reconcile(&desired).await
    }

    fn target_network(&self, svc: &Service) -> String {
        svc.annotations()
            .get(SERVICE_NETWORK_ANNOTATION)
            .cloned()
            .unwrap_or_else(|| self.default_network.clone())
    }
}

fn ingress_status(address: &str) -> LoadBalancerStatus {
    LoadBalancerStatus {
        ingress: Some(vec![LoadBalancerIngress {
            ip: Some(address.to_string()),
            ..Default::default()
        }]),
    }
}
