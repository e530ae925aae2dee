//! Cilium backend: reconciles CiliumBGPPeeringPolicy and
//! CiliumLoadBalancerIPPool resources plus the per-node virtual-router
//! annotation Cilium reads the router id from.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, ResourceExt,
};

use crate::controller::error::Error;
use crate::controller::lb::synthesis::{AddressPool, LoadBalancerConfig, Peer, HOSTNAME_LABEL};
use crate::crd::cilium::{
    CiliumBGPNeighbor, CiliumBGPNeighborGracefulRestart, CiliumBGPPeeringPolicy,
    CiliumBGPPeeringPolicySpec, CiliumBGPVirtualRouter, CiliumLoadBalancerIPPool,
    CiliumLoadBalancerIPPoolBlock, CiliumLoadBalancerIPPoolSpec,
    BGP_VIRTUAL_ROUTER_ANNOTATION_PREFIX,
};

use super::{stale_names, upsert, Backend};

const ROUTER_ID: &str = "router-id=127.0.0.1";
const NEIGHBOR_ADDRESS: &str = "127.0.0.1/32";
const GRACEFUL_RESTART_TIME_SECONDS: i32 = 120;

pub struct CiliumBackend {
    client: Client,
}

impl CiliumBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn policy_name(asn: u32) -> String {
        format!("bgp-{asn}")
    }

    async fn reconcile_policies(&self, peers: &[Peer]) -> Result<(), Error> {
        let api = Api::<CiliumBGPPeeringPolicy>::all(self.client.clone());

        // One policy per ASN, selecting every node announcing that ASN.
        let grouped = group_by_asn(peers);
        let desired: BTreeMap<u32, CiliumBGPPeeringPolicySpec> = grouped
            .iter()
            .map(|(asn, nodes)| (*asn, policy_spec(*asn, nodes)))
            .collect();

        let existing = api.list(&ListParams::default()).await.map_err(Error::Kube)?;
        let existing_names: Vec<String> = existing.iter().map(|p| p.name_any()).collect();
        let desired_names: Vec<String> =
            desired.keys().map(|asn| Self::policy_name(*asn)).collect();

        for name in stale_names(&existing_names, &desired_names) {
            tracing::info!(policy = name, "Delete stale CiliumBGPPeeringPolicy");
            api.delete(&name, &DeleteParams::default())
                .await
                .map_err(Error::Kube)?;
        }

        for (asn, spec) in desired.iter() {
            let name = Self::policy_name(*asn);
            upsert(&api, &name, spec, CiliumBGPPeeringPolicy::new).await?;
        }

        Ok(())
    }

    async fn reconcile_pools(&self, pools: &[AddressPool]) -> Result<(), Error> {
        let api = Api::<CiliumLoadBalancerIPPool>::all(self.client.clone());

        let existing = api.list(&ListParams::default()).await.map_err(Error::Kube)?;
        let existing_names: Vec<String> = existing.iter().map(|p| p.name_any()).collect();
        let desired_names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();

        for name in stale_names(&existing_names, &desired_names) {
            tracing::info!(pool = name, "Delete stale CiliumLoadBalancerIPPool");
            api.delete(&name, &DeleteParams::default())
                .await
                .map_err(Error::Kube)?;
        }

        for pool in pools.iter() {
            upsert(&api, &pool.name, &pool_spec(pool), CiliumLoadBalancerIPPool::new).await?;
        }

        Ok(())
    }

    /// Record the virtual router id on every peering node. Cilium reads the
    /// router id for ASN `n` from `cilium.io/bgp-virtual-router.<n>`.
    async fn annotate_nodes(&self, peers: &[Peer]) -> Result<(), Error> {
        let api = Api::<Node>::all(self.client.clone());

        for peer in peers.iter() {
            let name = match peer.node() {
                Some(name) => name,
                None => continue,
            };
            let key = format!("{}.{}", BGP_VIRTUAL_ROUTER_ANNOTATION_PREFIX, peer.asn);
            let mut node = match api.get_opt(name).await.map_err(Error::Kube)? {
                Some(node) => node,
                None => continue,
            };
            if node.annotations().get(&key).map(|v| v.as_str()) == Some(ROUTER_ID) {
                continue;
            }
            node.annotations_mut()
                .insert(key.clone(), ROUTER_ID.to_string());
            tracing::info!(node = name, annotation = key, "Set virtual router annotation");
            api.replace(name, &PostParams::default(), &node)
                .await
                .map_err(Error::Kube)?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for CiliumBackend {
    #[tracing::instrument(skip_all)]
    async fn reconcile(&self, desired: &LoadBalancerConfig) -> Result<(), Error> {
        self.reconcile_policies(&desired.peers).await?;
        self.reconcile_pools(&desired.address_pools).await?;
        self.annotate_nodes(&desired.peers).await
    }
}

fn group_by_asn(peers: &[Peer]) -> BTreeMap<u32, Vec<String>> {
    let mut grouped: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for peer in peers.iter() {
        if let Some(node) = peer.node() {
            grouped.entry(peer.asn).or_default().push(node.to_string());
        }
    }
    grouped
}

fn policy_spec(asn: u32, nodes: &[String]) -> CiliumBGPPeeringPolicySpec {
    CiliumBGPPeeringPolicySpec {
        node_selector: Some(LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: HOSTNAME_LABEL.to_string(),
                operator: "In".to_string(),
                values: Some(nodes.to_vec()),
            }]),
            ..Default::default()
        }),
        virtual_routers: vec![CiliumBGPVirtualRouter {
            local_asn: asn,
            export_pod_cidr: Some(true),
            // Matches every Service. The key is never set, so NotIn selects all.
            service_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: "somekey".to_string(),
                    operator: "NotIn".to_string(),
                    values: Some(vec!["ignore".to_string()]),
                }]),
                ..Default::default()
            }),
            neighbors: vec![CiliumBGPNeighbor {
                peer_address: NEIGHBOR_ADDRESS.to_string(),
                peer_asn: asn,
                graceful_restart: Some(CiliumBGPNeighborGracefulRestart {
                    enabled: true,
                    restart_time_seconds: Some(GRACEFUL_RESTART_TIME_SECONDS),
                }),
            }],
        }],
    }
}

fn pool_spec(pool: &AddressPool) -> CiliumLoadBalancerIPPoolSpec {
    CiliumLoadBalancerIPPoolSpec {
        blocks: Some(
            pool.cidrs
                .iter()
                .map(|cidr| CiliumLoadBalancerIPPoolBlock { cidr: cidr.clone() })
                .collect(),
        ),
        disabled: None,
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::str::FromStr;

    use super::*;
    use crate::controller::lb::synthesis::Protocol;

    fn test_peer(asn: u32, node: &str, address: &str) -> Peer {
        Peer {
            my_asn: asn,
            asn,
            address: IpAddr::from_str(address).unwrap(),
            node_selector: BTreeMap::from([(HOSTNAME_LABEL.to_string(), node.to_string())]),
        }
    }

    #[test]
    fn works_policy_per_asn() {
        let peers = vec![
            test_peer(4200000001, "node-a", "10.1.0.1"),
            test_peer(4200000001, "node-b", "10.1.0.2"),
            test_peer(4200000002, "node-c", "10.1.0.3"),
        ];
        let grouped = group_by_asn(&peers);
        assert_eq!(grouped.len(), 2);
        assert_eq!(
            grouped.get(&4200000001),
            Some(&vec!["node-a".to_string(), "node-b".to_string()])
        );

        let spec = policy_spec(4200000001, grouped.get(&4200000001).unwrap());
        assert_eq!(spec.virtual_routers.len(), 1);
        let vr = &spec.virtual_routers[0];
        assert_eq!(vr.local_asn, 4200000001);
        assert_eq!(vr.export_pod_cidr, Some(true));
        assert_eq!(vr.neighbors[0].peer_address, "127.0.0.1/32");
        assert_eq!(vr.neighbors[0].peer_asn, 4200000001);
        assert!(vr.neighbors[0].graceful_restart.as_ref().unwrap().enabled);
        let selector = vr.service_selector.as_ref().unwrap();
        let expr = &selector.match_expressions.as_ref().unwrap()[0];
        assert_eq!(expr.operator, "NotIn");
    }

    #[test]
    fn works_pool_blocks_mapping() {
        let pool = AddressPool {
            name: "internet-ephemeral".to_string(),
            protocol: Protocol::Bgp,
            auto_assign: false,
            cidrs: vec!["84.1.1.1/32".to_string()],
        };
        let spec = pool_spec(&pool);
        let blocks = spec.blocks.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].cidr, "84.1.1.1/32");
    }
}
