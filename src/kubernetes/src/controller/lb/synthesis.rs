//! Synthesizes the canonical load balancer configuration from the cluster's
//! inventory IPs and its current node set.
//!
//! This is a pure computation. The first error aborts the whole pass so a
//! backend never sees a partially computed config.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::Serialize;

use stahld_inventory::model::{Ip, IpType};

use crate::controller::error::Error;

/// Node label carrying the ASN announced by the node's BGP speaker.
pub const ASN_LABEL: &str = "node.stahl.io/asn";
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Bgp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressPool {
    pub name: String,
    pub protocol: Protocol,
    pub auto_assign: bool,
    pub cidrs: Vec<String>,
}

impl AddressPool {
    fn new(network: &str, ip_type: IpType) -> Self {
        Self {
            name: pool_name(network, ip_type),
            protocol: Protocol::Bgp,
            auto_assign: false,
            cidrs: Vec::new(),
        }
    }

    fn append(&mut self, address: &str) -> Result<(), Error> {
        let addr = IpAddr::from_str(address).map_err(|_| Error::InvalidAddress)?;
        let prefix_len = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let cidr = IpNet::new(addr, prefix_len)
            .map_err(|_| Error::InvalidAddress)?
            .to_string();
        if !self.cidrs.contains(&cidr) {
            self.cidrs.push(cidr);
        }
        Ok(())
    }
}

pub fn pool_name(network: &str, ip_type: IpType) -> String {
    format!("{}-{}", network.to_lowercase(), ip_type)
}

/// One BGP session descriptor per node. The node announces its own ASN, so
/// both sides of the session carry the same number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub my_asn: u32,
    pub asn: u32,
    pub address: IpAddr,
    pub node_selector: BTreeMap<String, String>,
}

impl Peer {
    /// The hostname this peer's selector matches.
    pub fn node(&self) -> Option<&str> {
        self.node_selector.get(HOSTNAME_LABEL).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerConfig {
    pub address_pools: Vec<AddressPool>,
    // Always an explicit sequence. Downstream serialization distinguishes
    // "no peers" from "field omitted".
    pub peers: Vec<Peer>,
}

pub fn synthesize(
    ips: &[Ip],
    networks: &HashSet<String>,
    nodes: &[Node],
) -> Result<LoadBalancerConfig, Error> {
    let mut pools: BTreeMap<String, AddressPool> = BTreeMap::new();
    for ip in ips {
        let network = ip
            .network
            .as_deref()
            .ok_or_else(|| Error::MissingNetwork(ip.address.clone()))?;
        if !networks.contains(network) {
            continue;
        }
        let pool = pools
            .entry(pool_name(network, ip.ip_type))
            .or_insert_with(|| AddressPool::new(network, ip.ip_type));
        pool.append(&ip.address)?;
    }

    let mut peers = Vec::new();
    for node in nodes {
        let asn = get_asn(node)?;
        let address = get_internal_address(node)?;
        peers.push(Peer {
            my_asn: asn,
            asn,
            address,
            node_selector: BTreeMap::from([(HOSTNAME_LABEL.to_string(), node.name_any())]),
        });
    }

    Ok(LoadBalancerConfig {
        address_pools: pools.into_values().collect(),
        peers,
    })
}

fn get_asn(node: &Node) -> Result<u32, Error> {
    node.labels()
        .get(ASN_LABEL)
        .ok_or(Error::AsnNotFound)?
        .parse()
        .map_err(|_| Error::InvalidAsnValue)
}

fn get_internal_address(node: &Node) -> Result<IpAddr, Error> {
    node.status
        .as_ref()
        .ok_or_else(|| Error::FailedToGetData("node.status".to_string()))?
        .addresses
        .as_ref()
        .ok_or_else(|| Error::FailedToGetData("node.status.addresses".to_string()))?
        .iter()
        .find(|na| na.type_.eq("InternalIP"))
        .ok_or(Error::AddressNotFound)?
        .address
        .parse()
        .map_err(|_| Error::InvalidAddress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::reconciler::{test_ip, test_node};
    use rstest::rstest;

    fn networks(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[rstest(
        address,
        expected,
        case("84.1.1.1", "84.1.1.1/32"),
        case("2001::a:b:c", "2001::a:b:c/128")
    )]
    fn works_host_cidr(address: &str, expected: &str) {
        let ips = vec![test_ip(address, Some("internet"), IpType::Ephemeral, &[])];
        let config = synthesize(&ips, &networks(&["internet"]), &[]).unwrap();
        assert_eq!(config.address_pools.len(), 1);
        assert_eq!(config.address_pools[0].cidrs, vec![expected.to_string()]);
    }

    #[test]
    fn works_pool_partitioning_by_network_and_type() {
        let ips = vec![
            test_ip("84.1.1.1", Some("internet"), IpType::Ephemeral, &[]),
            test_ip("84.1.1.2", Some("internet"), IpType::Ephemeral, &[]),
            test_ip("84.1.1.3", Some("internet"), IpType::Static, &[]),
        ];
        let config = synthesize(&ips, &networks(&["internet", "storage"]), &[]).unwrap();
        assert_eq!(config.address_pools.len(), 2);
        assert_eq!(config.address_pools[0].name, "internet-ephemeral");
        assert_eq!(
            config.address_pools[0].cidrs,
            vec!["84.1.1.1/32".to_string(), "84.1.1.2/32".to_string()]
        );
        assert_eq!(config.address_pools[1].name, "internet-static");
        assert_eq!(config.address_pools[1].cidrs, vec!["84.1.1.3/32".to_string()]);
        for pool in config.address_pools.iter() {
            assert!(!pool.auto_assign);
            assert_eq!(pool.protocol, Protocol::Bgp);
        }
    }

    #[test]
    fn works_pool_name_is_lowercased() {
        let ips = vec![test_ip("84.1.1.1", Some("Internet"), IpType::Ephemeral, &[])];
        let config = synthesize(&ips, &networks(&["Internet"]), &[]).unwrap();
        assert_eq!(config.address_pools[0].name, "internet-ephemeral");
    }

    #[test]
    fn works_duplicate_addresses_are_deduplicated() {
        let ips = vec![
            test_ip("84.1.1.1", Some("internet"), IpType::Ephemeral, &[]),
            test_ip("84.1.1.1", Some("internet"), IpType::Ephemeral, &[]),
        ];
        let config = synthesize(&ips, &networks(&["internet"]), &[]).unwrap();
        assert_eq!(config.address_pools[0].cidrs, vec!["84.1.1.1/32".to_string()]);
    }

    #[test]
    fn works_unattached_network_is_skipped() {
        let ips = vec![
            test_ip("84.1.1.1", Some("internet"), IpType::Ephemeral, &[]),
            test_ip("10.0.0.1", Some("underlay"), IpType::Ephemeral, &[]),
        ];
        let config = synthesize(&ips, &networks(&["internet"]), &[]).unwrap();
        assert_eq!(config.address_pools.len(), 1);
        assert_eq!(config.address_pools[0].name, "internet-ephemeral");
    }

    #[test]
    fn missing_network_fails_without_partial_output() {
        let ips = vec![
            test_ip("84.1.1.1", Some("internet"), IpType::Ephemeral, &[]),
            test_ip("84.1.1.2", None, IpType::Ephemeral, &[]),
        ];
        let res = synthesize(&ips, &networks(&["internet"]), &[]);
        assert!(matches!(res, Err(Error::MissingNetwork(_))));
    }

    #[test]
    fn unparsable_address_fails() {
        let ips = vec![test_ip("84.1.1", Some("internet"), IpType::Ephemeral, &[])];
        let res = synthesize(&ips, &networks(&["internet"]), &[]);
        assert!(matches!(res, Err(Error::InvalidAddress)));
    }

    #[test]
    fn works_idempotent_synthesis() {
        let ips = vec![
            test_ip("84.1.1.1", Some("internet"), IpType::Ephemeral, &[]),
            test_ip("84.1.1.3", Some("internet"), IpType::Static, &[]),
        ];
        let nodes = vec![test_node("node-a", "4200000001", "10.1.0.1")];
        let first = synthesize(&ips, &networks(&["internet"]), &nodes).unwrap();
        let second = synthesize(&ips, &networks(&["internet"]), &nodes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn works_peer_per_node() {
        let nodes = vec![
            test_node("node-a", "4200000001", "10.1.0.1"),
            test_node("node-b", "4200000002", "10.1.0.2"),
        ];
        let config = synthesize(&[], &networks(&["internet"]), &nodes).unwrap();
        assert_eq!(config.peers.len(), 2);
        let peer = &config.peers[0];
        assert_eq!(peer.my_asn, 4200000001);
        assert_eq!(peer.asn, 4200000001);
        assert_eq!(peer.address, "10.1.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(peer.node(), Some("node-a"));
    }

    #[test]
    fn works_no_nodes_yields_explicit_empty_peers() {
        let config = synthesize(&[], &networks(&["internet"]), &[]).unwrap();
        assert!(config.peers.is_empty());
    }

    #[test]
    fn missing_asn_label_aborts_peer_computation() {
        let mut node = test_node("node-a", "4200000001", "10.1.0.1");
        node.metadata.labels = Some(std::collections::BTreeMap::from([(
            HOSTNAME_LABEL.to_string(),
            "node-a".to_string(),
        )]));
        let res = synthesize(&[], &networks(&["internet"]), &[node]);
        assert!(matches!(res, Err(Error::AsnNotFound)));
    }

    #[test]
    fn invalid_asn_label_aborts_peer_computation() {
        let node = test_node("node-a", "not-a-number", "10.1.0.1");
        let res = synthesize(&[], &networks(&["internet"]), &[node]);
        assert!(matches!(res, Err(Error::InvalidAsnValue)));
    }
}
