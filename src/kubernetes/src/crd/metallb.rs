//! MetalLB custom resources written by the MetalLB backend.
//!
//! These types mirror the resources served by a MetalLB installation; the
//! CRDs themselves are owned by MetalLB, not by this controller.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[kube(group = "metallb.io", version = "v1beta2", kind = "BGPPeer")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct BGPPeerSpec {
    #[serde(rename = "myASN")]
    pub my_asn: u32,
    #[serde(rename = "peerASN")]
    pub peer_asn: u32,
    pub peer_address: String,
    pub hold_time: Option<String>,
    pub keepalive_time: Option<String>,
    pub node_selectors: Option<Vec<NodeSelector>>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    pub match_labels: Option<BTreeMap<String, String>>,
}

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[kube(group = "metallb.io", version = "v1beta1", kind = "IPAddressPool")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressPoolSpec {
    pub addresses: Vec<String>,
    pub auto_assign: Option<bool>,
    #[serde(rename = "avoidBuggyIPs")]
    pub avoid_buggy_ips: Option<bool>,
}

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[kube(group = "metallb.io", version = "v1beta1", kind = "BGPAdvertisement")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct BGPAdvertisementSpec {
    pub ip_address_pools: Option<Vec<String>>,
}
