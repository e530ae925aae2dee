//! Cilium custom resources written by the Cilium backend.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-node annotation prefix carrying the virtual router id for an ASN.
/// The full key is `cilium.io/bgp-virtual-router.<asn>`.
pub const BGP_VIRTUAL_ROUTER_ANNOTATION_PREFIX: &str = "cilium.io/bgp-virtual-router";

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[kube(group = "cilium.io", version = "v2alpha1", kind = "CiliumBGPPeeringPolicy")]
#[serde(rename_all = "camelCase")]
pub struct CiliumBGPPeeringPolicySpec {
    pub node_selector: Option<LabelSelector>,
    pub virtual_routers: Vec<CiliumBGPVirtualRouter>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CiliumBGPVirtualRouter {
    #[serde(rename = "localASN")]
    pub local_asn: u32,
    #[serde(rename = "exportPodCIDR")]
    pub export_pod_cidr: Option<bool>,
    pub service_selector: Option<LabelSelector>,
    pub neighbors: Vec<CiliumBGPNeighbor>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CiliumBGPNeighbor {
    pub peer_address: String,
    #[serde(rename = "peerASN")]
    pub peer_asn: u32,
    pub graceful_restart: Option<CiliumBGPNeighborGracefulRestart>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CiliumBGPNeighborGracefulRestart {
    pub enabled: bool,
    pub restart_time_seconds: Option<i32>,
}

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[kube(group = "cilium.io", version = "v2alpha1", kind = "CiliumLoadBalancerIPPool")]
#[serde(rename_all = "camelCase")]
pub struct CiliumLoadBalancerIPPoolSpec {
    pub blocks: Option<Vec<CiliumLoadBalancerIPPoolBlock>>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CiliumLoadBalancerIPPoolBlock {
    pub cidr: String,
}
