//! MetalLB backend: reconciles BGPPeer, IPAddressPool and BGPAdvertisement
//! resources in the MetalLB namespace.

use std::collections::BTreeMap;

use kube::{
    api::{DeleteParams, ListParams},
    Api, Client, ResourceExt,
};

use crate::controller::error::Error;
use crate::controller::lb::synthesis::{AddressPool, LoadBalancerConfig, Peer};
use crate::crd::metallb::{
    BGPAdvertisement, BGPAdvertisementSpec, BGPPeer, BGPPeerSpec, IPAddressPool, IPAddressPoolSpec,
    NodeSelector,
};

use super::{stale_names, upsert, Backend};

const PEER_HOLD_TIME: &str = "90s";
const PEER_KEEPALIVE_TIME: &str = "0s";

pub struct MetalLbBackend {
    client: Client,
    namespace: String,
}

impl MetalLbBackend {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    fn peer_name(asn: u32) -> String {
        format!("peer-{asn}")
    }

    async fn reconcile_peers(&self, peers: &[Peer]) -> Result<(), Error> {
        let api = Api::<BGPPeer>::namespaced(self.client.clone(), &self.namespace);

        // A peer's identity is its ASN. Nodes sharing an ASN collapse into
        // one session descriptor.
        let desired: BTreeMap<u32, BGPPeerSpec> =
            peers.iter().map(|p| (p.asn, peer_spec(p))).collect();

        let existing = api.list(&ListParams::default()).await.map_err(Error::Kube)?;
        let existing_names: Vec<String> = existing.iter().map(|p| p.name_any()).collect();
        let desired_names: Vec<String> =
            desired.keys().map(|asn| Self::peer_name(*asn)).collect();

        for name in stale_names(&existing_names, &desired_names) {
            tracing::info!(peer = name, "Delete stale BGPPeer");
            api.delete(&name, &DeleteParams::default())
                .await
                .map_err(Error::Kube)?;
        }

        for (asn, spec) in desired.iter() {
            let name = Self::peer_name(*asn);
            upsert(&api, &name, spec, BGPPeer::new).await?;
        }

        Ok(())
    }

    async fn reconcile_pools(&self, pools: &[AddressPool]) -> Result<(), Error> {
        let api = Api::<IPAddressPool>::namespaced(self.client.clone(), &self.namespace);

        let existing = api.list(&ListParams::default()).await.map_err(Error::Kube)?;
        let existing_names: Vec<String> = existing.iter().map(|p| p.name_any()).collect();
        let desired_names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();

        for name in stale_names(&existing_names, &desired_names) {
            tracing::info!(pool = name, "Delete stale IPAddressPool");
            api.delete(&name, &DeleteParams::default())
                .await
                .map_err(Error::Kube)?;
        }

        for pool in pools.iter() {
            upsert(&api, &pool.name, &pool_spec(pool), IPAddressPool::new).await?;
        }

        Ok(())
    }

    async fn reconcile_advertisements(&self, pools: &[AddressPool]) -> Result<(), Error> {
        let api = Api::<BGPAdvertisement>::namespaced(self.client.clone(), &self.namespace);

        let existing = api.list(&ListParams::default()).await.map_err(Error::Kube)?;
        let existing_names: Vec<String> = existing.iter().map(|a| a.name_any()).collect();
        let desired_names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();

        for name in stale_names(&existing_names, &desired_names) {
            tracing::info!(advertisement = name, "Delete stale BGPAdvertisement");
            api.delete(&name, &DeleteParams::default())
                .await
                .map_err(Error::Kube)?;
        }

        // One advertisement per pool so every pool's addresses are announced.
        for pool in pools.iter() {
            let spec = BGPAdvertisementSpec {
                ip_address_pools: Some(vec![pool.name.clone()]),
            };
            upsert(&api, &pool.name, &spec, BGPAdvertisement::new).await?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for MetalLbBackend {
    #[tracing::instrument(skip_all)]
    async fn reconcile(&self, desired: &LoadBalancerConfig) -> Result<(), Error> {
        self.reconcile_peers(&desired.peers).await?;
        self.reconcile_pools(&desired.address_pools).await?;
        self.reconcile_advertisements(&desired.address_pools).await
    }
}

fn peer_spec(peer: &Peer) -> BGPPeerSpec {
    BGPPeerSpec {
        my_asn: peer.my_asn,
        peer_asn: peer.asn,
        peer_address: peer.address.to_string(),
        hold_time: Some(PEER_HOLD_TIME.to_string()),
        keepalive_time: Some(PEER_KEEPALIVE_TIME.to_string()),
        node_selectors: Some(vec![NodeSelector {
            match_labels: Some(peer.node_selector.clone()),
        }]),
    }
}

fn pool_spec(pool: &AddressPool) -> IPAddressPoolSpec {
    IPAddressPoolSpec {
        addresses: pool.cidrs.clone(),
        auto_assign: Some(pool.auto_assign),
        avoid_buggy_ips: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::net::IpAddr;
    use std::str::FromStr;

    use crate::controller::lb::synthesis::{Protocol, HOSTNAME_LABEL};

    #[test]
    fn works_peer_spec_mapping() {
        let peer = Peer {
            my_asn: 4200000001,
            asn: 4200000001,
            address: IpAddr::from_str("10.1.0.1").unwrap(),
            node_selector: BTreeMap::from([(
                HOSTNAME_LABEL.to_string(),
                "node-a".to_string(),
            )]),
        };
        let spec = peer_spec(&peer);
        assert_eq!(spec.my_asn, 4200000001);
        assert_eq!(spec.peer_asn, 4200000001);
        assert_eq!(spec.peer_address, "10.1.0.1");
        assert_eq!(spec.hold_time.as_deref(), Some("90s"));
        assert_eq!(spec.keepalive_time.as_deref(), Some("0s"));
        let selectors = spec.node_selectors.unwrap();
        assert_eq!(
            selectors[0].match_labels.as_ref().unwrap().get(HOSTNAME_LABEL),
            Some(&"node-a".to_string())
        );
    }

    #[test]
    fn works_pool_spec_mapping() {
        let pool = AddressPool {
            name: "internet-ephemeral".to_string(),
            protocol: Protocol::Bgp,
            auto_assign: false,
            cidrs: vec!["84.1.1.1/32".to_string(), "84.1.1.2/32".to_string()],
        };
        let spec = pool_spec(&pool);
        assert_eq!(spec.addresses, pool.cidrs);
        assert_eq!(spec.auto_assign, Some(false));
    }
}
