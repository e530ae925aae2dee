pub mod reconciler {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use http::{Request, Response};
    use hyper::Body;
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, Node, NodeAddress, NodeStatus, Service,
        ServiceSpec, ServiceStatus,
    };
    use kube::{core::ObjectMeta, Client};

    use stahld_inventory::model::{Ip, IpType};

    use crate::config::BackendKind;
    use crate::controller::config::{
        Config, DEFAULT_BACKEND_NAMESPACE, DEFAULT_HTTP_PORT, DEFAULT_REQUEUE_INTERVAL,
    };
    use crate::controller::error::Error;
    use crate::controller::lb::backend::Backend;
    use crate::controller::lb::synthesis::{LoadBalancerConfig, ASN_LABEL, HOSTNAME_LABEL};

    /// A client backed by a mock service that is never driven. Good enough
    /// for paths that must not talk to the apiserver at all.
    pub fn mock_client() -> Client {
        let (mock_service, _handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        Client::new(mock_service, "default")
    }

    pub fn test_config() -> Config {
        Config {
            http_port: DEFAULT_HTTP_PORT,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            cluster_id: "cluster-a".to_string(),
            project_id: "project-a".to_string(),
            default_external_network: "internet".to_string(),
            additional_networks: vec!["storage".to_string()],
            backend: BackendKind::default(),
            backend_namespace: DEFAULT_BACKEND_NAMESPACE.to_string(),
            inventory_endpoint: "http://inventory:8080".to_string(),
            inventory_token: "test-token".to_string(),
        }
    }

    pub fn test_service(namespace: &str, name: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    pub fn test_service_with_ingress(namespace: &str, name: &str, address: &str) -> Service {
        let mut svc = test_service(namespace, name);
        svc.status = Some(ServiceStatus {
            conditions: None,
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some(address.to_string()),
                    ..Default::default()
                }]),
            }),
        });
        svc
    }

    pub fn test_service_with_fixed_ip(namespace: &str, name: &str, address: &str) -> Service {
        let mut svc = test_service(namespace, name);
        if let Some(spec) = svc.spec.as_mut() {
            spec.load_balancer_ip = Some(address.to_string());
        }
        svc
    }

    pub fn test_node(name: &str, asn: &str, internal_address: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([
                    (ASN_LABEL.to_string(), asn.to_string()),
                    (HOSTNAME_LABEL.to_string(), name.to_string()),
                ])),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus {
                addresses: Some(vec![NodeAddress {
                    type_: "InternalIP".to_string(),
                    address: internal_address.to_string(),
                }]),
                ..Default::default()
            }),
        }
    }

    pub fn test_ip(address: &str, network: Option<&str>, ip_type: IpType, tags: &[&str]) -> Ip {
        Ip {
            address: address.to_string(),
            network: network.map(|n| n.to_string()),
            project: "project-a".to_string(),
            ip_type,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            name: None,
            description: None,
        }
    }

    /// Backend double recording every desired config it receives.
    #[derive(Default)]
    pub struct RecordingBackend {
        configs: Mutex<Vec<LoadBalancerConfig>>,
    }

    impl RecordingBackend {
        pub fn configs(&self) -> Vec<LoadBalancerConfig> {
            self.configs.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Backend for RecordingBackend {
        async fn reconcile(&self, desired: &LoadBalancerConfig) -> Result<(), Error> {
            self.configs.lock().unwrap().push(desired.clone());
            Ok(())
        }
    }
}
