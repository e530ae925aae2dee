//! Data plane backends consuming the synthesized configuration.
//!
//! A backend is chosen once from static configuration when the controller
//! is constructed and is never re-dispatched per call.

use std::sync::Arc;

use kube::Client;

use crate::config::BackendKind;
use crate::controller::error::Error;
use crate::util::diff;

use super::synthesis::LoadBalancerConfig;

pub mod cilium;
pub mod metallb;

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Bring the backend's custom resources in line with `desired`:
    /// garbage-collect resources whose identity is gone, then upsert every
    /// desired object. First error aborts the pass.
    async fn reconcile(&self, desired: &LoadBalancerConfig) -> Result<(), Error>;
}

pub fn new_backend(kind: BackendKind, client: Client, namespace: &str) -> Arc<dyn Backend> {
    match kind {
        BackendKind::MetalLb => Arc::new(metallb::MetalLbBackend::new(client, namespace)),
        BackendKind::Cilium => Arc::new(cilium::CiliumBackend::new(client)),
    }
}

/// Names of existing resources that are absent from the desired set and
/// must be deleted in this pass.
pub(crate) fn stale_names(existing: &[String], desired: &[String]) -> Vec<String> {
    let (_, _, removed) = diff::<String>(existing, desired);
    removed
}

/// Idempotent create-or-update: fetch by name, create when missing, replace
/// when the spec changed, no-op otherwise.
pub(crate) async fn upsert<K, F>(
    api: &kube::Api<K>,
    name: &str,
    spec: &K::Spec,
    new: F,
) -> Result<(), Error>
where
    K: kube::core::object::HasSpec
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned,
    K::Spec: Clone + PartialEq,
    F: FnOnce(&str, K::Spec) -> K,
{
    use kube::api::PostParams;

    match api.get_opt(name).await.map_err(Error::Kube)? {
        Some(current) => {
            if current.spec() == spec {
                return Ok(());
            }
            let mut updated = current.clone();
            *updated.spec_mut() = spec.clone();
            api.replace(name, &PostParams::default(), &updated)
                .await
                .map_err(Error::Kube)?;
        }
        None => {
            let object = new(name, spec.clone());
            api.create(&PostParams::default(), &object)
                .await
                .map_err(Error::Kube)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest(
        existing,
        desired,
        expected,
        case(
            vec!["internet-ephemeral".to_string(), "internet-static".to_string()],
            vec!["internet-ephemeral".to_string(), "internet-static".to_string()],
            vec![],
        ),
        case(
            vec!["internet-ephemeral".to_string(), "storage-static".to_string()],
            vec!["internet-ephemeral".to_string()],
            vec!["storage-static".to_string()],
        ),
        case(
            vec![],
            vec!["internet-ephemeral".to_string()],
            vec![],
        ),
        case(
            vec!["peer-4200000001".to_string(), "peer-4200000002".to_string()],
            vec![],
            vec!["peer-4200000001".to_string(), "peer-4200000002".to_string()],
        ),
    )]
    fn works_stale_names(existing: Vec<String>, desired: Vec<String>, expected: Vec<String>) {
        assert_eq!(stale_names(&existing, &desired), expected);
    }
}
