use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::{
    api::{ListParams, PostParams},
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
        watcher::Config,
        Controller,
    },
    Api, Client, ResourceExt,
};

use crate::{
    context::{error_policy, ContextWith, Ctx, State},
    controller::error::Error,
    controller::lb::loadbalancer::LoadBalancerController,
    util::get_namespace,
};

pub const SERVICE_FINALIZER: &str = "service.lb.stahl.io/finalizer";

#[tracing::instrument(skip_all)]
pub async fn reconciler(
    svc: Arc<Service>,
    ctx: Arc<ContextWith<Arc<LoadBalancerController>>>,
) -> Result<Action, Error> {
    // Never attach the finalizer to Services this controller doesn't serve.
    if !is_loadbalancer(&svc) && !has_finalizer(&svc) {
        return Ok(Action::await_change());
    }

    ctx.metrics().reconciliation(svc.as_ref());
    let _timer = ctx.metrics().measure();

    let ns = get_namespace::<Service>(&svc).map_err(Error::KubeLibrary)?;
    let services = Api::<Service>::namespaced(ctx.client().clone(), &ns);

    finalizer(&services, SERVICE_FINALIZER, svc, |event| async {
        match event {
            Event::Apply(svc) => reconcile(&services, &svc, ctx.clone()).await,
            Event::Cleanup(svc) => cleanup(&svc, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

#[tracing::instrument(skip_all)]
async fn reconcile(
    api: &Api<Service>,
    svc: &Service,
    ctx: Arc<ContextWith<Arc<LoadBalancerController>>>,
) -> Result<Action, Error> {
    let ns = get_namespace::<Service>(svc).map_err(Error::KubeLibrary)?;
    tracing::info!(name = svc.name_any(), namespace = ns, "Reconcile Service");

    let lb = ctx.component.clone();

    if !is_loadbalancer(svc) {
        // The Service changed its type while still owning addresses.
        lb.ensure_load_balancer_deleted(svc).await?;
        return Ok(Action::await_change());
    }

    let node_api = Api::<Node>::all(ctx.client().clone());
    let nodes = node_api
        .list(&ListParams::default())
        .await
        .map_err(Error::Kube)?;

    let status = lb.ensure_load_balancer(svc, &nodes.items).await?;

    let current = svc.status.as_ref().and_then(|s| s.load_balancer.as_ref());
    if current != Some(&status) {
        let mut new_svc = svc.clone();
        match new_svc.status.as_mut() {
            Some(svc_status) => svc_status.load_balancer = Some(status.clone()),
            None => {
                new_svc.status = Some(k8s_openapi::api::core::v1::ServiceStatus {
                    conditions: None,
                    load_balancer: Some(status.clone()),
                })
            }
        }
        api.replace_status(
            &svc.name_any(),
            &PostParams::default(),
            serde_json::to_vec(&new_svc).map_err(Error::Serialization)?,
        )
        .await
        .map_err(Error::Kube)?;

        tracing::info!(
            name = svc.name_any(),
            namespace = ns,
            status=?status,
            "Update service status with the load balancer ingress"
        );
    }

    Ok(Action::await_change())
}

#[tracing::instrument(skip_all)]
async fn cleanup(
    svc: &Service,
    ctx: Arc<ContextWith<Arc<LoadBalancerController>>>,
) -> Result<Action, Error> {
    let ns = get_namespace::<Service>(svc).map_err(Error::KubeLibrary)?;
    tracing::info!(name = svc.name_any(), namespace = ns, "Cleanup Service");

    ctx.component.ensure_load_balancer_deleted(svc).await?;

    Ok(Action::await_change())
}

pub async fn run(state: State, interval: u64, lb: Arc<LoadBalancerController>) {
    let client = Client::try_default()
        .await
        .expect("Failed to create kube client");

    let services = Api::<Service>::all(client.clone());

    tracing::info!("Start Service watcher");

    Controller::new(services, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(
            reconciler,
            error_policy::<Service, Error, ContextWith<Arc<LoadBalancerController>>>,
            state.to_context_with(client, interval, lb),
        )
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

pub fn is_loadbalancer(svc: &Service) -> bool {
    match svc.spec.as_ref().and_then(|spec| spec.type_.as_ref()) {
        Some(t) => t.eq("LoadBalancer"),
        None => false,
    }
}

fn has_finalizer(svc: &Service) -> bool {
    svc.finalizers().iter().any(|f| f.eq(SERVICE_FINALIZER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::reconciler::{test_service, test_service_with_ingress};
    use rstest::rstest;

    #[rstest(
        type_,
        expected,
        case(Some("LoadBalancer"), true),
        case(Some("ClusterIP"), false),
        case(None, false)
    )]
    fn works_is_loadbalancer(type_: Option<&str>, expected: bool) {
        let mut svc = test_service("default", "web");
        if let Some(spec) = svc.spec.as_mut() {
            spec.type_ = type_.map(|t| t.to_string());
        }
        assert_eq!(is_loadbalancer(&svc), expected);
    }

    #[test]
    fn works_has_finalizer() {
        let mut svc = test_service_with_ingress("default", "web", "84.1.1.1");
        assert!(!has_finalizer(&svc));
        svc.metadata.finalizers = Some(vec![SERVICE_FINALIZER.to_string()]);
        assert!(has_finalizer(&svc));
    }
}
