use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::ListParams,
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};

use crate::{
    context::{error_policy, ContextWith, Ctx, State},
    controller::error::Error,
    controller::lb::loadbalancer::LoadBalancerController,
};

// Re-synthesizes the whole config whenever the node set changes and on a
// periodic requeue. The requeue is the resync that converges the data plane
// after deletions.
#[tracing::instrument(skip_all)]
pub async fn reconciler(
    node: Arc<Node>,
    ctx: Arc<ContextWith<Arc<LoadBalancerController>>>,
) -> Result<Action, Error> {
    tracing::info!(name = node.name_any(), "Reconcile Node");

    ctx.metrics().reconciliation(node.as_ref());
    let _timer = ctx.metrics().measure();

    let node_api = Api::<Node>::all(ctx.client().clone());
    let nodes = node_api
        .list(&ListParams::default())
        .await
        .map_err(Error::Kube)?;

    ctx.component.update_load_balancer(&nodes.items).await?;

    Ok(Action::requeue(Duration::from_secs(ctx.interval())))
}

pub async fn run(state: State, interval: u64, lb: Arc<LoadBalancerController>) {
    let client = Client::try_default()
        .await
        .expect("Failed to create kube client");

    let nodes = Api::<Node>::all(client.clone());

    tracing::info!("Start Node watcher");

    Controller::new(nodes, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(
            reconciler,
            error_policy::<Node, Error, ContextWith<Arc<LoadBalancerController>>>,
            state.to_context_with(client, interval, lb),
        )
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
