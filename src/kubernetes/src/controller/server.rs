use std::sync::Arc;

use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use kube::Client;
use prometheus::{Encoder, TextEncoder};

use stahld_inventory::{api::Inventory, client::InventoryClient};
use stahld_trace::init::{prepare_tracing, TraceConfig};

use crate::context::State;
use crate::controller::lb::{backend, loadbalancer::LoadBalancerController};

use super::config::Config;
use super::reconciler;

pub fn start(config: Config, trace: TraceConfig) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(run(config, trace));
}

#[tracing::instrument(skip_all)]
async fn run(config: Config, trace_config: TraceConfig) {
    prepare_tracing(trace_config).await;

    // Initialize Kubernetes controller state
    let state = State::new("controller");

    let client = Client::try_default()
        .await
        .expect("Failed to create kube client");

    let inventory: Arc<dyn Inventory> = Arc::new(
        InventoryClient::new(
            config.inventory_endpoint.clone(),
            config.inventory_token.clone(),
        )
        .expect("Failed to create inventory client"),
    );

    tracing::info!(backend = %config.backend, "Select load balancer backend");
    let backend = backend::new_backend(config.backend, client.clone(), &config.backend_namespace);

    let lb = Arc::new(LoadBalancerController::new(
        client.clone(),
        inventory,
        backend,
        &config,
    ));

    // Start web server
    let server_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(server_state.clone()))
            .service(index)
            .service(health)
            .service(ready)
            .service(metrics_)
            .wrap(
                middleware::Logger::default()
                    .exclude("/healthz")
                    .exclude("/readyz"),
            )
    })
    .bind(("0.0.0.0", config.http_port as u16))
    .unwrap()
    .shutdown_timeout(5);

    // Start reconcilers
    let service_state = state.clone();
    let service_lb = lb.clone();
    let interval = config.requeue_interval;
    tokio::spawn(async move {
        reconciler::service_watcher::run(service_state, interval, service_lb).await;
    });

    let node_state = state.clone();
    let node_lb = lb.clone();
    tokio::spawn(async move {
        reconciler::node_watcher::run(node_state, interval, node_lb).await;
    });

    server.run().await.unwrap()
}

#[get("/healthz")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/readyz")]
async fn ready(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("ready")
}

#[get("/metrics")]
async fn metrics_(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&metrics, &mut buffer).unwrap();
    HttpResponse::Ok().body(buffer)
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}
