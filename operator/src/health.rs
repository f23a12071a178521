use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum_health::{Health, HealthDetail, HealthIndicator};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use kube::api::ListParams;
use kube::{Api, Client};
use portico_core::task::Builder as TaskBuilder;
use problemdetails::Problem;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::select;
use tracing::{info, instrument};

pub struct KubernetesApiHealthIndicator(Client);

impl KubernetesApiHealthIndicator {
    pub fn new(client: &Client) -> Self {
        Self(client.clone())
    }
}

#[async_trait]
impl HealthIndicator for KubernetesApiHealthIndicator {
    fn name(&self) -> String {
        "KubernetesAPI".to_string()
    }

    async fn details(&self) -> HealthDetail {
        let api = Api::<GatewayClass>::all(self.0.clone());
        match api.list(&ListParams::default().limit(1)).await {
            Ok(_) => HealthDetail::up(),
            Err(e) => {
                let mut health = HealthDetail::down();
                health.with_detail("error".to_string(), e.to_string());
                health
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SpawnHealthEndpointError {
    #[error("Failed to bind health endpoint: {0}")]
    NetworkBind(#[from] std::io::Error),
}

pub async fn spawn_health_endpoint(
    task_builder: &TaskBuilder,
    port: u16,
    client: &Client,
) -> Result<(), SpawnHealthEndpointError> {
    let health = Health::builder()
        .with_indicator(KubernetesApiHealthIndicator::new(client))
        .build();

    let endpoint = SocketAddr::from(([0, 0, 0, 0], port));
    let tcp_listener = TcpListener::bind(endpoint).await?;
    info!("Health endpoint listening on {}", endpoint);

    task_builder
        .new_task("health_endpoint")
        .spawn(async move {
            select! {
                _ = axum::serve(tcp_listener, router(health)) => info!("Health endpoint stopped"),
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal, stopping health endpoint")
            }
        });

    Ok(())
}

fn router(health: Health) -> Router {
    Router::new()
        .route("/healthz/liveness", get(liveness_check))
        .route("/healthz/readiness", get(axum_health::health))
        .fallback(not_found)
        .layer(health)
}

#[instrument(name = "health::liveness_check")]
async fn liveness_check() -> impl IntoResponse {
    Problem::from(StatusCode::OK)
        .with_value("status", StatusCode::OK.as_u16())
        .with_title("Liveness Check")
        .with_detail("UP")
}

async fn not_found() -> impl IntoResponse {
    Problem::from(StatusCode::NOT_FOUND)
        .with_value("status", StatusCode::NOT_FOUND.as_u16())
        .with_title("Not Found")
        .with_detail("The requested resource could not be found")
}
