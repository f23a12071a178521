#![warn(
    clippy::pedantic,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::needless_pass_by_value,
    clippy::needless_continue,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::struct_field_names
)]

mod cli;
mod compare;
mod conditions;
mod controllers;
mod health;
mod instrumentation;
mod kubernetes;
mod options;

#[cfg(test)]
mod testing;

use crate::controllers::spawn_controllers;
use crate::health::{SpawnHealthEndpointError, spawn_health_endpoint};
use crate::options::Options;
use clap::Parser;
use cli::Cli;
use kube::Client;
use portico_core::crypto::init_crypto;
use portico_core::instrumentation::init_instrumentation;
use portico_core::task::{Builder as TaskBuilder, TaskBuilderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum MainError {
    #[error("Failed to create task builder: {0}")]
    TaskBuilder(#[from] TaskBuilderError),
    #[error("Failed to create Kubernetes client: {0}")]
    KubeClient(#[from] kube::Error),
    #[error("Failed to spawn health endpoint: {0}")]
    SpawnHealthEndpoint(#[from] SpawnHealthEndpointError),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), MainError> {
    let args = Cli::parse();

    init_crypto();
    init_instrumentation();

    let options = Arc::new(
        Options::builder()
            .controller_name(args.controller_name().clone())
            .build(),
    );
    info!("Serving GatewayClasses of {}", options.controller_name());

    let task_builder = TaskBuilder::new()?;

    let client = Client::try_default()
        .await
        .inspect_err(|err| error!("Failed to create Kubernetes client: {}", err))?;

    spawn_health_endpoint(&task_builder, args.port(), &client)
        .await
        .inspect_err(|err| error!("Failed to spawn health endpoint: {}", err))?;

    spawn_controllers(
        &task_builder,
        options,
        &client,
        args.watch_namespace().as_deref(),
    );

    task_builder
        .new_task("shutdown_notice")
        .spawn_on_shutdown(async { info!("Shutting down, waiting for controllers to stop") });

    task_builder.join_all().await;

    Ok(())
}
