use clap::Parser;
use getset::{CopyGetters, Getters};
use portico_api::constants::{CONTROLLER_NAME_ENV, DEFAULT_CONTROLLER_NAME};

#[derive(Parser, Getters, CopyGetters)]
#[command(about = "A Kubernetes operator that provisions Portico gateways", long_about = None)]
pub struct Cli {
    #[getset(get_copy = "pub")]
    #[arg(default_value = "8080", env = "PORT", long = "port")]
    port: u16,

    #[getset(get = "pub")]
    #[arg(default_value = DEFAULT_CONTROLLER_NAME, env = CONTROLLER_NAME_ENV, long = "controller-name")]
    controller_name: String,

    #[getset(get = "pub")]
    #[arg(env = "PORTICO_WATCH_NAMESPACE", long = "watch-namespace")]
    watch_namespace: Option<String>,
}
