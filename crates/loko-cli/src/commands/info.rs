use super::provision::print_instance;
use crate::context::Context;
use anyhow::Result;
use loko_core::PersistedState;

pub async fn run(ctx: &Context) -> Result<()> {
    let state = ctx.store.load()?;
    let instance = match &state.cloud {
        Some(cloud) => {
            ctx.provisioner(ctx.recorded_provider(cloud))
                .info()
                .await?
        }
        None => None,
    };

    match &instance {
        Some(instance) => print_instance(instance),
        None => println!("No instance"),
    }

    // Routes are informational only
    let project = match ctx.project() {
        Ok(project) => project,
        Err(e) => {
            tracing::warn!("cannot list endpoints: {e:#}");
            return Ok(());
        }
    };
    let address = instance.as_ref().and_then(|i| i.address());
    let port = gateway_port(&state, ctx.config.gateway_port);
    for route in project.routes() {
        let url = endpoint(address, port, state.https, project.id(), &route);
        println!("Endpoint: {url}");
    }
    Ok(())
}

/// Port recorded by the last `loko plan`, else the configured one
fn gateway_port(state: &PersistedState, configured: u16) -> u16 {
    state.gateway_port.unwrap_or(configured)
}

/// Public URL of a graph route, or its gateway path when there is no host
fn endpoint(address: Option<&str>, port: u16, https: bool, project_id: &str, route: &str) -> String {
    let path = format!(
        "routes/orchestrator/endpoints/{}/{}",
        project_id,
        route.trim_start_matches('/')
    );
    match address {
        Some(host) if https => format!("https://{host}/{path}"),
        Some(host) => format!("http://{host}:{port}/{path}"),
        None => path,
    }
}
