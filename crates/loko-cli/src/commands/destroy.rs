use crate::context::Context;
use anyhow::{Result, bail};

pub async fn run(ctx: &Context) -> Result<()> {
    let state = ctx.store.load()?;
    let Some(cloud) = &state.cloud else {
        bail!("there is no instance to destroy");
    };
    let id = ctx
        .provisioner(ctx.recorded_provider(cloud))
        .destroy()
        .await?;
    println!("Terminated {id}");
    Ok(())
}
