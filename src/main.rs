use dotenvy::dotenv;
use tracing::info;

use channelpass::infra::{
    app::create_app,
    setup::{init_app_state, init_tracing},
    sweep_worker::run_sweep_loop,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let app_state = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;

    let app = create_app(app_state.clone());

    // Spawn the background sweeps (after tracing is initialized).
    let reconciliation = app_state.reconciliation.clone();
    let expiry = app_state.expiry_sweeps.clone();
    let config = app_state.config.clone();
    tokio::spawn(async move {
        run_sweep_loop(reconciliation, expiry, config).await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
