use gitpulse_core::config::Config;
use gitpulse_serve::AppState;

pub fn execute(config: Config, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.serve.bind.clone());
    let port = port.unwrap_or(config.serve.port);
    let state = AppState::from_config(&config);
    tokio::runtime::Runtime::new()?.block_on(gitpulse_serve::serve(state, &bind, port))
}
