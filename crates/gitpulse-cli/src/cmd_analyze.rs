use std::path::PathBuf;

use anyhow::Context;

use gitpulse_core::config::Config;

pub fn execute(
    mut config: Config,
    owner: &str,
    repo: &str,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    let workflow = gitpulse_serve::analysis_workflow(&config);
    let report = tokio::runtime::Runtime::new()?
        .block_on(workflow.run(owner, repo))
        .with_context(|| format!("analyzing {owner}/{repo}"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
