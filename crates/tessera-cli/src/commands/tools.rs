//! Tool commands: list, install, uninstall.

use tokio::sync::Mutex;

use tessera_runtime::{InstallOutcome, Orchestrator};

use super::tool_arg;
use crate::theme::Theme;

pub(crate) async fn list_tools(orchestrator: &Mutex<Orchestrator>) -> anyhow::Result<()> {
    let orchestrator = orchestrator.lock().await;
    let descriptors = orchestrator.descriptors().await?;
    if descriptors.is_empty() {
        println!("{}", Theme::info("No tools installed"));
        return Ok(());
    }

    let live = orchestrator.tool_names();
    println!("{}", Theme::header("Installed Tools"));
    println!(
        "  {:<16} {:<10} {:<8} {:<8} {:>5}",
        "NAME", "VERSION", "SIGNED", "LOADED", "CARDS"
    );
    println!("{}", Theme::separator());
    for d in &descriptors {
        let loaded = live.contains(&d.name);
        println!(
            "  {:<16} {:<10} {:<8} {:<8} {:>5}",
            d.name.as_str(),
            d.version,
            Theme::flag(d.signed, "yes"),
            Theme::flag(loaded, "yes"),
            d.cards.len()
        );
    }
    println!(
        "\n{}",
        Theme::dimmed(&format!("{} tool(s), {} loaded", descriptors.len(), live.len()))
    );
    Ok(())
}

pub(crate) async fn install(
    orchestrator: &Mutex<Orchestrator>,
    name: &str,
    repo: &str,
    update: bool,
) -> anyhow::Result<()> {
    let outcome = orchestrator.lock().await.install(name, repo, update).await?;
    match outcome {
        InstallOutcome::Installed { loaded: true } => {
            println!("{}", Theme::success(&format!("Installed {name} from {repo}")));
        },
        InstallOutcome::Installed { loaded: false } => {
            println!("{}", Theme::success(&format!("Installed {name} from {repo}")));
            println!(
                "{}",
                Theme::warning("The plugin failed to load; check the logs for details")
            );
        },
        InstallOutcome::RestartRequired => {
            println!("{}", Theme::success(&format!("Updated {name}")));
            println!("{}", Theme::info("Restart to run the new version"));
        },
    }
    Ok(())
}

pub(crate) async fn uninstall(orchestrator: &Mutex<Orchestrator>, name: &str) -> anyhow::Result<()> {
    let tool = tool_arg(name)?;
    orchestrator.lock().await.uninstall(&tool).await?;
    println!("{}", Theme::success(&format!("Uninstalled {tool}")));
    Ok(())
}
