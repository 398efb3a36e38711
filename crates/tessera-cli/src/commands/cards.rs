//! Card commands.

use tokio::sync::Mutex;

use tessera_runtime::Orchestrator;

use super::{card_arg, tool_arg};
use crate::theme::Theme;

pub(crate) async fn list_cards(orchestrator: &Mutex<Orchestrator>) -> anyhow::Result<()> {
    let orchestrator = orchestrator.lock().await;
    let cards = orchestrator.instances();
    if cards.is_empty() {
        println!("{}", Theme::info("No cards yet"));
        return Ok(());
    }

    println!("{}", Theme::header("Cards"));
    println!(
        "  {:<3} {:<24} {:<12} {:<28} {:<7} {:<4} CREATED",
        "", "NAME", "TOOL", "ID", "PLACED", "FAV"
    );
    println!("{}", Theme::separator());
    for card in cards {
        println!(
            "  {:<3} {:<24} {:<12} {:<28} {:<7} {:<4} {}",
            card.emoji,
            card.name,
            card.tool.as_str(),
            card.id.as_str(),
            Theme::flag(card.is_placed, "yes"),
            Theme::flag(card.is_favored, "★"),
            Theme::dimmed(&card.created_at.format("%Y-%m-%d %H:%M").to_string()),
        );
    }
    println!("\n{}", Theme::dimmed(&format!("{} card(s)", cards.len())));
    Ok(())
}

pub(crate) async fn add(
    orchestrator: &Mutex<Orchestrator>,
    tool: &str,
    name: &str,
    emoji: &str,
) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    let card = orchestrator.lock().await.add_instance(name, &tool, emoji).await?;
    println!(
        "{}",
        Theme::success(&format!("Added {} {} to {tool} ({})", card.emoji, card.name, card.id))
    );
    Ok(())
}

pub(crate) async fn remove(
    orchestrator: &Mutex<Orchestrator>,
    tool: &str,
    ids: &[String],
    clean: bool,
) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    let ids: Vec<_> = ids.iter().map(|id| card_arg(id)).collect();
    orchestrator
        .lock()
        .await
        .remove_instance(&ids, &tool, clean)
        .await?;
    println!(
        "{}",
        Theme::success(&format!("Removed {} card(s) from {tool}", ids.len()))
    );
    Ok(())
}

pub(crate) async fn toggle(orchestrator: &Mutex<Orchestrator>, tool: &str, id: &str) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    let placed = orchestrator
        .lock()
        .await
        .toggle_instance(&card_arg(id), &tool)
        .await?;
    let state = if placed { "placed" } else { "unplaced" };
    println!("{}", Theme::success(&format!("Card {id} is now {state}")));
    Ok(())
}

pub(crate) async fn load(orchestrator: &Mutex<Orchestrator>, tool: &str, id: &str) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    let outcome = orchestrator
        .lock()
        .await
        .load_instance(&card_arg(id), &tool)
        .await;
    if outcome.is_ok() {
        println!("{}", Theme::success(&format!("Loaded {id}")));
    } else {
        println!("{}", Theme::error(&format!("Load failed: {outcome}")));
    }
    Ok(())
}

pub(crate) async fn emoji(
    orchestrator: &Mutex<Orchestrator>,
    tool: &str,
    id: &str,
    emoji: &str,
) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    orchestrator
        .lock()
        .await
        .change_emoji(emoji, &card_arg(id), &tool)
        .await?;
    println!("{}", Theme::success(&format!("Card {id} is now {emoji}")));
    Ok(())
}

pub(crate) async fn favourite(orchestrator: &Mutex<Orchestrator>, tool: &str, id: &str) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    let favored = orchestrator
        .lock()
        .await
        .toggle_favourite(&card_arg(id), &tool)
        .await?;
    let verb = if favored { "Starred" } else { "Unstarred" };
    println!("{}", Theme::success(&format!("{verb} {id}")));
    Ok(())
}

pub(crate) async fn rename(
    orchestrator: &Mutex<Orchestrator>,
    tool: &str,
    id: &str,
    name: &str,
) -> anyhow::Result<()> {
    let tool = tool_arg(tool)?;
    orchestrator
        .lock()
        .await
        .rename_instance(&card_arg(id), &tool, name)
        .await?;
    println!("{}", Theme::success(&format!("Renamed {id} to {name}")));
    Ok(())
}
