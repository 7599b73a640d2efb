//! The `menu` command.
//!
//! Without a query it sends the full menu, every command grouped by category,
//! and tracks the sent message: replying to it with a category number or
//! name shows that category in detail. Button replies land here as well (the
//! dispatcher routes them to `menu` with the button id as query), so a button
//! whose id is a category name opens that category.

use std::sync::Arc;

use tracing::debug;
use wabot_core::Payload;
use wabot_framework::{CommandInfo, CommandSpec, DispatchArgs, HandlerResult, Plugin, Registrar};

const PATTERN: &str = "menu";

/// Menu settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuConfig {
    /// Bot name shown in the header.
    pub bot_name: String,
    /// Image sent with the menu as caption; text only when absent.
    pub image_url: Option<String>,
    /// Command prefix shown before every command.
    pub prefix: String,
}

/// The menu plugin.
#[derive(Debug, Clone)]
pub struct MenuPlugin {
    config: Arc<MenuConfig>,
}

impl MenuPlugin {
    pub fn new(config: MenuConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Plugin for MenuPlugin {
    fn name(&self) -> &str {
        "menu"
    }

    fn register(&self, r: &mut Registrar) {
        let config = Arc::clone(&self.config);
        r.command(
            CommandSpec::new(PATTERN, move |args: DispatchArgs| {
                let config = Arc::clone(&config);
                async move { menu(args, &config).await }
            })
            .react("📜")
            .category("main")
            .description("Displays all available commands, categorized."),
        );
    }
}

/// Commands grouped by category, in first-registration order.
fn categories(catalog: Vec<CommandInfo>) -> Vec<(String, Vec<CommandInfo>)> {
    let mut groups: Vec<(String, Vec<CommandInfo>)> = Vec::new();
    for info in catalog.into_iter().filter(|c| c.pattern != PATTERN) {
        match groups.iter_mut().find(|(cat, _)| *cat == info.category) {
            Some((_, cmds)) => cmds.push(info),
            None => groups.push((info.category.clone(), vec![info])),
        }
    }
    groups
}

fn render_full(config: &MenuConfig, groups: &[(String, Vec<CommandInfo>)]) -> String {
    let mut text = String::new();
    text.push_str("╭━─━─━─━─━─━─━─━─━╮\n");
    text.push_str(&format!("┃ 👑 *WELCOME TO {}* 🤖\n", config.bot_name.to_uppercase()));
    text.push_str("┃   _All Available Commands_\n");
    text.push_str("╰━─━─━─━─━─━─━─━─━╯\n");

    for (idx, (category, cmds)) in groups.iter().enumerate() {
        text.push_str(&format!(
            "\n*══ [ {}. 📚 {} ] ══*\n",
            idx + 1,
            category.to_uppercase()
        ));
        for cmd in cmds {
            text.push_str(&format!("│◻ {}{}\n", config.prefix, cmd.pattern));
        }
    }

    text.push_str("\n➖➖➖➖➖➖➖➖➖➖➖➖\n");
    text.push_str("_Reply with a category number to see details._");
    text
}

fn render_category(config: &MenuConfig, category: &str, cmds: &[CommandInfo]) -> String {
    let mut text = format!("*══ [ 📚 {} ] ══*\n", category.to_uppercase());
    for cmd in cmds {
        text.push_str(&format!("\n◻ *{}{}*", config.prefix, cmd.pattern));
        if !cmd.aliases.is_empty() {
            text.push_str(&format!(" ({})", cmd.aliases.join(", ")));
        }
        let desc = if cmd.description.is_empty() {
            "No description"
        } else {
            cmd.description.as_str()
        };
        text.push_str(&format!("\n   {desc}\n"));
    }
    text
}

async fn menu(args: DispatchArgs, config: &MenuConfig) -> HandlerResult {
    let groups = categories(args.catalog());
    let query = args.query.trim();

    if query.is_empty() {
        let text = render_full(config, &groups);
        let payload = match &config.image_url {
            Some(url) => Payload::Image {
                url: url.clone(),
                caption: Some(text),
            },
            None => Payload::text(text),
        };
        let sent = args.send(payload).await?;
        args.track_reply(&sent, PATTERN);
        debug!(chat = %args.chat_id(), message_id = %sent.id, "Menu sent and tracked");
        return Ok(());
    }

    let selected = match query.parse::<usize>() {
        Ok(n) if n >= 1 => groups.get(n - 1),
        _ => groups.iter().find(|(cat, _)| cat.eq_ignore_ascii_case(query)),
    };

    match selected {
        Some((category, cmds)) => {
            args.reply(render_category(config, category, cmds)).await?;
        }
        None => {
            args.reply(format!(
                "*Unknown category '{query}'.* Send {}{PATTERN} to see the list.",
                config.prefix
            ))
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupAdminPlugin;
    use wabot_core::testing::RecordingBot;
    use wabot_core::{BoxedBot, ContextInfo, MessageContent, MessageKey, RawMessage};
    use wabot_framework::{Dispatcher, PluginLoader};

    const CHAT: &str = "94711111111@s.whatsapp.net";

    fn setup(image_url: Option<&str>) -> (Dispatcher, Arc<RecordingBot>, BoxedBot) {
        let dispatcher = Dispatcher::default();
        PluginLoader::new(
            Arc::clone(dispatcher.registry()),
            Arc::clone(dispatcher.replies()),
            Arc::default(),
        )
        .with(MenuPlugin::new(MenuConfig {
            bot_name: "wabot".into(),
            image_url: image_url.map(str::to_string),
            prefix: ".".into(),
        }))
        .with(GroupAdminPlugin)
        .load_all();

        let recording = Arc::new(RecordingBot::new("94700000000@s.whatsapp.net"));
        let bot: BoxedBot = recording.clone();
        (dispatcher, recording, bot)
    }

    fn text(id: &str, body: &str, quoted: Option<&str>) -> RawMessage {
        RawMessage::new(
            MessageKey::new(CHAT, id),
            MessageContent::Text {
                text: body.into(),
                context: quoted.map(|q| ContextInfo {
                    stanza_id: Some(q.into()),
                    ..Default::default()
                }),
            },
        )
    }

    #[tokio::test]
    async fn test_full_menu_lists_categories_without_itself() {
        let (dispatcher, recording, bot) = setup(Some("https://example.com/menu.png"));

        dispatcher.dispatch(&bot, text("M1", ".menu", None)).join().await;

        let sent = recording.sent();
        let menu = sent
            .iter()
            .find(|m| matches!(m.payload, Payload::Image { .. }))
            .unwrap();
        let caption = menu.text().unwrap();
        assert!(caption.contains("WELCOME TO WABOT"));
        assert!(caption.contains("1. 📚 GROUP"));
        assert!(caption.contains(".kick"));
        assert!(!caption.contains(".menu"));
        assert_eq!(dispatcher.tracker().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_to_menu_opens_category() {
        let (dispatcher, recording, bot) = setup(None);

        dispatcher.dispatch(&bot, text("M1", ".menu", None)).join().await;
        // RecordingBot numbers sends; the reaction is SENT-1, the menu SENT-2.
        dispatcher
            .dispatch(&bot, text("M2", "1", Some("SENT-2")))
            .join()
            .await;

        let last = recording.sent_texts().pop().unwrap();
        assert!(last.contains("📚 GROUP"));
        assert!(last.contains(".kick* (remove)"));
        assert!(last.contains("Kicks a mentioned or replied user"));
    }

    #[tokio::test]
    async fn test_button_reply_opens_category_by_name() {
        let (dispatcher, recording, bot) = setup(None);
        let raw = RawMessage::new(
            MessageKey::new(CHAT, "B1"),
            MessageContent::ButtonReply {
                selected_id: "Group".into(),
                display_text: None,
                context: None,
            },
        );

        dispatcher.dispatch(&bot, raw).join().await;

        let last = recording.sent_texts().pop().unwrap();
        assert!(last.contains(".promote"));
    }

    #[tokio::test]
    async fn test_unknown_category() {
        let (dispatcher, recording, bot) = setup(None);

        dispatcher.dispatch(&bot, text("M1", ".menu 9", None)).join().await;

        let last = recording.sent_texts().pop().unwrap();
        assert!(last.contains("Unknown category '9'"));
    }
}
