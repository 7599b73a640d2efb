//! Group administration commands.
//!
//! | Command | Aliases | Needs sender admin | Effect |
//! |---------|---------|--------------------|--------|
//! | `kick` | `remove` | yes | removes the target |
//! | `promote` | | yes | grants admin |
//! | `demote` | | yes | revokes admin |
//! | `mute` | `close` | yes | only admins may write |
//! | `unmute` | `open` | yes | everybody may write |
//! | `invite` | `link` | no | replies with the invite link |
//!
//! Every command requires a group chat and the bot being an admin there. The
//! target of `kick`, `promote` and `demote` is the first mentioned user, or
//! else the author of the quoted message.

use tracing::info;
use wabot_core::{GroupSetting, ParticipantAction};
use wabot_framework::{CommandSpec, DispatchArgs, HandlerError, HandlerResult, Plugin, Registrar};

const CATEGORY: &str = "group";

/// Base URL of group invite links.
pub const INVITE_BASE_URL: &str = "https://chat.whatsapp.com/";

/// The group administration plugin.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupAdminPlugin;

impl Plugin for GroupAdminPlugin {
    fn name(&self) -> &str {
        "group-admin"
    }

    fn register(&self, r: &mut Registrar) {
        r.command(
            CommandSpec::new("kick", kick)
                .alias("remove")
                .react("👋")
                .category(CATEGORY)
                .description("Kicks a mentioned or replied user from the group."),
        )
        .command(
            CommandSpec::new("promote", promote)
                .react("👑")
                .category(CATEGORY)
                .description("Promotes a mentioned or replied user to group admin."),
        )
        .command(
            CommandSpec::new("demote", demote)
                .react("🔻")
                .category(CATEGORY)
                .description("Demotes a mentioned or replied admin to a regular member."),
        )
        .command(
            CommandSpec::new("mute", mute)
                .alias("close")
                .react("🔒")
                .category(CATEGORY)
                .description("Closes the group so only admins can send messages."),
        )
        .command(
            CommandSpec::new("unmute", unmute)
                .alias("open")
                .react("🔓")
                .category(CATEGORY)
                .description("Opens the group so all members can send messages."),
        )
        .command(
            CommandSpec::new("invite", invite)
                .alias("link")
                .react("🔗")
                .category(CATEGORY)
                .description("Sends the group invite link."),
        );
    }
}

// =============================================================================
// Checks
// =============================================================================

/// Verifies the group/admin preconditions, replying with the reason on failure.
///
/// Returns `Ok(false)` when the command must stop.
async fn check_admin(args: &DispatchArgs, require_sender_admin: bool) -> Result<bool, HandlerError> {
    if !args.ctx.is_group {
        args.reply("*This command can only be used in a group!* 🙁").await?;
        return Ok(false);
    }

    let facts = args.group_facts().await;
    if !facts.is_bot_admin {
        args.reply("*I need to be an admin in this group to use this command!* 🤖❌")
            .await?;
        return Ok(false);
    }
    if require_sender_admin && !facts.is_sender_admin {
        args.reply("*You must be an admin to use this command!* 👮‍♂️❌")
            .await?;
        return Ok(false);
    }

    Ok(true)
}

/// Resolves the user a participant command acts on.
fn target(args: &DispatchArgs) -> Option<String> {
    args.ctx
        .mentioned
        .first()
        .cloned()
        .or_else(|| args.ctx.quoted_sender.clone())
}

// =============================================================================
// Participant Commands
// =============================================================================

async fn update_participant(
    args: DispatchArgs,
    action: ParticipantAction,
    noun: &str,
    progress: &str,
    done: &str,
) -> HandlerResult {
    if !check_admin(&args, true).await? {
        return Ok(());
    }

    let Some(target) = target(&args) else {
        args.reply(format!(
            "*Please mention or reply to the user you want to {noun}.*"
        ))
        .await?;
        return Ok(());
    };

    args.reply(progress).await?;
    let updates = args
        .bot
        .update_participants(args.chat_id(), std::slice::from_ref(&target), action)
        .await?;

    if updates.first().is_some_and(|u| u.is_forbidden()) {
        args.reply(format!(
            "*Failed to {noun}. The target is likely an owner or a higher-level admin.* 😔"
        ))
        .await?;
        return Ok(());
    }

    info!(chat = %args.chat_id(), target = %target, action = ?action, "Participant updated");
    args.reply(done).await?;
    Ok(())
}

async fn kick(args: DispatchArgs) -> HandlerResult {
    update_participant(
        args,
        ParticipantAction::Remove,
        "kick",
        "*Kicking user... 👋*",
        "*User successfully kicked! 🫡✅*",
    )
    .await
}

async fn promote(args: DispatchArgs) -> HandlerResult {
    update_participant(
        args,
        ParticipantAction::Promote,
        "promote",
        "*Promoting user... ⬆️*",
        "*User successfully promoted to admin! 👑✅*",
    )
    .await
}

async fn demote(args: DispatchArgs) -> HandlerResult {
    update_participant(
        args,
        ParticipantAction::Demote,
        "demote",
        "*Demoting user... ⬇️*",
        "*Admin successfully demoted! 🧑‍💻✅*",
    )
    .await
}

// =============================================================================
// Settings Commands
// =============================================================================

async fn change_setting(
    args: DispatchArgs,
    setting: GroupSetting,
    progress: &str,
    done: &str,
) -> HandlerResult {
    if !check_admin(&args, true).await? {
        return Ok(());
    }

    args.reply(progress).await?;
    args.bot.update_group_setting(args.chat_id(), setting).await?;
    info!(chat = %args.chat_id(), setting = ?setting, "Group setting changed");
    args.reply(done).await?;
    Ok(())
}

async fn mute(args: DispatchArgs) -> HandlerResult {
    change_setting(
        args,
        GroupSetting::Announcement,
        "*Closing group for members... 🔒*",
        "*Group successfully closed! Only admins can send messages now. 🤐✅*",
    )
    .await
}

async fn unmute(args: DispatchArgs) -> HandlerResult {
    change_setting(
        args,
        GroupSetting::NotAnnouncement,
        "*Opening group for all members... 🔓*",
        "*Group successfully opened! Everyone can send messages now. 🗣️✅*",
    )
    .await
}

async fn invite(args: DispatchArgs) -> HandlerResult {
    if !check_admin(&args, false).await? {
        return Ok(());
    }

    let code = args.bot.group_invite_code(args.chat_id()).await?;
    let name = &args.group_facts().await.name;
    args.reply(format!(
        "*🔗 Invite link for {name}*\n\n{INVITE_BASE_URL}{code}"
    ))
    .await?;
    Ok(())
}
