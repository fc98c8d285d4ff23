use std::path::{Path, PathBuf};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode};
use tracing::{error, info, warn};

use crate::bot::keyboards;
use crate::bot::utils::parse_start_param;
use crate::error::ServiceError;
use crate::scheduler;
use crate::session::SessionState;
use crate::state::AppState;
use crate::texts;

use chrono::Duration;
use promoshare_db::models::JobKind;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(from) = msg.from.clone() else {
        return Ok(());
    };
    let user_id = from.id.0 as i64;

    if msg.photo().is_some() || is_image_document(&msg) {
        handle_media(&bot, &msg, &state, user_id).await;
        return Ok(());
    }

    let Some(text) = msg.text().map(|t| t.to_string()) else {
        return Ok(());
    };

    if text.starts_with("/start") {
        handle_start(&bot, &msg, &state, &from, &text).await;
        return Ok(());
    }

    let is_admin = state.cfg.is_admin(user_id);

    match text.as_str() {
        "👤 Profile" | "/profile" => {
            send_profile(&bot, &state, user_id).await;
        }
        "ℹ️ Rules" => {
            let _ = bot
                .send_message(msg.chat.id, texts::rules())
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_inline())
                .await;
        }
        "🛠 Support" => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    format!("For any questions: {}", state.cfg.support_contact),
                )
                .reply_markup(keyboards::back_inline())
                .await;
        }
        "Main" => {
            state.sessions.reset(user_id).await;
            let _ = bot
                .send_message(msg.chat.id, texts::main_screen())
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::main_reply(is_admin))
                .await;
        }
        "Tasks" => {
            let _ = bot
                .send_message(msg.chat.id, "Pick a task type:")
                .reply_markup(keyboards::participate())
                .await;
        }
        "🔥 Get Promo" => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "Friends earn you promo codes.\n🎁 Check if you have enough for a gift",
                )
                .reply_markup(keyboards::promo_choose())
                .await;
        }
        "✅ Enter Promo" => {
            state.sessions.set(user_id, SessionState::AwaitingPromoCode).await;
            let _ = bot
                .send_message(msg.chat.id, "🔑 Enter the promo code your friend gave you:")
                .await;
        }

        "/myid" => {
            let response = format!(
                "👤 <b>Your ID:</b> <code>{}</code>\n📝 <b>Username:</b> @{}\n👨‍💼 <b>Name:</b> {}",
                user_id,
                from.username.as_deref().unwrap_or("none"),
                texts::escape_html(&from.first_name),
            );
            let _ = bot
                .send_message(msg.chat.id, response)
                .parse_mode(ParseMode::Html)
                .await;
        }
        "/refresh" => {
            let subscribed = state.subscription.force_check(&bot, user_id).await;
            let response = if subscribed {
                "✅ <b>Subscription confirmed!</b>\n\nYou're all set. Send /start to continue."
            } else {
                "❌ <b>No subscription found</b>\n\nMake sure you joined the channel and try again."
            };
            let _ = bot
                .send_message(msg.chat.id, response)
                .parse_mode(ParseMode::Html)
                .await;
        }

        // Admin console entry points.
        "Admin" if is_admin => {
            state.sessions.reset(user_id).await;
            let _ = bot
                .send_message(msg.chat.id, "👑 Admin panel\n\nPick an action:")
                .reply_markup(keyboards::admin_reply())
                .await;
        }
        "Content" if is_admin => {
            let _ = bot
                .send_message(msg.chat.id, "🧠 Content tasks\nWhat do you want to manage?")
                .reply_markup(keyboards::content_reply())
                .await;
        }
        "Promo Offers" if is_admin => {
            let _ = bot
                .send_message(msg.chat.id, "💎 Promo offers\nPick an action:")
                .reply_markup(keyboards::promo_admin_reply())
                .await;
        }
        "Stats" if is_admin => {
            send_stats(&bot, &state, msg.chat.id).await;
        }
        "Broadcast" if is_admin => {
            let _ = bot
                .send_message(msg.chat.id, "Pick a broadcast mode:")
                .reply_markup(keyboards::broadcast_modes())
                .await;
        }
        "🔙 Back" if is_admin => {
            state.sessions.reset(user_id).await;
            let _ = bot
                .send_message(msg.chat.id, "👑 Admin panel\n\nPick an action:")
                .reply_markup(keyboards::admin_reply())
                .await;
        }

        // Content submenu.
        "📥 Add meme" if is_admin => {
            state.sessions.set(user_id, SessionState::AwaitingMemeUpload).await;
            let _ = bot.send_message(msg.chat.id, "📥 Send the meme (JPG/PNG):").await;
        }
        "🗑 Delete meme" if is_admin => {
            match state.templates.list_memes().await {
                Ok(memes) if memes.is_empty() => {
                    let _ = bot
                        .send_message(msg.chat.id, "No memes to delete.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(memes) => {
                    let mut lines = vec!["🗑 Memes (id — file):".to_string()];
                    for meme in memes {
                        let name = Path::new(&meme.file_path)
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or(meme.file_path.clone());
                        lines.push(format!("{} — {}", meme.id, name));
                    }
                    lines.push("\nSend the id of the meme to delete.".to_string());
                    state.sessions.set(user_id, SessionState::AwaitingMemeDeleteId).await;
                    let _ = bot.send_message(msg.chat.id, lines.join("\n")).await;
                }
                Err(e) => report_error(&bot, msg.chat.id, &e.into()).await,
            }
        }
        "✍️ Add text" if is_admin => {
            state.sessions.set(user_id, SessionState::AwaitingTextTemplate).await;
            let _ = bot.send_message(msg.chat.id, "✍️ Send the new task text:").await;
        }
        "🧾 List texts" if is_admin => {
            match state.templates.list_texts().await {
                Ok(texts_list) if texts_list.is_empty() => {
                    let _ = bot
                        .send_message(msg.chat.id, "No text templates yet.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(texts_list) => {
                    let mut lines = vec!["🧾 Texts (id — beginning):".to_string()];
                    for template in texts_list {
                        let snippet: String = template.text.chars().take(30).collect();
                        lines.push(format!("{} — {}", template.id, snippet));
                    }
                    lines.push("\nSend the id of the text to delete.".to_string());
                    state.sessions.set(user_id, SessionState::AwaitingTextDeleteId).await;
                    let _ = bot.send_message(msg.chat.id, lines.join("\n")).await;
                }
                Err(e) => report_error(&bot, msg.chat.id, &e.into()).await,
            }
        }
        "📋 List chats" if is_admin => {
            match state.chats.list_sorted().await {
                Ok(chats) if chats.is_empty() => {
                    let _ = bot
                        .send_message(msg.chat.id, "The chat list is empty.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(chats) => {
                    let listing: Vec<String> = chats
                        .iter()
                        .enumerate()
                        .map(|(i, chat)| format!("{}. {}", i + 1, chat))
                        .collect();
                    let _ = bot
                        .send_message(msg.chat.id, format!("📋 Chats:\n{}", listing.join("\n")))
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Err(e) => report_error(&bot, msg.chat.id, &e.into()).await,
            }
        }
        "➕ Add chat" if is_admin => {
            state.sessions.set(user_id, SessionState::AwaitingChatAdd).await;
            let _ = bot
                .send_message(msg.chat.id, "➕ Send @username, t.me/... or a full chat link:")
                .await;
        }
        "🗑 Delete chat" if is_admin => {
            match state.chats.list_sorted().await {
                Ok(chats) if chats.is_empty() => {
                    let _ = bot
                        .send_message(msg.chat.id, "No chats to delete.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(chats) => {
                    let listing: Vec<String> = chats
                        .iter()
                        .enumerate()
                        .map(|(i, chat)| format!("{}. {}", i + 1, chat))
                        .collect();
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            format!(
                                "🗑 Chats:\n{}\n\nSend the number to delete.",
                                listing.join("\n")
                            ),
                        )
                        .await;
                    state
                        .sessions
                        .set(user_id, SessionState::AwaitingChatDeleteIndex { chats })
                        .await;
                }
                Err(e) => report_error(&bot, msg.chat.id, &e.into()).await,
            }
        }

        // Promo offers submenu.
        "📥 Add offer" if is_admin => {
            state.sessions.set(user_id, SessionState::AwaitingOfferAdd).await;
            let _ = bot
                .send_message(msg.chat.id, "📥 Send the offer as: Title — cost (whole number)")
                .await;
        }
        "🗑 Delete offer" if is_admin => {
            match state.offers.list().await {
                Ok(offers) if offers.is_empty() => {
                    let _ = bot
                        .send_message(msg.chat.id, "No offers to delete.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(offers) => {
                    let mut lines = vec!["🗑 Offers (id — title — cost):".to_string()];
                    for offer in offers {
                        lines.push(format!("{} — {} — {}", offer.offer_id, offer.title, offer.cost));
                    }
                    lines.push("\nSend the id of the offer to delete.".to_string());
                    state.sessions.set(user_id, SessionState::AwaitingOfferDeleteId).await;
                    let _ = bot.send_message(msg.chat.id, lines.join("\n")).await;
                }
                Err(e) => report_error(&bot, msg.chat.id, &e.into()).await,
            }
        }
        "📋 List offers" if is_admin => {
            match state.offers.list().await {
                Ok(offers) if offers.is_empty() => {
                    let _ = bot
                        .send_message(msg.chat.id, "No offers yet.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(offers) => {
                    let mut lines = vec!["📋 Offers (id — title — cost):".to_string()];
                    for offer in offers {
                        lines.push(format!("{} — {} — {}", offer.offer_id, offer.title, offer.cost));
                    }
                    let _ = bot
                        .send_message(msg.chat.id, lines.join("\n"))
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Err(e) => report_error(&bot, msg.chat.id, &e.into()).await,
            }
        }

        "/check_loyalty" if is_admin => {
            run_manual_reconciliation(&bot, &state, msg.chat.id).await;
        }
        "/clear_cache" if is_admin => {
            state.subscription.clear_cache(None).await;
            let _ = bot
                .send_message(msg.chat.id, "✅ Subscription cache cleared for all users")
                .await;
        }
        "/db_status" if is_admin => {
            send_db_status(&bot, &state, msg.chat.id).await;
        }

        other => {
            // Commands that carry arguments.
            if let Some(arg) = other.strip_prefix("/debug_sub") {
                if is_admin {
                    handle_debug_sub(&bot, &state, msg.chat.id, arg.trim()).await;
                }
                return Ok(());
            }
            if let Some(arg) = other.strip_prefix("/clear_cache") {
                if is_admin {
                    match arg.trim().parse::<i64>() {
                        Ok(target) => {
                            state.subscription.clear_cache(Some(target)).await;
                            let _ = bot
                                .send_message(
                                    msg.chat.id,
                                    format!("✅ Subscription cache cleared for user {}", target),
                                )
                                .await;
                        }
                        Err(_) => {
                            let _ = bot
                                .send_message(msg.chat.id, "❌ Invalid user id. Send a number.")
                                .await;
                        }
                    }
                }
                return Ok(());
            }

            handle_session_text(&bot, &msg, &state, user_id, other).await;
        }
    }

    Ok(())
}

fn is_image_document(msg: &Message) -> bool {
    msg.document()
        .and_then(|doc| doc.mime_type.as_ref())
        .map(|mime| mime.to_string().starts_with("image/"))
        .unwrap_or(false)
}

async fn handle_start(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    from: &teloxide::types::User,
    text: &str,
) {
    let user_id = from.id.0 as i64;

    if !state.subscription.is_subscribed(bot, user_id).await {
        let _ = bot
            .send_message(
                msg.chat.id,
                texts::subscription_prompt(&state.cfg.channel_invite_link),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::subscription_check())
            .await;
        return;
    }

    let referrer = parse_start_param(text);
    run_onboarding(bot, state, msg.chat.id, from, referrer).await;
}

/// Shared between /start and the subscription re-check callback (where the
/// deep-link parameter is no longer available).
pub async fn run_onboarding(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    from: &teloxide::types::User,
    referrer: Option<i64>,
) {
    let user_id = from.id.0 as i64;

    let user = match state
        .users
        .get_or_create(
            user_id,
            from.username.as_deref(),
            Some(&from.first_name),
            from.last_name.as_deref(),
            None,
        )
        .await
    {
        Ok(user) => user,
        Err(e) => {
            error!("Failed to upsert user {} on /start: {:?}", user_id, e);
            return;
        }
    };

    // Keep the profile columns in sync with Telegram.
    let _ = state
        .users
        .update_profile_fields(
            user_id,
            from.username.as_deref(),
            Some(&from.first_name),
            from.last_name.as_deref(),
        )
        .await;

    if let Err(e) = scheduler::schedule(
        bot,
        state,
        JobKind::Reminder,
        user_id,
        None,
        Duration::minutes(state.cfg.reminder_minutes),
    )
    .await
    {
        warn!("Failed to schedule reminder for {}: {}", user_id, e);
    }

    if let Some(referrer_id) = referrer {
        if user.ref_by.is_none() && referrer_id != user_id {
            match state.referrals.attribute(user_id, referrer_id).await {
                Ok(attribution) => {
                    scheduler::arm(bot.clone(), state.clone(), attribution.check_job);
                    let _ = bot
                        .send_message(ChatId(referrer_id), texts::new_referral_notice())
                        .parse_mode(ParseMode::Html)
                        .await;
                }
                // Deep-link rejections (bad id, already attributed) stay silent.
                Err(e) => info!("Deep-link attribution for {} skipped: {}", user_id, e),
            }
        }
    }

    let is_admin = state.cfg.is_admin(user_id);
    let _ = bot
        .send_message(chat_id, texts::welcome_caption())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::main_reply(is_admin))
        .await;
    let _ = bot
        .send_message(chat_id, "Read our rules")
        .reply_markup(keyboards::rules_accept())
        .await;
}

async fn send_profile(bot: &Bot, state: &AppState, user_id: i64) {
    match state.users.get(user_id).await {
        Ok(Some(user)) => {
            let mut response = texts::profile(&user);
            response.push_str(&format!(
                "\n\n<b>🔗 Your referral link:</b>\n{}",
                texts::referral_link(&state.bot_username, user_id)
            ));
            let _ = bot
                .send_message(ChatId(user_id), response)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_inline())
                .await;
        }
        Ok(None) => {
            let _ = bot
                .send_message(ChatId(user_id), "Profile not found. Send /start first.")
                .await;
        }
        Err(e) => report_error(bot, ChatId(user_id), &e.into()).await,
    }
}

async fn send_stats(bot: &Bot, state: &AppState, chat_id: ChatId) {
    match state.stats.summary().await {
        Ok(summary) => {
            let _ = bot
                .send_message(chat_id, texts::stats(summary.today, summary.week, summary.total))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::users_file())
                .await;
        }
        Err(e) => report_error(bot, chat_id, &e).await,
    }
}

async fn send_db_status(bot: &Bot, state: &AppState, chat_id: ChatId) {
    match state.stats.db_status().await {
        Ok(status) => {
            let mut response = format!(
                "📊 <b>DATABASE STATUS</b>\n\n\
                 📁 File size: {} bytes\n\
                 👥 Users: {}\n\
                 🔍 Integrity: {}\n\n\
                 📅 <b>Latest users:</b>\n",
                status.file_size,
                status.user_count,
                if status.integrity_ok { "✅ OK" } else { "❌ FAILED" },
            );
            for (id, username, joined) in status.recent {
                response.push_str(&format!(
                    "   {} (@{}) — {}\n",
                    id,
                    username.as_deref().unwrap_or("none"),
                    joined.format("%Y-%m-%d %H:%M"),
                ));
            }
            let _ = bot
                .send_message(chat_id, response)
                .parse_mode(ParseMode::Html)
                .await;
        }
        Err(e) => report_error(bot, chat_id, &e).await,
    }
}

async fn handle_debug_sub(bot: &Bot, state: &AppState, chat_id: ChatId, arg: &str) {
    if arg.is_empty() {
        let _ = bot
            .send_message(
                chat_id,
                "🔍 Subscription diagnostic\n\nUsage: /debug_sub <user_id>\nExample: /debug_sub 123456789",
            )
            .await;
        return;
    }
    match arg.parse::<i64>() {
        Ok(target) => {
            let report = state.subscription.debug_report(bot, target).await;
            let _ = bot
                .send_message(chat_id, report)
                .parse_mode(ParseMode::Html)
                .await;
        }
        Err(_) => {
            let _ = bot
                .send_message(chat_id, "❌ Invalid user id. Send a number.")
                .await;
        }
    }
}

async fn run_manual_reconciliation(bot: &Bot, state: &AppState, chat_id: ChatId) {
    let _ = bot
        .send_message(chat_id, "🔍 Checking aged referrals, this may take a moment...")
        .await;

    let subscription = state.subscription.clone();
    let check_bot = bot.clone();
    let result = state
        .referrals
        .reconcile(move |referral_id| {
            let subscription = subscription.clone();
            let bot = check_bot.clone();
            async move { subscription.force_check(&bot, referral_id).await }
        })
        .await;

    match result {
        Ok(report) => {
            for (referrer_id, _) in &report.credited {
                let _ = bot
                    .send_message(ChatId(*referrer_id), texts::loyal_referral_notice())
                    .parse_mode(ParseMode::Html)
                    .await;
            }
            let _ = bot
                .send_message(
                    chat_id,
                    format!(
                        "✅ Check complete!\n📊 Processed: {}\n💖 Loyal referrals credited: {}",
                        report.processed,
                        report.credited.len(),
                    ),
                )
                .await;
        }
        Err(e) => report_error(bot, chat_id, &e).await,
    }
}

/// Free-text input routed by the session FSM.
async fn handle_session_text(bot: &Bot, msg: &Message, state: &AppState, user_id: i64, text: &str) {
    let session = state.sessions.get(user_id).await;
    let is_admin = state.cfg.is_admin(user_id);

    match session {
        SessionState::AwaitingPromoCode => {
            state.sessions.reset(user_id).await;
            match state.referrals.claim_promo_code(user_id, text).await {
                Ok(attribution) => {
                    scheduler::arm(bot.clone(), state.clone(), attribution.check_job);
                    let _ = bot
                        .send_message(ChatId(attribution.referrer_id), texts::new_referral_notice())
                        .parse_mode(ParseMode::Html)
                        .await;
                    let _ = bot
                        .send_message(msg.chat.id, texts::promo_activated())
                        .parse_mode(ParseMode::Html)
                        .reply_markup(keyboards::gift())
                        .await;
                }
                Err(e) => {
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
            }
        }

        SessionState::AwaitingCouponCode { task_id, user_id: task_user } if is_admin => {
            state.sessions.reset(user_id).await;
            let code = text.trim();
            match state.redemptions.approve_with_coupon(task_id, task_user, code).await {
                Ok(()) => {
                    let _ = bot
                        .send_message(
                            ChatId(task_user),
                            format!("🎉 Congratulations! Your coupon: {}", code),
                        )
                        .await;
                    let _ = bot
                        .send_message(msg.chat.id, "Coupon sent to the user.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Err(e) => {
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
            }
        }

        SessionState::AwaitingMemeDeleteId if is_admin => {
            match text.trim().parse::<i64>() {
                Ok(meme_id) => {
                    state.sessions.reset(user_id).await;
                    match state.templates.delete_meme(meme_id).await {
                        Ok(Some(file_path)) => {
                            if let Err(e) = std::fs::remove_file(&file_path) {
                                warn!("Could not remove meme file {}: {}", file_path, e);
                            }
                            let _ = bot
                                .send_message(msg.chat.id, "✅ Meme deleted.")
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Ok(None) => {
                            let _ = bot
                                .send_message(msg.chat.id, "❌ No meme with that id.")
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
                    }
                }
                Err(_) => {
                    let _ = bot
                        .send_message(msg.chat.id, "❌ Invalid id. Send the meme number to delete.")
                        .await;
                }
            }
        }

        SessionState::AwaitingTextTemplate if is_admin => {
            state.sessions.reset(user_id).await;
            match state.templates.add_text(text).await {
                Ok(_) => {
                    let _ = bot
                        .send_message(msg.chat.id, "✅ Text added.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
            }
        }

        SessionState::AwaitingTextDeleteId if is_admin => {
            match text.trim().parse::<i64>() {
                Ok(text_id) => {
                    state.sessions.reset(user_id).await;
                    match state.templates.delete_text(text_id).await {
                        Ok(true) => {
                            let _ = bot
                                .send_message(msg.chat.id, "✅ Text deleted.")
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Ok(false) => {
                            let _ = bot
                                .send_message(msg.chat.id, "❌ No text with that id.")
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
                    }
                }
                Err(_) => {
                    let _ = bot
                        .send_message(msg.chat.id, "❌ Invalid id. Send the text number to delete.")
                        .await;
                }
            }
        }

        SessionState::AwaitingChatAdd if is_admin => {
            let chat = text.trim();
            if !(chat.starts_with('@') || chat.starts_with("t.me/") || chat.starts_with("http")) {
                let _ = bot
                    .send_message(
                        msg.chat.id,
                        "❌ Wrong format. Send @username, t.me/... or a full chat link.",
                    )
                    .await;
                return;
            }
            state.sessions.reset(user_id).await;
            match state.chats.add(chat).await {
                Ok(_) => {
                    let _ = bot
                        .send_message(msg.chat.id, format!("✅ Chat {} added.", chat))
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
            }
        }

        SessionState::AwaitingChatDeleteIndex { chats } if is_admin => {
            match text.trim().parse::<usize>() {
                Ok(number) if number >= 1 && number <= chats.len() => {
                    state.sessions.reset(user_id).await;
                    let target = &chats[number - 1];
                    match state.chats.delete(target).await {
                        Ok(_) => {
                            let _ = bot
                                .send_message(msg.chat.id, format!("✅ Chat {} deleted.", target))
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
                    }
                }
                _ => {
                    let _ = bot
                        .send_message(msg.chat.id, "❌ Invalid number. Send one from the list.")
                        .await;
                }
            }
        }

        SessionState::AwaitingOfferAdd if is_admin => {
            let parsed = text
                .split_once('—')
                .or_else(|| text.split_once(" - "))
                .map(|(title, cost)| (title.trim(), cost.trim()));
            match parsed {
                Some((title, cost_str)) if !title.is_empty() => match cost_str.parse::<i64>() {
                    Ok(cost) if cost > 0 => {
                        state.sessions.reset(user_id).await;
                        match state.offers.create(title, cost).await {
                            Ok(_) => {
                                let _ = bot
                                    .send_message(
                                        msg.chat.id,
                                        format!("✅ Offer '{}' for {} loyal referrals added.", title, cost),
                                    )
                                    .reply_markup(keyboards::back_inline())
                                    .await;
                            }
                            Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
                        }
                    }
                    _ => {
                        let _ = bot
                            .send_message(
                                msg.chat.id,
                                "❌ Bad cost. Send a positive whole number after the dash.",
                            )
                            .await;
                    }
                },
                _ => {
                    let _ = bot
                        .send_message(msg.chat.id, "❌ Wrong format. Use: Title — cost")
                        .await;
                }
            }
        }

        SessionState::AwaitingOfferDeleteId if is_admin => {
            match text.trim().parse::<i64>() {
                Ok(offer_id) => {
                    state.sessions.reset(user_id).await;
                    match state.offers.delete(offer_id).await {
                        Ok(true) => {
                            let _ = bot
                                .send_message(msg.chat.id, format!("✅ Offer {} deleted.", offer_id))
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Ok(false) => {
                            let _ = bot
                                .send_message(msg.chat.id, "❌ No offer with that id.")
                                .reply_markup(keyboards::back_inline())
                                .await;
                        }
                        Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
                    }
                }
                Err(_) => {
                    let _ = bot
                        .send_message(msg.chat.id, "❌ Invalid id. Send the offer number to delete.")
                        .await;
                }
            }
        }

        SessionState::AwaitingBroadcastAll if is_admin => {
            state.sessions.reset(user_id).await;
            match state.broadcasts.broadcast_all(bot, text, None).await {
                Ok(report) => {
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            format!("Broadcast done: {} sent, {} errors.", report.sent, report.errors),
                        )
                        .await;
                }
                Err(e) => report_error(bot, msg.chat.id, &e).await,
            }
        }

        SessionState::AwaitingBroadcastUser if is_admin => {
            match state.broadcasts.send_single(bot, text, None).await {
                Ok(report) => {
                    state.sessions.reset(user_id).await;
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            format!("Broadcast done: {} sent, {} errors.", report.sent, report.errors),
                        )
                        .await;
                }
                // Bad format or unknown user: keep the flow open for re-entry.
                Err(e @ ServiceError::Validation(_)) | Err(e @ ServiceError::NotFound(_)) => {
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
                Err(e) => {
                    state.sessions.reset(user_id).await;
                    report_error(bot, msg.chat.id, &e).await;
                }
            }
        }

        _ => {
            // Unknown free text outside any flow is ignored.
        }
    }
}

/// Photo / image-document input routed by the session FSM.
async fn handle_media(bot: &Bot, msg: &Message, state: &AppState, user_id: i64) {
    let session = state.sessions.get(user_id).await;
    let is_admin = state.cfg.is_admin(user_id);

    let Some(file_id) = largest_photo_id(msg) else {
        return;
    };

    match session {
        SessionState::AwaitingScreenshot => {
            state.sessions.reset(user_id).await;

            let filename = format!("{}_{}.jpg", user_id, chrono::Utc::now().timestamp());
            let path = state.cfg.screenshots_dir.join(filename);
            if let Err(e) = download_file(bot, file_id, &path).await {
                error!("Failed to download screenshot from {}: {}", user_id, e);
                let _ = bot
                    .send_message(msg.chat.id, "❌ Couldn't save the screenshot, try again.")
                    .await;
                return;
            }

            match state
                .task_service
                .submit_screenshot(user_id, &path.to_string_lossy())
                .await
            {
                Ok(task_id) => {
                    let _ = bot
                        .send_message(msg.chat.id, texts::screenshot_received())
                        .parse_mode(ParseMode::Html)
                        .await;
                    notify_admins_of_submission(bot, state, user_id, task_id, &path).await;
                }
                Err(e) => {
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
            }
        }

        SessionState::AwaitingMemeUpload if is_admin => {
            state.sessions.reset(user_id).await;
            let filename = format!("meme_{}.jpg", chrono::Utc::now().timestamp_millis());
            let path = state.cfg.memes_dir.join(filename);
            if let Err(e) = download_file(bot, file_id, &path).await {
                error!("Failed to download meme upload: {}", e);
                let _ = bot
                    .send_message(msg.chat.id, "❌ Couldn't save the meme, try again.")
                    .await;
                return;
            }
            match state.templates.add_meme(&path.to_string_lossy(), "").await {
                Ok(_) => {
                    let _ = bot
                        .send_message(msg.chat.id, "✅ Meme added.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Err(e) => report_error(bot, msg.chat.id, &e.into()).await,
            }
        }

        SessionState::AwaitingBroadcastAll if is_admin => {
            state.sessions.reset(user_id).await;
            let caption = msg.caption().unwrap_or("").to_string();
            let path = state.cfg.screenshots_dir.join("broadcast_photo.jpg");
            if let Err(e) = download_file(bot, file_id, &path).await {
                error!("Failed to download broadcast photo: {}", e);
                return;
            }
            match state.broadcasts.broadcast_all(bot, &caption, Some(&path)).await {
                Ok(report) => {
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            format!("Broadcast done: {} sent, {} errors.", report.sent, report.errors),
                        )
                        .await;
                }
                Err(e) => report_error(bot, msg.chat.id, &e).await,
            }
        }

        SessionState::AwaitingBroadcastUser if is_admin => {
            state.sessions.reset(user_id).await;
            let caption = msg.caption().unwrap_or("").to_string();
            let path = state.cfg.screenshots_dir.join("broadcast_photo.jpg");
            if let Err(e) = download_file(bot, file_id, &path).await {
                error!("Failed to download broadcast photo: {}", e);
                return;
            }
            match state.broadcasts.send_single(bot, &caption, Some(&path)).await {
                Ok(report) => {
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            format!("Broadcast done: {} sent, {} errors.", report.sent, report.errors),
                        )
                        .await;
                }
                Err(e) => {
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
            }
        }

        _ => {
            // Unsolicited photos are ignored.
        }
    }
}

fn largest_photo_id(msg: &Message) -> Option<FileId> {
    if let Some(photos) = msg.photo() {
        return photos.last().map(|p| p.file.id.clone());
    }
    msg.document().map(|doc| doc.file.id.clone())
}

async fn download_file(bot: &Bot, file_id: FileId, dest: &PathBuf) -> anyhow::Result<()> {
    let file = bot.get_file(file_id).await?;
    let mut dst = tokio::fs::File::create(dest).await?;
    bot.download_file(&file.path, &mut dst).await?;
    Ok(())
}

async fn notify_admins_of_submission(
    bot: &Bot,
    state: &AppState,
    user_id: i64,
    task_id: i64,
    screenshot: &Path,
) {
    let username = state
        .users
        .get(user_id)
        .await
        .ok()
        .flatten()
        .and_then(|u| u.username)
        .unwrap_or_else(|| user_id.to_string());

    for admin_id in &state.cfg.admin_ids {
        let caption = format!(
            "📥 <b>New submission from @{}</b>\nTask id: {}",
            texts::escape_html(&username),
            task_id
        );
        if let Err(e) = bot
            .send_photo(ChatId(*admin_id), InputFile::file(screenshot.to_path_buf()))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::task_approval(task_id))
            .await
        {
            error!("Failed to notify admin {}: {}", admin_id, e);
        }
    }
}

pub async fn report_error(bot: &Bot, chat_id: ChatId, err: &ServiceError) {
    error!("Handler failure: {}", err);
    let _ = bot.send_message(chat_id, err.user_message()).await;
}
