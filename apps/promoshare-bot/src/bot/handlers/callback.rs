use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{error, info};

use promoshare_db::models::TaskKind;

use crate::bot::handlers::command::{report_error, run_onboarding};
use crate::bot::keyboards;
use crate::error::ServiceError;
use crate::session::SessionState;
use crate::state::AppState;
use crate::texts;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();
    let from = q.from.clone();
    let user_id = from.id.0 as i64;
    let chat_id = ChatId(user_id);
    let is_admin = state.cfg.is_admin(user_id);

    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    match data.as_str() {
        "check_subscription" => {
            if state.subscription.force_check(&bot, user_id).await {
                let _ = bot.answer_callback_query(callback_id).await;
                if let Some(msg) = q.message {
                    let _ = bot.delete_message(msg.chat().id, msg.id()).await;
                }
                // Deep-link parameter is gone by now; onboarding continues
                // without attribution.
                run_onboarding(&bot, &state, chat_id, &from, None).await;
            } else {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("You haven't joined the channel yet.")
                    .show_alert(true)
                    .await;
            }
        }

        "start_accept_rules" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            let _ = bot
                .send_message(chat_id, texts::rules())
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::rules_final_accept())
                .await;
        }

        "final_accept_rules" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            let _ = bot
                .send_message(chat_id, texts::main_screen())
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::main_reply(is_admin))
                .await;
        }

        "general_back" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
        }

        "participate" => {
            let _ = bot.answer_callback_query(callback_id).await;
            let _ = bot
                .send_message(chat_id, "Pick a task type:")
                .reply_markup(keyboards::participate())
                .await;
        }

        "task_meme" | "task_other_meme" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }

            let result = if data == "task_meme" {
                state.task_service.issue_meme(user_id).await.map(|(_, h)| h)
            } else {
                state.task_service.reroll_meme(user_id).await
            };

            match result {
                Ok(handout) => {
                    let _ = bot
                        .send_photo(chat_id, InputFile::file(std::path::PathBuf::from(&handout.file_path)))
                        .caption(handout.panel.clone())
                        .parse_mode(ParseMode::Html)
                        .await;
                    if handout.chats.is_empty() {
                        let _ = bot.send_message(chat_id, "No chats available yet.").await;
                    } else {
                        let _ = bot
                            .send_message(chat_id, "Chats where you can drop this meme:")
                            .reply_markup(keyboards::task_chats(&handout.chats, Some("task_other_meme")))
                            .await;
                    }
                }
                Err(e) => {
                    let _ = bot.send_message(chat_id, e.user_message()).await;
                }
            }
        }

        "task_text" | "task_other_text" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }

            let result = if data == "task_text" {
                state.task_service.issue_text(user_id).await.map(|(_, h)| h)
            } else {
                state.task_service.reroll_text(user_id).await
            };

            match result {
                Ok(handout) => {
                    let _ = bot
                        .send_message(chat_id, handout.body.clone())
                        .parse_mode(ParseMode::Html)
                        .await;
                    if handout.chats.is_empty() {
                        let _ = bot.send_message(chat_id, "No chats available yet.").await;
                    } else {
                        let _ = bot
                            .send_message(chat_id, "Send the text ⬆️ into any chat below:")
                            .reply_markup(keyboards::task_chats(&handout.chats, Some("task_other_text")))
                            .await;
                    }
                }
                Err(e) => {
                    let _ = bot.send_message(chat_id, e.user_message()).await;
                }
            }
        }

        "task_repost" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }

            match state.task_service.issue_repost(user_id).await {
                Ok((_, handout)) => {
                    if handout.chats.is_empty() {
                        let _ = bot.send_message(chat_id, "No chats available yet.").await;
                    } else {
                        let _ = bot
                            .send_message(chat_id, handout.body.clone())
                            .reply_markup(keyboards::task_chats(&handout.chats, None))
                            .await;
                    }
                }
                Err(e) => {
                    let _ = bot.send_message(chat_id, e.user_message()).await;
                }
            }
        }

        "task_back" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            match state.task_service.cancel_active(user_id).await {
                // A task was dropped: put the user back on task selection.
                Ok(true) => {
                    let _ = bot
                        .send_message(chat_id, "Pick a task type:")
                        .reply_markup(keyboards::participate())
                        .await;
                }
                Ok(false) => {}
                Err(e) => error!("Failed to cancel task for {}: {}", user_id, e),
            }
        }

        "task_done" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            state.sessions.set(user_id, SessionState::AwaitingScreenshot).await;
            let _ = bot
                .send_message(chat_id, "📸 <b>Send a screenshot of the completed task</b>")
                .parse_mode(ParseMode::Html)
                .await;
        }

        "promo_choose" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            let _ = bot
                .send_message(chat_id, texts::promo_intro())
                .parse_mode(ParseMode::Html)
                .await;

            match state.redemptions.list_offers().await {
                Ok(offers) if offers.is_empty() => {
                    let _ = bot
                        .send_message(chat_id, "No promos available yet, come back later.")
                        .reply_markup(keyboards::back_inline())
                        .await;
                }
                Ok(offers) => {
                    let _ = bot
                        .send_message(chat_id, "🛒 <b>PICK A REWARD</b>")
                        .parse_mode(ParseMode::Html)
                        .reply_markup(keyboards::promo_offers(&offers))
                        .await;
                }
                Err(e) => report_error(&bot, chat_id, &e).await,
            }
        }

        "promo_back" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
        }

        "get_gift" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            let _ = bot
                .send_message(chat_id, texts::gift(&state.cfg.gift_code))
                .parse_mode(ParseMode::Html)
                .await;
        }

        "get_users_file" => {
            if !is_admin {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("No access")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let _ = bot.answer_callback_query(callback_id).await;
            match state.stats.export_users_csv().await {
                Ok(path) => {
                    let _ = bot.send_document(chat_id, InputFile::file(path)).await;
                }
                Err(e) => report_error(&bot, chat_id, &e).await,
            }
        }

        "broadcast_all" if is_admin => {
            let _ = bot.answer_callback_query(callback_id).await;
            state.sessions.set(user_id, SessionState::AwaitingBroadcastAll).await;
            let _ = bot
                .send_message(
                    chat_id,
                    "Send the broadcast text, or a photo with the text as caption:",
                )
                .await;
        }

        "broadcast_user" if is_admin => {
            let _ = bot.answer_callback_query(callback_id).await;
            state.sessions.set(user_id, SessionState::AwaitingBroadcastUser).await;
            let _ = bot
                .send_message(chat_id, "Send: @username message text (photo caption works too):")
                .await;
        }

        "bc_cancel" if is_admin => {
            state.sessions.reset(user_id).await;
            let _ = bot
                .answer_callback_query(callback_id)
                .text("Broadcast cancelled")
                .await;
            if let Some(msg) = q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
        }

        offer if offer.starts_with("promo_offer|") => {
            handle_offer_selected(&bot, &state, &q, user_id, offer).await;
        }

        confirm if confirm.starts_with("promo_confirm|") => {
            handle_offer_confirmed(&bot, &state, &q, &from, confirm).await;
        }

        approve if approve.starts_with("approve_task|") => {
            if !is_admin {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("No access")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            handle_approval(&bot, &state, &q, user_id, approve, true).await;
        }

        decline if decline.starts_with("decline_task|") => {
            if !is_admin {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("No access")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            handle_approval(&bot, &state, &q, user_id, decline, false).await;
        }

        _ => {
            let _ = bot.answer_callback_query(callback_id).await;
        }
    }

    Ok(())
}

fn callback_arg(data: &str) -> Option<i64> {
    data.split_once('|').and_then(|(_, id)| id.parse().ok())
}

async fn handle_offer_selected(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    data: &str,
) {
    let chat_id = ChatId(user_id);
    let Some(offer_id) = callback_arg(data) else {
        let _ = bot.answer_callback_query(q.id.clone()).await;
        return;
    };
    let _ = bot.answer_callback_query(q.id.clone()).await;

    match state.redemptions.quote(user_id, offer_id).await {
        Ok(quote) => {
            if let Some(msg) = q.message.clone() {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            if quote.available < quote.offer.cost {
                let _ = bot
                    .send_message(chat_id, texts::shortfall(quote.available, quote.offer.cost))
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::back_inline())
                    .await;
            } else {
                let _ = bot
                    .send_message(
                        chat_id,
                        format!(
                            "Claim «{}» for {} loyal referrals?",
                            quote.offer.title, quote.offer.cost
                        ),
                    )
                    .reply_markup(keyboards::promo_confirm(offer_id))
                    .await;
            }
        }
        Err(e) => {
            let _ = bot
                .send_message(chat_id, e.user_message())
                .reply_markup(keyboards::back_inline())
                .await;
        }
    }
}

async fn handle_offer_confirmed(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    from: &teloxide::types::User,
    data: &str,
) {
    let user_id = from.id.0 as i64;
    let chat_id = ChatId(user_id);
    let Some(offer_id) = callback_arg(data) else {
        let _ = bot.answer_callback_query(q.id.clone()).await;
        return;
    };

    // The confirm step re-validates the balance inside the debit
    // transaction, so a stale quote cannot overspend.
    match state.redemptions.confirm(user_id, offer_id).await {
        Ok((task_id, offer)) => {
            let _ = bot.answer_callback_query(q.id.clone()).await;
            if let Some(msg) = q.message.clone() {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }

            let offer_line = format!("{} for {}💖", offer.title, offer.cost);

            for admin_id in &state.cfg.admin_ids {
                let _ = bot
                    .send_message(
                        ChatId(*admin_id),
                        format!(
                            "📥 <b>New promo request</b>\nFrom @{}\nOffer: {}\nTask id: {}",
                            texts::escape_html(from.username.as_deref().unwrap_or("none")),
                            texts::escape_html(&offer_line),
                            task_id
                        ),
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::task_approval(task_id))
                    .await;
            }

            let _ = bot
                .send_message(chat_id, "Your promo request is in review. Watch your profile.")
                .await;
        }
        Err(ServiceError::Validation(_)) => {
            let _ = bot
                .answer_callback_query(q.id.clone())
                .text("Not enough loyal referrals.")
                .show_alert(true)
                .await;
        }
        Err(e) => {
            let _ = bot.answer_callback_query(q.id.clone()).await;
            let _ = bot
                .send_message(chat_id, e.user_message())
                .reply_markup(keyboards::back_inline())
                .await;
        }
    }
}

async fn handle_approval(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    admin_id: i64,
    data: &str,
    approve: bool,
) {
    let admin_chat = ChatId(admin_id);
    let Some(task_id) = callback_arg(data) else {
        let _ = bot.answer_callback_query(q.id.clone()).await;
        return;
    };
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let task = match state.task_service.get(task_id).await {
        Ok(task) => task,
        Err(e) => {
            let _ = bot.send_message(admin_chat, e.user_message()).await;
            return;
        }
    };

    if approve {
        if let TaskKind::Promo { .. } = task.kind {
            // Promo approval needs a coupon code before the task settles.
            state
                .sessions
                .set(
                    admin_id,
                    SessionState::AwaitingCouponCode {
                        task_id,
                        user_id: task.user_id,
                    },
                )
                .await;
            let _ = bot
                .send_message(admin_chat, "Enter the coupon code for this promo:")
                .reply_markup(keyboards::back_inline())
                .await;
            return;
        }

        match state.task_service.approve(task_id).await {
            Ok(task) => {
                let _ = bot
                    .send_message(ChatId(task.user_id), texts::task_approved())
                    .parse_mode(ParseMode::Html)
                    .await;
            }
            Err(e) => {
                let _ = bot.send_message(admin_chat, e.user_message()).await;
                return;
            }
        }
    } else {
        match state.task_service.decline(task_id).await {
            Ok(task) => {
                let _ = bot
                    .send_message(ChatId(task.user_id), texts::task_declined())
                    .parse_mode(ParseMode::Html)
                    .await;
            }
            Err(e) => {
                let _ = bot.send_message(admin_chat, e.user_message()).await;
                return;
            }
        }
    }

    if let Some(msg) = q.message.clone() {
        let _ = bot.delete_message(msg.chat().id, msg.id()).await;
    }
}
