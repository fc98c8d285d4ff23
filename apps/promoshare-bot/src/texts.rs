//! User-facing copy. Everything renders with Telegram HTML parse mode.

use promoshare_db::models::User;

pub fn welcome_caption() -> String {
    "🥷 <b>PromoShare — free rides for real!</b>\n\n\
     🎁 Coupons worth real money, no spending required — just bring friends!\n\n\
     👉 <i>Invite a friend → they stay in the channel \n<b>→ 💖 YOU GRAB A PROMO</b></i>\n\n\
     🔄 <i>More friends — better coupons!</i>\n\n\
     <b>Try it yourself, it's easier than it looks</b>‼️"
        .to_string()
}

pub fn rules() -> String {
    "<b>🛴 How does it work?</b>\n\n\
     <b>Simple:</b>\n\n\
     <i>1️⃣ Invite a friend with your personal link</i>\n\
     <i>2️⃣ The friend subscribes and stays in the channel for 3 days</i>\n\
     <i>3️⃣ You earn a point — points are real coupons</i>\n\n\
     <b>📌 Where to invite people?</b>\n\n\
     — <i>Drop ready-made memes and texts into chats</i>\n\
     — <i>Share your link with friends directly or in stories</i>\n\n\
     🤔 <b>Not sure how to invite?</b>\n\
     <b>The bot will walk you through it.</b>\n\n\
     <b>🚀 More friends — more promo codes!</b>"
        .to_string()
}

pub fn main_screen() -> String {
    "<b>🛑 Wait, wait, wait...</b>\n\
     👉 Got a <b>PROMO CODE</b>⁉️\n\n\
     <b>Enter it and grab a gift!</b>\n\n\
     ⬇️ Hit \"✅ Enter Promo\" below ⬇️"
        .to_string()
}

pub fn subscription_prompt(invite_link: &str) -> String {
    format!(
        "<b>✌️ Hey!</b>\n\n\
         <i>🔸 Before we go any further,\n\
         subscribe to our private channel.</i>\n\n\
         <b>That's where all the action and insider perks live!</b>\n\n\
         <b>☞ {}</b>",
        invite_link
    )
}

pub fn reminder() -> String {
    "⏱ <b>Why wait 3 days?</b>\n\
     You can grab a promo <b>right now</b>:\n\n\
     invite a friend and check your profile!"
        .to_string()
}

pub fn profile(user: &User) -> String {
    format!(
        "<b>💼 PROFILE:</b>\n\n\
         <b>👤 User:</b> @{}\n\
         <b>🆔 ID:</b> {}\n\n\
         <b>💰 Your referrals:</b> {}\n\
         <b>💕 LOYAL REFERRALS:</b> {}\n\
         <b>💔 Spent 💖:</b> {}\n\n\
         <b>🔥 Tasks completed:</b> {}\n\
         <b>⏳ Tasks in review:</b> {}\n\n\
         <b>🔑 Your promo code:</b> <code>{}</code>",
        user.username.as_deref().unwrap_or("none"),
        user.user_id,
        user.referrals_count,
        user.available_balance(),
        user.used_loyal,
        user.completed_tasks,
        user.pending_tasks,
        user.promo_code,
    )
}

pub fn referral_link(bot_username: &str, user_id: i64) -> String {
    format!("https://t.me/{}?start=ref_{}", bot_username, user_id)
}

pub fn task_panel(bot_username: &str, promo_code: &str) -> String {
    format!(
        "🔎 Find @{} on Telegram and\n\
         ‼️ enter this <b>PROMO:</b> <code>{}</code>\n\
         🎁 to claim your <b>GIFT</b>",
        bot_username, promo_code
    )
}

pub fn task_text(template_text: &str, bot_username: &str, promo_code: &str) -> String {
    format!("{}\n\n{}", template_text, task_panel(bot_username, promo_code))
}

pub fn new_referral_notice() -> String {
    "✅ <b>You have +1 new referral‼️</b>\n🎉 Check your profile".to_string()
}

pub fn loyal_referral_notice() -> String {
    "🎉 <b>YOUR REFERRAL BECAME LOYAL 💖</b>\n\
     <b>➖ Check your profile — maybe you can afford a promo now⁉️</b>"
        .to_string()
}

pub fn promo_intro() -> String {
    "💭 <b>WELL WELL WELL</b>\n\n\
     💥 <i>Here for the gifts already!</i>\n\n\
     🎁 <b>Here's what you can get:</b>\n<i>The price sits next to each title</i>\n\n\
     💖 <b>1 loyal referral = 1💖</b>\n\n\
     💕 A <b>loyal referral</b> is someone who stayed in the channel \
     for 3 days after following your link."
        .to_string()
}

pub fn shortfall(available: i64, cost: i64) -> String {
    format!(
        "🙈 <i>Oops, you don't have enough loyal referrals yet</i>\n\n\
         ➖ <b>You're at {}/{}</b>\n\n\
         🗣️ <b>Try inviting a few more</b>",
        available, cost
    )
}

pub fn task_approved() -> String {
    "😈 <b>NICELY DONE!\n\
     The ADMIN approved your task!</b>\n\n\
     📈 <i>Just a <b>LITTLE MORE</b> and you ride for free!!!</i>\n\n\
     ♦️ <b>Check your profile for incoming referrals</b> ♦️"
        .to_string()
}

pub fn task_declined() -> String {
    "<b>😕 OUCH, NOT THIS TIME</b>\n\n\
     ➖ <i>The admin didn't approve your task.\n\
     You may have missed a condition or forgotten the screenshot.</i>\n\n\
     ☑️ <b>Give it another go!</b>"
        .to_string()
}

pub fn screenshot_received() -> String {
    "<b>🔥 GOOD! Watch your profile for incoming referrals!</b>\n\n\
     <i>🤨 Not enough for a coupon?!</i>\n\
     <b>🗣️ Do another task or invite a friend!</b>"
        .to_string()
}

pub fn gift(gift_code: &str) -> String {
    format!(
        "🎁 <b>YOUR GIFT</b>\n\n\
         🎫 <b>PROMO:</b> <code>{}</code>\n\
         (⬆️ tap the code to copy ⬆️)\n\n\
         <i>Gives a</i> <b>50% DISCOUNT</b> <i>on your first 2 rides</i>",
        gift_code
    )
}

pub fn promo_activated() -> String {
    "✅ NICE! Your promo is <b>ACTIVATED</b>\n\n🎁 <b>A GIFT IS WAITING FOR YOU</b>".to_string()
}

pub fn stats(today: i64, week: i64, total: i64) -> String {
    format!(
        "PromoShare stats:\n\n\
         ➖ <b>Joined today:</b> {}\n\n\
         ➖ <b>Joined this week:</b> {}\n\n\
         🤙 <b>Total:</b> {}",
        today, week, total
    )
}

/// Minimal escaping for user-provided strings interpolated into HTML
/// messages.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escape_covers_angle_brackets_and_amp() {
        assert_eq!(escape_html("<b>&x</b>"), "&lt;b&gt;&amp;x&lt;/b&gt;");
    }

    #[test]
    fn referral_link_uses_ref_prefix() {
        assert_eq!(
            referral_link("promoshare_bot", 42),
            "https://t.me/promoshare_bot?start=ref_42"
        );
    }
}
