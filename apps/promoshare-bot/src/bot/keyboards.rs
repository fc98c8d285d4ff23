use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use promoshare_db::models::Offer;

use crate::bot::utils::make_chat_url;

pub fn main_reply(is_admin: bool) -> KeyboardMarkup {
    let mut rows = vec![
        vec![KeyboardButton::new("Tasks")],
        vec![
            KeyboardButton::new("👤 Profile"),
            KeyboardButton::new("ℹ️ Rules"),
            KeyboardButton::new("🛠 Support"),
        ],
        vec![
            KeyboardButton::new("🔥 Get Promo"),
            KeyboardButton::new("✅ Enter Promo"),
        ],
    ];
    if is_admin {
        rows.push(vec![KeyboardButton::new("Admin")]);
    }
    KeyboardMarkup::new(rows).resize_keyboard()
}

pub fn admin_reply() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new("Content"),
            KeyboardButton::new("Stats"),
        ],
        vec![
            KeyboardButton::new("Broadcast"),
            KeyboardButton::new("Promo Offers"),
        ],
        vec![KeyboardButton::new("Main")],
    ])
    .resize_keyboard()
}

pub fn content_reply() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new("📥 Add meme"),
            KeyboardButton::new("🗑 Delete meme"),
        ],
        vec![
            KeyboardButton::new("✍️ Add text"),
            KeyboardButton::new("🧾 List texts"),
        ],
        vec![KeyboardButton::new("📋 List chats")],
        vec![
            KeyboardButton::new("➕ Add chat"),
            KeyboardButton::new("🗑 Delete chat"),
        ],
        vec![KeyboardButton::new("🔙 Back")],
    ])
    .resize_keyboard()
}

pub fn promo_admin_reply() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new("📥 Add offer"),
            KeyboardButton::new("🗑 Delete offer"),
        ],
        vec![KeyboardButton::new("📋 List offers")],
        vec![KeyboardButton::new("🔙 Back")],
    ])
    .resize_keyboard()
}

pub fn back_inline() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔙 Back",
        "general_back",
    )]])
}

pub fn subscription_check() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Check subscription",
        "check_subscription",
    )]])
}

pub fn rules_accept() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "💡 Got it",
        "start_accept_rules",
    )]])
}

pub fn rules_final_accept() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ I've read them",
        "final_accept_rules",
    )]])
}

pub fn participate() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("🧠 Meme", "task_meme")],
        vec![InlineKeyboardButton::callback("🗣 Text", "task_text")],
        vec![InlineKeyboardButton::callback("📣 Repost", "task_repost")],
        vec![InlineKeyboardButton::callback("🔙 Back", "task_back")],
    ])
}

/// Chat link rows plus done/back/another controls.
pub fn task_chats(chats: &[String], another: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = chats
        .iter()
        .filter_map(|chat| {
            make_chat_url(chat)
                .parse()
                .ok()
                .map(|url| vec![InlineKeyboardButton::url(chat.clone(), url)])
        })
        .collect();

    let mut controls = vec![
        InlineKeyboardButton::callback("✅ Done", "task_done"),
        InlineKeyboardButton::callback("🔙 Back", "task_back"),
    ];
    if let Some(callback) = another {
        controls.push(InlineKeyboardButton::callback("🔄 Another", callback.to_string()));
    }
    rows.push(controls);

    InlineKeyboardMarkup::new(rows)
}

pub fn task_approval(task_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "✅ Approve",
            format!("approve_task|{}", task_id),
        )],
        vec![InlineKeyboardButton::callback(
            "❌ Decline",
            format!("decline_task|{}", task_id),
        )],
    ])
}

pub fn promo_choose() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "😚 Check",
        "promo_choose",
    )]])
}

pub fn promo_offers(offers: &[Offer]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = offers
        .iter()
        .map(|offer| {
            vec![InlineKeyboardButton::callback(
                format!("{} for {}💖", offer.title, offer.cost),
                format!("promo_offer|{}", offer.offer_id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🔙 Back", "promo_back")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn promo_confirm(offer_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Yes",
            format!("promo_confirm|{}", offer_id),
        )],
        vec![InlineKeyboardButton::callback("No", "promo_back")],
    ])
}

pub fn gift() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "👉 CLAIM 👈",
        "get_gift",
    )]])
}

pub fn broadcast_modes() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("Everyone", "broadcast_all"),
            InlineKeyboardButton::callback("One user", "broadcast_user"),
        ],
        vec![InlineKeyboardButton::callback("❌ Cancel", "bc_cancel")],
    ])
}

pub fn users_file() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Get users file",
        "get_users_file",
    )]])
}
