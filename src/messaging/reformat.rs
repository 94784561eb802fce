use crate::models::message::{ RichMessage, SmsContent };

pub const DEFAULT_TEXT_LIMIT: usize = 1500;
const TRUNCATION_NOTE: &str = "...\n(Message truncated, see app for full content)";

/// Flattens a rich message into SMS text and at most one media URL.
pub fn reformat_for_sms_mms(message: &RichMessage, text_limit: usize) -> SmsContent {
    let mut text = String::new();
    let mut media_urls = Vec::new();

    if let Some(body) = &message.text {
        text.push_str(body);
        text.push_str("\n\n");
    }

    for card in &message.cards {
        if let Some(title) = &card.title {
            text.push_str(title);
            text.push('\n');
        }
        if let Some(subtitle) = &card.subtitle {
            text.push_str(subtitle);
            text.push('\n');
        }
        if let Some(url) = &card.media_url {
            media_urls.push(url.clone());
        }
        for button in &card.buttons {
            match button.kind.as_str() {
                "openUrl" | "call" => {
                    text.push_str(&format!("• {}: {}\n", button.title, button.payload));
                }
                _ => {
                    text.push_str(&format!("• {}\n", button.title));
                }
            }
        }
    }

    if !message.quick_replies.is_empty() {
        text.push_str("\nOptions:\n");
        for (i, qr) in message.quick_replies.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, qr.title));
        }
    }

    if text.chars().count() > text_limit {
        text = text.chars().take(text_limit).collect::<String>() + TRUNCATION_NOTE;
    }

    media_urls.truncate(1);
    SmsContent {
        text: text.trim().to_string(),
        media_urls,
    }
}
