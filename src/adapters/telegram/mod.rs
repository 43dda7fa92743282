//! Telegram Bot API client.
//!
//! One thin client carries every Bot API call the service makes: invoice
//! links for Stars payments, invite links and member bans for channel
//! access, plain messages for notifications, and Stars refunds.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{channel_access::ChannelAccessPort, notifier::NotifierPort},
    application::use_cases::reconciliation::RefundPort,
};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    bot_token: SecretString,
}

/// Bot API envelope: `ok` + `result` on success, `description` on failure.
#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

impl TelegramApi {
    pub fn new(bot_token: SecretString) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");
        Self { client, bot_token }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            TELEGRAM_API_BASE,
            self.bot_token.expose_secret(),
            method
        )
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&params)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Telegram request failed: {}", e)))?;

        let status = response.status();
        let body: TgResponse<T> = response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("Failed to parse Telegram response: {}", e))
        })?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "unknown error".into());
            tracing::error!(method, %status, error_code = ?body.error_code, %description, "Telegram API error");
            return Err(match body.error_code {
                Some(429) => AppError::ProviderRateLimited,
                Some(code) if (500..600).contains(&code) => {
                    AppError::ProviderUnavailable(description)
                }
                _ => AppError::ProviderRejected(description),
            });
        }

        body.result
            .ok_or_else(|| AppError::ProviderUnavailable("Telegram response missing result".into()))
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    /// Invoice link for a Stars payment. Stars invoices use the `XTR`
    /// currency and an empty provider token.
    pub async fn create_invoice_link(
        &self,
        title: &str,
        description: &str,
        payload: &str,
        stars_amount: i64,
    ) -> AppResult<String> {
        self.call(
            "createInvoiceLink",
            json!({
                "title": title,
                "description": description,
                "payload": payload,
                "provider_token": "",
                "currency": "XTR",
                "prices": [{ "label": title, "amount": stars_amount }],
            }),
        )
        .await
    }

    /// Single-use invite link for the channel.
    pub async fn create_chat_invite_link(&self, chat_id: i64) -> AppResult<String> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                json!({ "chat_id": chat_id, "member_limit": 1 }),
            )
            .await?;
        Ok(link.invite_link)
    }

    pub async fn ban_chat_member(&self, chat_id: i64, user_id: i64) -> AppResult<()> {
        let _: bool = self
            .call(
                "banChatMember",
                json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        Ok(())
    }

    pub async fn unban_chat_member(&self, chat_id: i64, user_id: i64) -> AppResult<()> {
        let _: bool = self
            .call(
                "unbanChatMember",
                json!({ "chat_id": chat_id, "user_id": user_id, "only_if_banned": true }),
            )
            .await?;
        Ok(())
    }

    pub async fn refund_star_payment(
        &self,
        user_id: i64,
        telegram_charge_id: &str,
    ) -> AppResult<()> {
        let _: bool = self
            .call(
                "refundStarPayment",
                json!({
                    "user_id": user_id,
                    "telegram_payment_charge_id": telegram_charge_id,
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelAccessPort for TelegramApi {
    async fn grant(&self, channel_id: i64, telegram_id: i64) -> AppResult<String> {
        // Lift any earlier ban first so the invite link is usable.
        self.unban_chat_member(channel_id, telegram_id).await?;
        self.create_chat_invite_link(channel_id).await
    }

    async fn revoke(&self, channel_id: i64, telegram_id: i64) -> AppResult<()> {
        self.ban_chat_member(channel_id, telegram_id).await
    }
}

#[async_trait]
impl NotifierPort for TelegramApi {
    async fn notify(&self, telegram_id: i64, text: &str) -> AppResult<()> {
        self.send_message(telegram_id, text).await
    }
}

#[async_trait]
impl RefundPort for TelegramApi {
    async fn refund(&self, telegram_id: i64, charge_id: &str) -> AppResult<()> {
        self.refund_star_payment(telegram_id, charge_id).await
    }
}
