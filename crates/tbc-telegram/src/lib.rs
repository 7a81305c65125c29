//! Telegram adapter (teloxide, Bot API).
//!
//! This crate implements the `tbc-core` DirectoryClient over the Telegram
//! Bot API: `getChat` resolves public usernames, `getChatMemberCount`
//! supplies the second phase.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use teloxide::{prelude::*, types::Recipient};

pub mod mapping;

use mapping::{map_request_error, ChatView};
use tbc_core::{
    directory::{DirectoryCapabilities, DirectoryClient, FullInfo, LookupOutcome, RawEntity},
    errors::Error,
    identifier::Identifier,
    Result,
};

pub struct TelegramDirectory {
    bot: Bot,
    closed: AtomicBool,
}

impl TelegramDirectory {
    /// Build a bot session and verify the token with `getMe`.
    pub async fn connect(token: &str, request_timeout: Duration) -> Result<Self> {
        let http: reqwest::Client = teloxide::net::default_reqwest_settings()
            .timeout(request_timeout)
            .build()
            .map_err(|e: reqwest::Error| {
                Error::External(format!("http client build failed: {e}"))
            })?;
        let bot = Bot::with_client(token, http);

        let me = bot
            .get_me()
            .await
            .map_err(|e| Error::External(format!("telegram session check failed: {e}")))?;
        tracing::info!(bot = %me.username(), "telegram session ready");

        Ok(Self {
            bot,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open<T>(&self) -> Option<LookupOutcome<T>> {
        self.closed
            .load(Ordering::SeqCst)
            .then(|| LookupOutcome::session_fatal("session closed"))
    }
}

#[async_trait]
impl DirectoryClient for TelegramDirectory {
    fn capabilities(&self) -> DirectoryCapabilities {
        DirectoryCapabilities {
            // Bots cannot preview invite links without joining.
            supports_invite_links: false,
            supports_full_info: true,
        }
    }

    async fn resolve(&self, id: &Identifier) -> LookupOutcome<RawEntity> {
        if let Some(closed) = self.ensure_open() {
            return closed;
        }
        let Some(username) = id.username() else {
            return LookupOutcome::permanent("invite links are not supported by this session");
        };

        match self
            .bot
            .get_chat(Recipient::ChannelUsername(format!("@{username}")))
            .await
        {
            Ok(chat) => LookupOutcome::Success(ChatView::from_chat(&chat).into_entity()),
            Err(e) => map_request_error(e),
        }
    }

    async fn fetch_full_info(&self, entity: &RawEntity) -> LookupOutcome<FullInfo> {
        if let Some(closed) = self.ensure_open() {
            return closed;
        }
        let Some(chat_id) = entity.handle().and_then(|h| h.0.parse::<i64>().ok()) else {
            return LookupOutcome::permanent("entity has no chat id");
        };

        match self
            .bot
            .get_chat_member_count(teloxide::types::ChatId(chat_id))
            .await
        {
            Ok(count) => LookupOutcome::Success(FullInfo {
                participants_count: Some(u64::from(count)),
                join_request_gate: None,
            }),
            Err(e) => map_request_error(e),
        }
    }

    async fn disconnect(&self) {
        // Bot API sessions are stateless; just refuse further calls.
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("telegram session closed");
        }
    }
}
