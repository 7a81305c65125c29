//! Telegram adapter over MTProto with a user session (grammers).
//!
//! Unlike the Bot API adapter this one can preview private invite links
//! (`messages.checkChatInvite`), sees the verified flag, and reads pending
//! join requests from `channels.getFullChannel`.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use grammers_tl_types as tl;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub mod mapping;

use mapping::{full_info, invite_entity, map_invocation_error, resolved_entity, PeerRef};
use tbc_core::{
    directory::{DirectoryCapabilities, DirectoryClient, FullInfo, LookupOutcome, RawEntity},
    errors::Error,
    identifier::Identifier,
    Result,
};

pub struct MtprotoDirectory {
    client: Client,
    session_file: PathBuf,
    closed: AtomicBool,
}

impl MtprotoDirectory {
    /// Open the session file (created if missing) and connect.
    ///
    /// An unauthorized session goes through an interactive login on the
    /// terminal: phone (unless given), login code, and 2FA password if the
    /// account has one.
    pub async fn connect(
        api_id: i32,
        api_hash: &str,
        session_file: &Path,
        phone: Option<&str>,
    ) -> Result<Self> {
        let session = Session::load_file_or_create(session_file).map_err(|e| {
            Error::External(format!(
                "failed to open session file {}: {e}",
                session_file.display()
            ))
        })?;
        let client = Client::connect(Config {
            session,
            api_id,
            api_hash: api_hash.to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| Error::External(format!("telegram connect failed: {e}")))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| Error::External(format!("telegram session check failed: {e}")))?;
        if !authorized {
            tracing::info!("session not authorized, starting login");
            sign_in(&client, phone).await?;
        }

        let dir = Self {
            client,
            session_file: session_file.to_path_buf(),
            closed: AtomicBool::new(false),
        };
        dir.save_session();
        tracing::info!(session = %dir.session_file.display(), "telegram user session ready");
        Ok(dir)
    }

    fn save_session(&self) {
        if let Err(e) = self.client.session().save_to_file(&self.session_file) {
            tracing::warn!(
                session = %self.session_file.display(),
                "failed to save session: {e}"
            );
        }
    }

    fn ensure_open<T>(&self) -> Option<LookupOutcome<T>> {
        self.closed
            .load(Ordering::SeqCst)
            .then(|| LookupOutcome::session_fatal("session closed"))
    }

    async fn resolve_username(&self, username: &str) -> LookupOutcome<RawEntity> {
        let request = tl::functions::contacts::ResolveUsername {
            username: username.to_string(),
        };
        match self.client.invoke(&request).await {
            Ok(tl::enums::contacts::ResolvedPeer::Peer(resolved)) => resolved_entity(&resolved),
            Err(e) => map_invocation_error(e),
        }
    }

    async fn check_invite(&self, hash: &str) -> LookupOutcome<RawEntity> {
        let request = tl::functions::messages::CheckChatInvite {
            hash: hash.to_string(),
        };
        match self.client.invoke(&request).await {
            Ok(invite) => invite_entity(&invite),
            Err(e) => map_invocation_error(e),
        }
    }
}

#[async_trait]
impl DirectoryClient for MtprotoDirectory {
    fn capabilities(&self) -> DirectoryCapabilities {
        DirectoryCapabilities {
            supports_invite_links: true,
            supports_full_info: true,
        }
    }

    async fn resolve(&self, id: &Identifier) -> LookupOutcome<RawEntity> {
        if let Some(closed) = self.ensure_open() {
            return closed;
        }
        match id {
            Identifier::Username(u) => self.resolve_username(u).await,
            Identifier::Invite(h) => self.check_invite(h).await,
        }
    }

    async fn fetch_full_info(&self, entity: &RawEntity) -> LookupOutcome<FullInfo> {
        if let Some(closed) = self.ensure_open() {
            return closed;
        }
        let Some(PeerRef::Channel { id, access_hash }) = entity.handle().and_then(PeerRef::parse)
        else {
            return LookupOutcome::permanent("no full info for this entity");
        };

        let request = tl::functions::channels::GetFullChannel {
            channel: tl::enums::InputChannel::Channel(tl::types::InputChannel {
                channel_id: id,
                access_hash,
            }),
        };
        match self.client.invoke(&request).await {
            Ok(tl::enums::messages::ChatFull::Full(full)) => {
                LookupOutcome::Success(full_info(&full.full_chat))
            }
            Err(e) => map_invocation_error(e),
        }
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.save_session();
            tracing::info!("telegram session closed");
        }
    }
}

async fn sign_in(client: &Client, phone: Option<&str>) -> Result<()> {
    let phone = match phone {
        Some(p) => p.to_string(),
        None => prompt("Phone number (international format): ").await?,
    };
    let token = client
        .request_login_code(&phone)
        .await
        .map_err(|e| Error::External(format!("login code request failed: {e}")))?;
    let code = prompt("Login code: ").await?;

    match client.sign_in(&token, &code).await {
        Ok(_) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt(&format!("2FA password (hint: {hint}): ")).await?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::External(format!("2FA check failed: {e}")))?;
        }
        Err(e) => return Err(Error::External(format!("sign in failed: {e}"))),
    }
    tracing::info!("signed in");
    Ok(())
}

/// Ask on stderr (stdout carries results) and read one line from stdin.
async fn prompt(message: &str) -> Result<String> {
    let io_err = |e: std::io::Error| Error::External(format!("terminal i/o failed: {e}"));

    let mut err = tokio::io::stderr();
    err.write_all(message.as_bytes()).await.map_err(io_err)?;
    err.flush().await.map_err(io_err)?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .map_err(io_err)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(Error::Config("login aborted: empty answer".to_string()));
    }
    Ok(line)
}
