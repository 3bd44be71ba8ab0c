//! Dispatcher: routes each inbound event to cancel, a live session, a conversation entry or a
//! stateless handler, and delivers what the handler produces.
//!
//! Precedence, per event:
//! 1. `/cancel` ends every live session of the user in that chat.
//! 2. A live session whose state accepts the event resumes (families in registry order).
//! 3. An entry trigger starts a new session, replacing the family's old one.
//! 4. Stateless commands, buttons and scheduled jobs run.
//! 5. Anything else: a hint inside a session, otherwise ignored.
//!
//! Handler errors become one user-visible message and end the session; nothing here panics on a
//! bad event.

use async_trait::async_trait;
use std::sync::Arc;

use crate::channels::{
    ChannelHandle, ChannelRegistry, EventKind, InboundEvent, OutboundMessage, Outbox,
    TriggerTarget,
};
use crate::commands::CommandRegistry;
use crate::context::BotContext;
use crate::conversation::{self, Next};
use crate::error::BotError;
use crate::handlers::{self, CANCELLED, NOT_UNDERSTOOD};
use crate::scheduler::{EventSink, ScheduledJob};
use crate::session::{SessionKey, SessionStore};

pub struct Dispatcher {
    ctx: Arc<BotContext>,
    sessions: SessionStore,
    registry: Arc<CommandRegistry>,
    channels: Arc<ChannelRegistry>,
}

/// Delivers each message as soon as the handler produces it.
struct ChannelOutbox {
    channel_id: String,
    channel: Option<Arc<dyn ChannelHandle>>,
    failures: Vec<String>,
}

#[async_trait]
impl Outbox for ChannelOutbox {
    async fn push(&mut self, msg: OutboundMessage) {
        let Some(channel) = &self.channel else {
            self.failures
                .push(format!("channel {} not registered", self.channel_id));
            return;
        };
        if let Err(e) = channel.deliver(&msg).await {
            log::warn!("delivery to chat {} failed: {}", msg.chat_id, e);
            self.failures.push(e);
        }
    }

    fn failed_deliveries(&self) -> usize {
        self.failures.len()
    }
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<BotContext>,
        sessions: SessionStore,
        registry: Arc<CommandRegistry>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            ctx,
            sessions,
            registry,
            channels,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Route one event and collect its replies instead of delivering them.
    pub async fn route(&self, event: &InboundEvent) -> Vec<OutboundMessage> {
        let mut out: Vec<OutboundMessage> = Vec::new();
        let _ = self.route_into(event, &mut out).await;
        out
    }

    /// Route one event, pushing replies into `out` in order. An `Err` means a handler failed; its
    /// user-visible message has already been pushed.
    pub async fn route_into(
        &self,
        event: &InboundEvent,
        out: &mut dyn Outbox,
    ) -> Result<(), BotError> {
        let (chat, user) = (event.chat_id, event.user_id);

        if self.registry.is_cancel(&event.kind) {
            let removed = self.sessions.discard_user(chat, user).await;
            for s in &removed {
                log::info!("session {} ({}) cancelled", s.id, s.key.family.name());
            }
            out.push(OutboundMessage::plain(chat, CANCELLED).remove_keyboard())
                .await;
            return Ok(());
        }

        let live = self.sessions.live_for(chat, user).await;
        let in_session = !live.is_empty();

        if let Some(session) = live.into_iter().find(|s| s.state.accepts(&event.kind)) {
            let definition = session.key.family.definition();
            log::debug!("session {} ({}) resumes", session.id, definition.name);
            return match conversation::resume(session.state, &self.ctx, event, out).await {
                Ok(Next::End) => {
                    self.sessions.finish(&session.key, &session.id).await;
                    Ok(())
                }
                Ok(Next::Goto(state)) => {
                    if !self.sessions.advance(&session.key, &session.id, state).await {
                        log::debug!("session {} ended while its handler ran", session.id);
                    }
                    Ok(())
                }
                Err(e) => {
                    self.sessions.finish(&session.key, &session.id).await;
                    self.fail(definition.failure_prefix, e, event, true, out).await
                }
            };
        }

        if let Some(family) = self.registry.entry_family(&event.kind) {
            let key = SessionKey::new(chat, user, family);
            if let Some(old) = self.sessions.discard(&key).await {
                log::debug!("session {} ({}) replaced by a new entry", old.id, family.name());
            }
            return match conversation::enter(family, &self.ctx, event, out).await {
                Ok(Next::End) => Ok(()),
                Ok(Next::Goto(state)) => {
                    let id = self.sessions.start(key, state).await;
                    log::debug!("session {} ({}) started", id, family.name());
                    Ok(())
                }
                Err(e) => {
                    let prefix = family.definition().failure_prefix;
                    self.fail(prefix, e, event, true, out).await
                }
            };
        }

        if let Some(action) = self.registry.stateless_action(&event.kind) {
            return match handlers::run(action, &self.ctx, &self.registry, event, out).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let prefix = handlers::failure_prefix(action);
                    self.fail(prefix, e, event, false, out).await
                }
            };
        }

        if in_session {
            out.push(OutboundMessage::plain(chat, NOT_UNDERSTOOD)).await;
        } else {
            log::debug!("no handler for {:?} in chat {}", event.kind, chat);
        }
        Ok(())
    }

    /// Push the failure text. Conversation failures drop the reply keyboard; a failed button
    /// action replaces the clicked message so its buttons go away.
    async fn fail(
        &self,
        prefix: &str,
        err: BotError,
        event: &InboundEvent,
        remove_keyboard: bool,
        out: &mut dyn Outbox,
    ) -> Result<(), BotError> {
        log::warn!("{}: {}", prefix, err);
        let msg = OutboundMessage::plain(event.chat_id, handlers::failure_message(prefix, &err));
        let msg = if remove_keyboard {
            msg.remove_keyboard()
        } else {
            handlers::reply_to_click(event, msg)
        };
        out.push(msg).await;
        Err(err)
    }

    /// Route one event and deliver its replies through the event's channel. Failed scheduled
    /// jobs, including failed deliveries, are reported to the admin chat.
    pub async fn dispatch(&self, event: InboundEvent) {
        let mut outbox = ChannelOutbox {
            channel_id: event.channel_id.clone(),
            channel: self.channels.get(&event.channel_id).await,
            failures: Vec::new(),
        };
        let result = self.route_into(&event, &mut outbox).await;
        if !outbox.failures.is_empty() {
            log::warn!(
                "{} message(s) to chat {} not delivered",
                outbox.failures.len(),
                event.chat_id
            );
        }
        let EventKind::TimerFired(TriggerTarget::Job(job)) = event.kind else {
            return;
        };
        let mut details: Vec<String> = Vec::new();
        if let Err(e) = result {
            details.push(e.to_string());
        }
        details.extend(outbox.failures);
        if !details.is_empty() {
            self.report_job_failure(&event.channel_id, job, &details.join("; "))
                .await;
        }
    }

    async fn report_job_failure(&self, channel_id: &str, job: ScheduledJob, detail: &str) {
        log::error!("scheduled job {} failed: {}", job.name(), detail);
        let Some(admin) = self.ctx.admin_chat_id else {
            log::warn!("no admin chat configured; job failure not reported");
            return;
        };
        let Some(channel) = self.channels.get(channel_id).await else {
            return;
        };
        let report = OutboundMessage::markdown(admin, handlers::job_failure_report(job, detail));
        if let Err(e) = channel.deliver(&report).await {
            log::error!("reporting job failure to admin chat: {}", e);
        }
    }
}

#[async_trait]
impl EventSink for Dispatcher {
    async fn submit(&self, event: InboundEvent) {
        self.dispatch(event).await;
    }
}
