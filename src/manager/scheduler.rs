//! Per-bot background scheduler.
//!
//! Each managed bot gets its own `SchedulerHandle`: a cancellable ticker
//! that sends the daily good-morning message to subscribed chats. Created
//! alongside the client and torn down together with it.

use dashmap::DashSet;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::core::config;
use crate::telegram::adapter::BotClient;

const GREETINGS: &[&str] = &[
    "🌅 Good morning! Have a wonderful day ahead!",
    "🌞 Rise and shine! Wishing you a fantastic day!",
    "☀️ Good morning! Start your day with a smile!",
    "🌻 Good morning! May your day be filled with joy!",
    "☕ Good morning! Time to conquer the day!",
];

struct SchedulerInner {
    identity: String,
    subscribers: DashSet<i64>,
    cancel: CancellationToken,
}

/// Cheap-to-clone handle to one bot's scheduler state.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<SchedulerInner>,
}

impl SchedulerHandle {
    pub fn new(identity: &str) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                identity: identity.to_string(),
                subscribers: DashSet::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Toggle the good-morning subscription for a chat.
    /// Returns `true` when the chat is subscribed after the call.
    pub fn toggle_subscription(&self, chat_id: i64) -> bool {
        if self.inner.subscribers.remove(&chat_id).is_some() {
            false
        } else {
            self.inner.subscribers.insert(chat_id);
            true
        }
    }

    pub fn is_subscribed(&self, chat_id: i64) -> bool {
        self.inner.subscribers.contains(&chat_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Spawn the greeting ticker for this bot.
    ///
    /// The first immediate interval tick is skipped so a freshly started
    /// bot doesn't greet everyone at boot.
    pub fn start_ticker(&self, client: Arc<dyn BotClient>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = interval(config::scheduler::greeting_interval());
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => {
                        log::debug!("Scheduler for '{}' cancelled", inner.identity);
                        break;
                    }
                    _ = ticker.tick() => {
                        send_greetings(&inner, &client).await;
                    }
                }
            }
        });
    }

    /// Cancel the ticker task. Safe to call more than once.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

async fn send_greetings(inner: &SchedulerInner, client: &Arc<dyn BotClient>) {
    let chat_ids: Vec<i64> = inner.subscribers.iter().map(|id| *id).collect();
    if chat_ids.is_empty() {
        return;
    }

    let mut sent = 0usize;
    for chat_id in chat_ids {
        let text = GREETINGS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(GREETINGS[0]);

        match client.send_text(chat_id, text).await {
            Ok(()) => sent += 1,
            Err(e) => log::warn!(
                "Failed to send greeting from '{}' to chat {}: [{}] {}",
                inner.identity,
                chat_id,
                e.kind(),
                e
            ),
        }
    }

    if sent > 0 {
        log::info!("📤 Bot '{}' sent {} greeting(s)", inner.identity, sent);
    }
}
