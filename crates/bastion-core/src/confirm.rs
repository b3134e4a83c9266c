//! Reaction-driven confirmation prompts.
//!
//! A prompt message gets one reaction per choice. The requester picks one by
//! reacting; if nobody does before the timeout, the default choice applies.
//! Either way the finish callback runs exactly once with the chosen action.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::platform::{ChatPlatform, MessageRef, ReactionKind, UserId};
use crate::reactions::{ReactionHub, ReactionOutcome, ReactionWaitSpec};

#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("confirmation prompt has no choices")]
    NoChoices,
}

/// How the prompt reflects the decision afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    /// Delete the prompt before running the finish callback.
    DeletePrompt,
    /// After the finish callback, remove every reaction except the chosen one.
    KeepChosen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prompted,
    Deciding,
    Resolved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prompted => "prompted",
            Phase::Deciding => "deciding",
            Phase::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice<A> {
    pub emoji: String,
    pub action: A,
}

/// A prompt waiting for its requester's decision.
#[derive(Debug, Clone)]
pub struct PendingConfirmation<A> {
    prompt: MessageRef,
    requester: UserId,
    timeout: Duration,
    choices: Vec<Choice<A>>,
    default: Option<usize>,
    feedback: Feedback,
}

impl<A: Clone> PendingConfirmation<A> {
    pub fn new(prompt: MessageRef, requester: UserId, timeout: Duration) -> Self {
        Self {
            prompt,
            requester,
            timeout,
            choices: Vec::new(),
            default: None,
            feedback: Feedback::DeletePrompt,
        }
    }

    /// Adds a choice. Reactions are attached in the order choices are added.
    #[must_use]
    pub fn choice(mut self, emoji: impl Into<String>, action: A) -> Self {
        self.choices.push(Choice {
            emoji: emoji.into(),
            action,
        });
        self
    }

    /// Adds the choice that applies on timeout.
    #[must_use]
    pub fn default_choice(mut self, emoji: impl Into<String>, action: A) -> Self {
        self.default = Some(self.choices.len());
        self.choice(emoji, action)
    }

    #[must_use]
    pub fn feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn prompt(&self) -> MessageRef {
        self.prompt
    }

    pub fn choices(&self) -> &[Choice<A>] {
        &self.choices
    }

    /// The timeout choice; the last one when none was marked.
    pub fn default(&self) -> Option<&Choice<A>> {
        match self.default {
            Some(index) => self.choices.get(index),
            None => self.choices.last(),
        }
    }

    fn lookup(&self, emoji: &str) -> Option<&Choice<A>> {
        self.choices.iter().find(|choice| choice.emoji == emoji)
    }

    fn wait_spec(&self) -> ReactionWaitSpec {
        ReactionWaitSpec::new(
            self.prompt.channel_id,
            self.prompt.message_id,
            ReactionKind::Add,
            self.timeout,
        )
        .author(self.requester)
        .emojis(self.choices.iter().map(|choice| choice.emoji.clone()))
    }
}

/// The decision a confirmation ended with.
#[derive(Debug)]
pub struct Resolution<A> {
    pub emoji: String,
    pub action: A,
    pub timed_out: bool,
    /// Error returned by the finish callback, already logged.
    pub finish_error: Option<anyhow::Error>,
}

impl<A> Resolution<A> {
    pub fn finished(&self) -> bool {
        self.finish_error.is_none()
    }
}

/// Runs confirmation prompts against a platform and a reaction hub.
pub struct ConfirmationFlow<'a> {
    platform: &'a dyn ChatPlatform,
    hub: &'a ReactionHub,
}

impl<'a> ConfirmationFlow<'a> {
    pub fn new(platform: &'a dyn ChatPlatform, hub: &'a ReactionHub) -> Self {
        Self { platform, hub }
    }

    /// Attaches the choice reactions, waits for a decision and runs `finish`
    /// with the chosen action.
    ///
    /// The monitor is opened before any reaction is attached, so a requester
    /// who reacts early is not missed. Reactions that fail to attach are
    /// skipped. Errors from `finish` are logged and returned in the
    /// [`Resolution`]; they never abort the flow.
    pub async fn run<A, F, Fut>(
        &self,
        pending: PendingConfirmation<A>,
        finish: F,
    ) -> Result<Resolution<A>, ConfirmError>
    where
        A: Clone + fmt::Debug,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let default = pending.default().cloned().ok_or(ConfirmError::NoChoices)?;
        let prompt = pending.prompt();

        let mut monitor = self.hub.open(pending.wait_spec());
        tracing::debug!(phase = %Phase::Prompted, ?prompt, "confirmation opened");
        for choice in pending.choices() {
            if let Err(err) = self.platform.add_reaction(prompt, &choice.emoji).await {
                tracing::warn!(?prompt, emoji = %choice.emoji, "failed to attach reaction: {err}");
            }
        }

        tracing::debug!(phase = %Phase::Deciding, ?prompt, timeout = ?monitor.timeout());
        let outcome = monitor.wait().await;
        drop(monitor);

        let (chosen, timed_out) = match outcome {
            ReactionOutcome::Matched { emoji, .. } => match pending.lookup(&emoji) {
                Some(choice) => (choice.clone(), false),
                None => (default, false),
            },
            ReactionOutcome::TimedOut => (default, true),
        };
        tracing::debug!(
            phase = %Phase::Resolved,
            ?prompt,
            emoji = %chosen.emoji,
            action = ?chosen.action,
            timed_out,
        );

        if pending.feedback == Feedback::DeletePrompt {
            self.quietly("delete prompt", self.platform.delete_message(prompt))
                .await;
        }

        let finish_error = match finish(chosen.action.clone()).await {
            Ok(()) => None,
            Err(err) => {
                tracing::error!(
                    ?prompt,
                    action = ?chosen.action,
                    "confirmation action failed: {err:#}"
                );
                Some(err)
            }
        };

        if pending.feedback == Feedback::KeepChosen {
            for choice in pending.choices() {
                if choice.emoji != chosen.emoji {
                    self.quietly(
                        "remove reaction",
                        self.platform.remove_own_reaction(prompt, &choice.emoji),
                    )
                    .await;
                }
            }
        }

        Ok(Resolution {
            emoji: chosen.emoji,
            action: chosen.action,
            timed_out,
            finish_error,
        })
    }

    /// Runs a follow-up update; a vanished target is expected and ignored.
    async fn quietly<Fut>(&self, what: &str, update: Fut)
    where
        Fut: Future<Output = crate::platform::PlatformResult<()>>,
    {
        match update.await {
            Ok(()) => {}
            Err(err) if err.is_gone() => {
                tracing::debug!("{what} skipped: {err}");
            }
            Err(err) => tracing::warn!("{what} failed: {err}"),
        }
    }
}
