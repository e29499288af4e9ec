//! Outbound notifications for presentation collaborators.
//!
//! The engine never renders text. It emits template keys plus arguments
//! and lets whoever reads the channel (chat, scoreboard, tab list) resolve
//! the wording. The channel is unbounded: the engine must never wait on a
//! slow display.

use tokio::sync::mpsc;

use crate::{Phase, PlayerId, Role};

/// An argument substituted into a message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateArg {
    Int(i64),
    Text(String),
}

impl From<i64> for TemplateArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for TemplateArg {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for TemplateArg {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for TemplateArg {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<String> for TemplateArg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for TemplateArg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Something a presentation collaborator should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A message for every online player.
    Broadcast {
        key: &'static str,
        args: Vec<TemplateArg>,
    },
    /// A message for one player.
    Direct {
        player: PlayerId,
        key: &'static str,
        args: Vec<TemplateArg>,
    },
    /// A player's role changed (or was re-applied).
    RoleChanged {
        player: PlayerId,
        old: Role,
        new: Role,
        refresh_display: bool,
    },
    /// The session phase changed.
    RoundStateChanged { phase: Phase },
}

/// Sending half of the notification channel.
///
/// Sends never fail from the caller's point of view: if nobody is
/// listening the notification is dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Creates a notifier and the receiver a collaborator reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn broadcast(&self, key: &'static str, args: Vec<TemplateArg>) {
        tracing::debug!(key, "broadcast");
        self.send(Notification::Broadcast { key, args });
    }

    pub fn direct(&self, player: PlayerId, key: &'static str, args: Vec<TemplateArg>) {
        self.send(Notification::Direct { player, key, args });
    }

    pub fn role_changed(&self, player: PlayerId, old: Role, new: Role, refresh_display: bool) {
        self.send(Notification::RoleChanged {
            player,
            old,
            new,
            refresh_display,
        });
    }

    pub fn round_state_changed(&self, phase: Phase) {
        self.send(Notification::RoundStateChanged { phase });
    }

    fn send(&self, notification: Notification) {
        // A closed receiver only means no display is attached.
        let _ = self.sender.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_delivers_key_and_args() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.broadcast("game.starting", vec![10u32.into()]);

        let got = rx.try_recv().unwrap();
        assert_eq!(
            got,
            Notification::Broadcast {
                key: "game.starting",
                args: vec![TemplateArg::Int(10)],
            }
        );
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.round_state_changed(Phase::Running);
    }
}
