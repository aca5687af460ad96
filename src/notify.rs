use tokio::sync::mpsc;

use crate::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Bot,
    System,
}

/// Everything the host UI is told about a session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StatusChanged { state: SessionState, message: String },
    ConversationEntry { speaker: Speaker, text: String },
    /// Audio is playing or the user is being heard.
    ActivityChanged { active: bool },
}

pub type NotificationRx = mpsc::UnboundedReceiver<Notification>;

pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
    active: bool,
}

impl Notifier {
    pub(crate) fn channel() -> (Self, NotificationRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, active: false }, rx)
    }

    pub(crate) fn status(&self, state: SessionState, message: &str) {
        self.emit(Notification::StatusChanged {
            state,
            message: message.to_string(),
        });
    }

    pub(crate) fn entry(&self, speaker: Speaker, text: &str) {
        self.emit(Notification::ConversationEntry {
            speaker,
            text: text.to_string(),
        });
    }

    /// Emits only when the indicator actually flips.
    pub(crate) fn activity(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.emit(Notification::ActivityChanged { active });
        }
    }

    fn emit(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_is_deduplicated() {
        let (mut notifier, mut rx) = Notifier::channel();

        notifier.activity(false);
        notifier.activity(true);
        notifier.activity(true);
        notifier.activity(false);

        assert_eq!(rx.try_recv().unwrap(), Notification::ActivityChanged { active: true });
        assert_eq!(rx.try_recv().unwrap(), Notification::ActivityChanged { active: false });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn serializes_for_host_uis() {
        let json = serde_json::to_value(Notification::ConversationEntry {
            speaker: Speaker::Bot,
            text: "hi".to_string(),
        })
        .unwrap();

        assert_eq!(json["type"], "conversation_entry");
        assert_eq!(json["speaker"], "bot");
    }
}
