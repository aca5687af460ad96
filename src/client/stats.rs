use crate::event::RemoteEvent;

/// Running counters for the lifetime of a [`crate::SessionClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    events_received: u64,
    message_errors: u64,
    user_utterances: u64,
    bot_utterances: u64,
    tracks_bound: u64,
    frames_sent: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_event(&mut self, event: &RemoteEvent) {
        self.events_received += 1;
        match event {
            RemoteEvent::MessageError(_) => self.message_errors += 1,
            RemoteEvent::UserTranscript { is_final: true, .. } => self.user_utterances += 1,
            RemoteEvent::BotTranscript { .. } => self.bot_utterances += 1,
            _ => {}
        }
    }

    pub(crate) fn record_track_bound(&mut self) {
        self.tracks_bound += 1;
    }

    pub(crate) fn record_frame_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn events_received(&self) -> u64 {
        self.events_received
    }

    pub fn message_errors(&self) -> u64 {
        self.message_errors
    }

    pub fn user_utterances(&self) -> u64 {
        self.user_utterances
    }

    pub fn bot_utterances(&self) -> u64 {
        self.bot_utterances
    }

    pub fn tracks_bound(&self) -> u64 {
        self.tracks_bound
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_transcripts_are_not_utterances() {
        let mut stats = Stats::new();
        stats.record_event(&RemoteEvent::UserTranscript {
            text: "hel".to_string(),
            is_final: false,
        });
        stats.record_event(&RemoteEvent::UserTranscript {
            text: "hello".to_string(),
            is_final: true,
        });
        stats.record_event(&RemoteEvent::MessageError("bad".to_string()));

        assert_eq!(stats.events_received(), 3);
        assert_eq!(stats.user_utterances(), 1);
        assert_eq!(stats.message_errors(), 1);
    }
}
