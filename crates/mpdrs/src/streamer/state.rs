/// Coarse relay phase derived from [`StreamFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Disconnected,
    Connected,
    Streaming,
    Buffering,
    Writing,
}

/// Relay flags as reported in every acknowledgement.
///
/// `writing` implies `streaming`, `streaming` implies `connected`,
/// `buffering` implies `streaming`, and `buffering` and `writing` are never
/// both set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    /// A fetch connection to the HTTP origin is open.
    pub connected: bool,
    /// Playback was requested and has not been paused or stopped.
    pub streaming: bool,
    /// Accumulating audio before the first sink write.
    pub buffering: bool,
    /// Passing received audio straight to the sink.
    pub writing: bool,
}

impl StreamFlags {
    pub fn phase(&self) -> StreamPhase {
        if self.writing {
            StreamPhase::Writing
        } else if self.buffering {
            StreamPhase::Buffering
        } else if self.streaming {
            StreamPhase::Streaming
        } else if self.connected {
            StreamPhase::Connected
        } else {
            StreamPhase::Disconnected
        }
    }

    pub fn is_consistent(&self) -> bool {
        (!self.writing || self.streaming)
            && (!self.streaming || self.connected)
            && (!self.buffering || self.streaming)
            && !(self.buffering && self.writing)
    }

    /// Buffering or writing.
    pub fn is_active(&self) -> bool {
        self.buffering || self.writing
    }

    pub(crate) fn start_buffering(&mut self) {
        self.streaming = true;
        self.buffering = true;
        self.writing = false;
    }

    pub(crate) fn start_writing(&mut self) {
        self.buffering = false;
        self.writing = true;
    }

    /// Streaming was requested but the sink is unusable; received audio is drained.
    pub(crate) fn stall(&mut self) {
        self.buffering = false;
        self.writing = false;
    }

    /// Keep the connection, drop everything above it.
    pub(crate) fn halt(&mut self) {
        self.streaming = false;
        self.buffering = false;
        self.writing = false;
    }

    pub(crate) fn disconnect(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_reports_the_highest_flag() {
        let mut flags = StreamFlags::default();
        assert_eq!(flags.phase(), StreamPhase::Disconnected);
        flags.connected = true;
        assert_eq!(flags.phase(), StreamPhase::Connected);
        flags.start_buffering();
        assert_eq!(flags.phase(), StreamPhase::Buffering);
        flags.start_writing();
        assert_eq!(flags.phase(), StreamPhase::Writing);
        flags.stall();
        assert_eq!(flags.phase(), StreamPhase::Streaming);
        flags.halt();
        assert_eq!(flags.phase(), StreamPhase::Connected);
        flags.disconnect();
        assert_eq!(flags.phase(), StreamPhase::Disconnected);
    }

    #[test]
    fn transitions_from_connected_stay_consistent() {
        let mut flags = StreamFlags {
            connected: true,
            ..StreamFlags::default()
        };
        let steps: [fn(&mut StreamFlags); 5] = [
            StreamFlags::start_buffering,
            StreamFlags::start_writing,
            StreamFlags::stall,
            StreamFlags::halt,
            StreamFlags::disconnect,
        ];
        for step in steps {
            step(&mut flags);
            assert!(flags.is_consistent(), "{flags:?}");
        }
    }

    #[test]
    fn detects_inconsistent_combinations() {
        let writing_unconnected = StreamFlags {
            streaming: true,
            writing: true,
            ..StreamFlags::default()
        };
        assert!(!writing_unconnected.is_consistent());
        let both = StreamFlags {
            connected: true,
            streaming: true,
            buffering: true,
            writing: true,
        };
        assert!(!both.is_consistent());
    }
}
