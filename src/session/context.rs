//! Identity of peers, channels and loop directions
//!
//! These small values travel with every log line and worker event so a
//! failure can be traced to the exact peer, channel and direction.

use std::fmt;

/// Identity of a connected participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Media channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Compressed images
    Video,
    /// Raw PCM sample blocks
    Audio,
}

impl ChannelKind {
    /// Both channels, in connection order
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Video, ChannelKind::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Video => "video",
            ChannelKind::Audio => "audio",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loop direction within a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

/// Where a channel loop runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopContext {
    pub peer: PeerId,
    pub kind: ChannelKind,
    pub direction: Direction,
}

impl fmt::Display for LoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.peer, self.kind, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ctx = LoopContext {
            peer: PeerId(1),
            kind: ChannelKind::Audio,
            direction: Direction::Receive,
        };
        assert_eq!(ctx.to_string(), "peer-1/audio/receive");
        assert_eq!(ChannelKind::ALL, [ChannelKind::Video, ChannelKind::Audio]);
    }
}
