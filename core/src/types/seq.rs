use serde::{Deserialize, Serialize};

/// Animation sequence timing. Only the fields the simulator reads are kept;
/// the frame transforms belong to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeqType {
    /// Ticks each frame stays on screen.
    pub frame_delays: Vec<i32>,
    /// Frames to rewind on loop; `-1` plays once.
    pub replay_offset: i32,
    pub replay_count: i32,
    pub priority: i32,
    /// Queued movement when the sequence starts: 0 = hold movement until it
    /// finishes, 1 = hold the sequence until the queued tiles are walked,
    /// 2 = do both at once.
    pub preanim_move: i32,
    /// Movement started while playing: 0 = hold movement, 1 = abort the
    /// sequence, 2 = do both at once.
    pub postanim_move: i32,
    /// 0 = ignore a repeat, 1 = restart, 2 = restart the loop count.
    pub replay_mode: i32,
}

impl Default for SeqType {
    fn default() -> Self {
        SeqType {
            frame_delays: Vec::new(),
            replay_offset: -1,
            replay_count: 99,
            priority: 5,
            preanim_move: 0,
            postanim_move: 0,
            replay_mode: 0,
        }
    }
}

impl SeqType {
    pub fn frame_count(&self) -> usize {
        self.frame_delays.len()
    }

    /// Delay of `frame`; out-of-range frames count as one tick so a stale
    /// frame index never stalls the advance loop.
    pub fn delay(&self, frame: i32) -> i32 {
        usize::try_from(frame)
            .ok()
            .and_then(|f| self.frame_delays.get(f))
            .copied()
            .unwrap_or(1)
            .max(1)
    }
}
