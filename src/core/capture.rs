use crate::episode::{Episode, EPISODE_MAX_LEN};
use crate::ring::TickRing;
use crate::telemetry::TagMask;

/// Clamp a `(pre, post)` window so that `pre + post + 1 <= EPISODE_MAX_LEN`.
///
/// Each side is first clamped to `EPISODE_MAX_LEN - 1`; any remaining
/// overflow is taken out of `post` before `pre`.
pub fn sanitize_windows(pre: usize, post: usize) -> (usize, usize) {
    let limit = EPISODE_MAX_LEN - 1;
    let mut pre = pre.min(limit);
    let mut post = post.min(limit);
    let total = pre + post + 1;
    if total > EPISODE_MAX_LEN {
        let mut overflow = total - EPISODE_MAX_LEN;
        let from_post = overflow.min(post);
        post -= from_post;
        overflow -= from_post;
        pre -= overflow.min(pre);
    }
    (pre, post)
}

#[derive(Debug, Clone, Default)]
enum CaptureState {
    #[default]
    Idle,
    Capturing {
        episode: Episode,
        post_remaining: usize,
        last_seq: u64,
    },
}

/// Pre/post windowed capture driven by trigger tags.
///
/// Call [`EpisodeCapture::step`] once per control cycle after pushing the
/// cycle's tick. A non-zero tag while idle (and outside the debounce window)
/// seeds an episode with up to `pre` historical ticks plus the current one.
/// Subsequent steps drain newer ring entries until `post` of them have been
/// appended or the episode is full. Tags that arrive mid-capture are OR-ed
/// into the running mask; they never start a second capture.
#[derive(Debug, Clone)]
pub struct EpisodeCapture {
    pre: usize,
    post: usize,
    debounce: usize,
    state: CaptureState,
}

impl EpisodeCapture {
    pub fn new(pre: usize, post: usize) -> Self {
        let (pre, post) = sanitize_windows(pre, post);
        Self {
            pre,
            post,
            debounce: 0,
            state: CaptureState::Idle,
        }
    }

    pub fn pre(&self) -> usize {
        self.pre
    }

    pub fn post(&self) -> usize {
        self.post
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing { .. })
    }

    /// Cycles left before a new trigger is accepted.
    pub fn debounce_remaining(&self) -> usize {
        self.debounce
    }

    /// Post-window ticks still expected by the active capture.
    pub fn post_remaining(&self) -> Option<usize> {
        match &self.state {
            CaptureState::Capturing { post_remaining, .. } => Some(*post_remaining),
            CaptureState::Idle => None,
        }
    }

    /// Advance the state machine. Returns the finalized episode, if any.
    pub fn step<const N: usize>(&mut self, ring: &TickRing<N>, tag: TagMask) -> Option<Episode> {
        self.debounce = self.debounce.saturating_sub(1);

        let mut finished = None;
        if self.is_capturing() {
            if let CaptureState::Capturing { episode, .. } = &mut self.state {
                let merged = episode.tag() | tag;
                episode.set_tag(merged);
            }
            finished = self.progress(ring);
        }

        if !tag.is_empty() && !self.is_capturing() && self.debounce == 0 {
            if let Some(episode) = self.start(ring, tag) {
                finished = Some(episode);
            }
        }
        finished
    }

    fn start<const N: usize>(&mut self, ring: &TickRing<N>, tag: TagMask) -> Option<Episode> {
        if ring.is_empty() {
            return None;
        }
        let pre_count = self.pre.min(ring.len() - 1);

        let mut episode = Episode::new(tag);
        let mut last_seq = 0;
        for offset in (0..=pre_count).rev() {
            if let Some(entry) = ring.get_recent(offset) {
                if episode.push(entry.snapshot) {
                    last_seq = entry.seq;
                }
            }
        }

        if self.post == 0 {
            return Some(self.finalize(episode));
        }
        self.state = CaptureState::Capturing {
            episode,
            post_remaining: self.post,
            last_seq,
        };
        None
    }

    fn progress<const N: usize>(&mut self, ring: &TickRing<N>) -> Option<Episode> {
        let CaptureState::Capturing {
            episode,
            post_remaining,
            last_seq,
        } = &mut self.state
        else {
            return None;
        };

        let mut done = false;
        for entry in ring.entries_after(*last_seq) {
            episode.push(entry.snapshot);
            *last_seq = entry.seq;
            *post_remaining = post_remaining.saturating_sub(1);
            if *post_remaining == 0 || episode.is_full() {
                done = true;
                break;
            }
        }

        if !done {
            return None;
        }
        match std::mem::take(&mut self.state) {
            CaptureState::Capturing { episode, .. } => Some(self.finalize(episode)),
            CaptureState::Idle => None,
        }
    }

    fn finalize(&mut self, episode: Episode) -> Episode {
        self.state = CaptureState::Idle;
        self.debounce = self.post;
        episode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TickSnapshot;

    fn push_n(ring: &mut TickRing<256>, n: usize) {
        for i in 0..n {
            ring.push(TickSnapshot {
                amp: i as f32,
                ..TickSnapshot::default()
            });
        }
    }

    #[test]
    fn sanitize_windows_trims_post_first() {
        assert_eq!(sanitize_windows(24, 32), (24, 32));
        assert_eq!(sanitize_windows(100, 100), (100, 27));
        assert_eq!(sanitize_windows(127, 127), (127, 0));
        assert_eq!(sanitize_windows(usize::MAX, usize::MAX), (127, 0));
        assert_eq!(sanitize_windows(0, usize::MAX), (0, 127));

        for (pre, post) in [(0, 0), (64, 64), (200, 5), (5, 200), (127, 1)] {
            let (p, q) = sanitize_windows(pre, post);
            assert!(p + q + 1 <= EPISODE_MAX_LEN, "({pre},{post}) -> ({p},{q})");
        }
    }

    #[test]
    fn spike_with_two_pre_and_one_post() {
        let mut ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(2, 1);
        push_n(&mut ring, 5);

        assert!(cap.step(&ring, TagMask::SPIKE).is_none());
        assert!(cap.is_capturing());

        ring.push(TickSnapshot::default());
        let ep = cap.step(&ring, TagMask::NONE).expect("episode finalized");
        assert_eq!(ep.len(), 4);
        assert_eq!(ep.tag(), TagMask::SPIKE);
        let amps: Vec<f32> = ep.ticks().iter().map(|t| t.amp).collect();
        assert_eq!(amps, vec![2.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn short_history_clamps_pre_window() {
        let mut ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(10, 0);
        push_n(&mut ring, 3);

        let ep = cap.step(&ring, TagMask::ALIGN).expect("post=0 finalizes at once");
        assert_eq!(ep.len(), 3);
    }

    #[test]
    fn empty_ring_does_not_start() {
        let ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(2, 2);
        assert!(cap.step(&ring, TagMask::SPIKE).is_none());
        assert!(!cap.is_capturing());
    }

    #[test]
    fn mid_capture_tags_are_merged() {
        let mut ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(1, 3);
        push_n(&mut ring, 2);
        cap.step(&ring, TagMask::SPIKE);

        ring.push(TickSnapshot::default());
        assert!(cap.step(&ring, TagMask::LOW_HARM).is_none());
        ring.push(TickSnapshot::default());
        assert!(cap.step(&ring, TagMask::NONE).is_none());
        ring.push(TickSnapshot::default());
        let ep = cap.step(&ring, TagMask::NONE).unwrap();

        assert_eq!(ep.tag(), TagMask::SPIKE | TagMask::LOW_HARM);
        assert_eq!(ep.len(), 2 + 3);
    }

    #[test]
    fn drains_all_new_entries_in_one_step() {
        let mut ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(0, 4);
        push_n(&mut ring, 1);
        cap.step(&ring, TagMask::SPIKE);

        push_n(&mut ring, 3);
        assert!(cap.step(&ring, TagMask::NONE).is_none());
        assert_eq!(cap.post_remaining(), Some(1));

        push_n(&mut ring, 5);
        let ep = cap.step(&ring, TagMask::NONE).unwrap();
        assert_eq!(ep.len(), 5);
    }

    #[test]
    fn debounce_blocks_new_triggers() {
        let mut ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(0, 2);
        push_n(&mut ring, 1);
        cap.step(&ring, TagMask::SPIKE);
        push_n(&mut ring, 2);
        assert!(cap.step(&ring, TagMask::NONE).is_some());
        assert_eq!(cap.debounce_remaining(), 2);

        // Debounce ticks down on every step, triggers are ignored meanwhile.
        push_n(&mut ring, 1);
        assert!(cap.step(&ring, TagMask::ALIGN).is_none());
        assert!(!cap.is_capturing());
        assert_eq!(cap.debounce_remaining(), 1);

        push_n(&mut ring, 1);
        cap.step(&ring, TagMask::ALIGN);
        assert!(cap.is_capturing());
    }

    #[test]
    fn episode_never_exceeds_max_len() {
        let mut ring = TickRing::<256>::new();
        let mut cap = EpisodeCapture::new(100, 100);
        push_n(&mut ring, 200);
        cap.step(&ring, TagMask::SPIKE);

        let mut finished = None;
        for _ in 0..200 {
            push_n(&mut ring, 1);
            if let Some(ep) = cap.step(&ring, TagMask::SPIKE) {
                finished = Some(ep);
                break;
            }
        }
        let ep = finished.expect("capture completes");
        assert!(ep.len() <= EPISODE_MAX_LEN);
        assert_eq!(ep.len(), 101 + 27);
    }
}
