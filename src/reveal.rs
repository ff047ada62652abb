//! Typed reveal: paces reply text to look like it is being typed.
//!
//! Each fragment received from the model is cut into groups of a few code
//! points; the renderer receives one group at a time with a short pause after
//! every full group.  The group sizes come from a [`GroupSizer`], so the
//! cutting is deterministic under test and random in the terminal.
//!
//! Pacing is presentation only.  The text handed to the renderer is always
//! the fragment itself, in order, with nothing dropped or repeated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::Renderer;
use crate::observability::REVEAL_GROUPS;

/// Smallest group the typing effect emits.
pub const MIN_GROUP: usize = 5;

/// Largest group the typing effect emits.
pub const MAX_GROUP: usize = 10;

/// Pause after each full group.
pub const GROUP_DELAY: Duration = Duration::from_millis(50);

/// Source of group sizes, in code points.
pub trait GroupSizer: Send {
    /// Size of the next group.  Zero is treated as one.
    fn next_size(&mut self) -> usize;
}

impl<F: FnMut() -> usize + Send> GroupSizer for F {
    fn next_size(&mut self) -> usize {
        self()
    }
}

/// Uniformly random group sizes in an inclusive range.
#[derive(Debug, Clone)]
pub struct RandomGroupSizer {
    rng: StdRng,
    min: usize,
    max: usize,
}

impl RandomGroupSizer {
    /// Sizes drawn from `[min, max]`, seeded from the OS.
    pub fn new(min: usize, max: usize) -> Self {
        Self::with_rng(StdRng::from_entropy(), min, max)
    }

    /// Sizes drawn from `[min, max]` with a fixed seed.
    pub fn seeded(seed: u64, min: usize, max: usize) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), min, max)
    }

    fn with_rng(rng: StdRng, min: usize, max: usize) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self { rng, min, max }
    }
}

impl GroupSizer for RandomGroupSizer {
    fn next_size(&mut self) -> usize {
        self.rng.gen_range(self.min..=self.max)
    }
}

/// One group of revealed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealGroup {
    /// The text of the group.
    pub text: String,
    /// Whether the group reached its drawn size and is followed by a pause.
    pub pause_after: bool,
}

/// Paces fragments onto a renderer.
pub struct Reveal {
    sizer: Box<dyn GroupSizer>,
    delay: Duration,
}

impl Reveal {
    /// Create a reveal from a sizer and an inter-group delay.
    pub fn new(sizer: impl GroupSizer + 'static, delay: Duration) -> Self {
        Self {
            sizer: Box::new(sizer),
            delay,
        }
    }

    /// The typing effect: random groups of 5 to 10 code points, 50ms apart.
    pub fn typing() -> Self {
        Self::new(RandomGroupSizer::new(MIN_GROUP, MAX_GROUP), GROUP_DELAY)
    }

    /// No effect: every fragment is shown whole, without pauses.
    pub fn immediate() -> Self {
        Self::new(|| usize::MAX, Duration::ZERO)
    }

    /// The delay after each full group.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cut one fragment into groups.
    ///
    /// Counting starts afresh for every fragment, so a fragment never shares a
    /// group with its neighbours.
    pub fn groups(&mut self, fragment: &str) -> Vec<RevealGroup> {
        let mut groups = Vec::new();
        let mut rest = fragment;
        while !rest.is_empty() {
            let size = self.sizer.next_size().max(1);
            let (split, taken) = match rest.char_indices().nth(size) {
                Some((idx, _)) => (idx, true),
                None => (rest.len(), rest.chars().count() == size),
            };
            let (head, tail) = rest.split_at(split);
            groups.push(RevealGroup {
                text: head.to_string(),
                pause_after: taken,
            });
            rest = tail;
        }
        groups
    }

    /// Reveal one fragment on the renderer.
    ///
    /// Stops early, returning `false`, once `interrupted` is raised; returns
    /// `true` when the whole fragment was shown.
    pub async fn emit(
        &mut self,
        fragment: &str,
        renderer: &mut dyn Renderer,
        interrupted: &AtomicBool,
    ) -> bool {
        for group in self.groups(fragment) {
            if interrupted.load(Ordering::Relaxed) {
                return false;
            }
            REVEAL_GROUPS.click();
            renderer.print_text(&group.text);
            if group.pause_after && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        true
    }
}

impl Default for Reveal {
    fn default() -> Self {
        Self::typing()
    }
}
