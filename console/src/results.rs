use shared::{Frame, VideoGroup};
use std::sync::Arc;
use strum::{Display, EnumString};
use tokio::sync::watch;

use crate::grouping::group_frames;

/// Latest flat result list and its per-video grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub frames: Vec<Frame>,
    pub videos: Vec<VideoGroup>,
}

impl ResultSet {
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        let videos = group_frames(&frames);
        Self { frames, videos }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ResultView {
    #[default]
    Videos,
    Frames,
}

#[derive(Clone)]
pub struct ResultStore {
    current: Arc<watch::Sender<Arc<ResultSet>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(ResultSet::default()));
        Self {
            current: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> Arc<ResultSet> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ResultSet>> {
        self.current.subscribe()
    }

    /// Replaces both forms at once so observers never see them disagree.
    pub fn replace(&self, frames: Vec<Frame>) {
        let set = ResultSet::from_frames(frames);
        log::debug!(
            "Result store replaced: {} frames in {} videos",
            set.frames.len(),
            set.videos.len()
        );
        self.current.send_replace(Arc::new(set));
    }

    pub fn clear(&self) {
        self.current.send_replace(Arc::new(ResultSet::default()));
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}
