use shared::{Frame, VideoGroup};
use std::collections::HashMap;

/// Groups a ranked frame list by video. A group sits at the rank of its
/// first frame; frames keep their input order inside the group.
pub fn group_frames(frames: &[Frame]) -> Vec<VideoGroup> {
    let mut groups: Vec<VideoGroup> = Vec::new();
    let mut index_of: HashMap<&str, usize> = HashMap::new();

    for frame in frames {
        match index_of.get(frame.video_id.as_str()) {
            Some(&idx) => groups[idx].frames.push(frame.clone()),
            None => {
                index_of.insert(frame.video_id.as_str(), groups.len());
                groups.push(VideoGroup {
                    video_id: frame.video_id.clone(),
                    frames: vec![frame.clone()],
                });
            }
        }
    }

    groups
}

/// Group order first, then frame order.
pub fn flatten(groups: &[VideoGroup]) -> Vec<Frame> {
    groups.iter().flat_map(|g| g.frames.iter().cloned()).collect()
}
