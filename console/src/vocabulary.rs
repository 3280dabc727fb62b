//! Label set of the object detector used to index frames.

use lazy_static::lazy_static;
use std::collections::HashSet;

pub const OBJECT_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

lazy_static! {
    static ref LABEL_SET: HashSet<&'static str> = OBJECT_LABELS.iter().copied().collect();
}

pub fn is_known_label(label: &str) -> bool {
    LABEL_SET.contains(label)
}

/// Labels containing `search` (trimmed, case-insensitive) that are not
/// already selected, in vocabulary order.
pub fn suggest(search: &str, selected: &[String]) -> Vec<&'static str> {
    let needle = search.trim().to_lowercase();
    OBJECT_LABELS
        .iter()
        .copied()
        .filter(|label| label.contains(needle.as_str()))
        .filter(|label| !selected.iter().any(|s| s == label))
        .collect()
}
