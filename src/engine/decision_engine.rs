//! Decision Engine for alert relevance

use crate::engine::object_detector::Detection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Fixed set of labels worth alerting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchList {
    labels: HashSet<String>,
}

impl WatchList {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Distinct watched labels among the detections, in first-occurrence order
    pub fn relevant_labels(&self, detections: &[Detection]) -> Vec<String> {
        let mut seen = HashSet::new();
        detections
            .iter()
            .map(|d| d.label.as_str())
            .filter(|label| self.contains(label) && seen.insert(*label))
            .map(str::to_string)
            .collect()
    }

    /// Build the alert for a capture, or `None` when nothing watched was found
    pub fn evaluate(&self, image_path: &Path, detections: &[Detection]) -> Option<AlertPayload> {
        let labels = self.relevant_labels(detections);
        if labels.is_empty() {
            None
        } else {
            Some(AlertPayload {
                labels,
                image_path: image_path.to_path_buf(),
            })
        }
    }
}

impl Default for WatchList {
    fn default() -> Self {
        Self::new(crate::DEFAULT_WATCH_LIST)
    }
}

/// What gets sent for one capture; never constructed with empty `labels`
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPayload {
    pub labels: Vec<String>,
    pub image_path: PathBuf,
}

impl AlertPayload {
    /// Summary line, e.g. `Detected: person, dog`
    pub fn message(&self) -> String {
        format!("Detected: {}", self.labels.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::object_detector::BoundingBox;

    fn detections(labels: &[&str]) -> Vec<Detection> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| Detection {
                label: label.to_string(),
                class_id: i,
                confidence: 0.9,
                bbox: BoundingBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
            })
            .collect()
    }

    #[test]
    fn test_duplicates_collapse_in_first_occurrence_order() {
        let watch_list = WatchList::default();
        let payload = watch_list
            .evaluate(Path::new("detected_x.jpg"), &detections(&["person", "dog", "person"]))
            .unwrap();

        assert_eq!(payload.labels, vec!["person", "dog"]);
        assert_eq!(payload.message(), "Detected: person, dog");
        assert_eq!(payload.image_path, PathBuf::from("detected_x.jpg"));
    }

    #[test]
    fn test_unwatched_labels_dropped() {
        let watch_list = WatchList::default();
        let labels = watch_list.relevant_labels(&detections(&["car", "cat", "bicycle", "horse", "cat"]));
        assert_eq!(labels, vec!["cat", "horse"]);
    }

    #[test]
    fn test_no_payload_without_watched_labels() {
        let watch_list = WatchList::default();
        assert!(watch_list.evaluate(Path::new("a.jpg"), &detections(&["bicycle"])).is_none());
        assert!(watch_list.evaluate(Path::new("a.jpg"), &[]).is_none());
    }

    #[test]
    fn test_custom_watch_list() {
        let watch_list = WatchList::new(vec!["bird".to_string()]);
        assert!(!watch_list.contains("person"));
        let payload = watch_list
            .evaluate(Path::new("a.jpg"), &detections(&["person", "bird"]))
            .unwrap();
        assert_eq!(payload.message(), "Detected: bird");
    }
}
