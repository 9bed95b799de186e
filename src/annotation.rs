//! Read-only view of measurements owned by the external tool system.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::events::{EventBus, Subscription};

/// A stored measurement as exposed by the annotation store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "annotationUID")]
    pub annotation_uid: String,
    #[serde(default)]
    pub metadata: AnnotationMetadata,
    #[serde(default)]
    pub data: AnnotationData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationMetadata {
    #[serde(default)]
    pub tool_name: String,
    pub referenced_image_id: Option<String>,
    pub volume_id: Option<String>,
    pub sequence_index: Option<usize>,
    pub view_plane_normal: Option<[f64; 3]>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationData {
    #[serde(default)]
    pub handles: Handles,
    pub contour: Option<Contour>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Handles {
    pub points: Option<Vec<[f64; 3]>>,
    pub start: Option<[f64; 3]>,
    pub end: Option<[f64; 3]>,
}

/// Outline of region-of-interest tools.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    #[serde(default)]
    pub polyline: Vec<[f64; 3]>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationEvent {
    Added(String),
    Modified(String),
    Removed(String),
}

pub trait AnnotationStore {
    fn annotation(&self, annotation_uid: &str) -> Option<Annotation>;
    fn annotations(&self) -> Vec<Annotation>;
    fn on_change(&self, listener: Box<dyn Fn(&AnnotationEvent)>) -> Subscription;
}

/// In-process store standing in for the tool system's annotation state.
#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    annotations: RefCell<Vec<Annotation>>,
    events: EventBus<AnnotationEvent>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the annotation with the same UID.
    pub fn upsert(&self, annotation: Annotation) {
        let uid = annotation.annotation_uid.clone();
        let event = {
            let mut annotations = self.annotations.borrow_mut();
            match annotations
                .iter_mut()
                .find(|existing| existing.annotation_uid == uid)
            {
                Some(existing) => {
                    *existing = annotation;
                    AnnotationEvent::Modified(uid)
                }
                None => {
                    annotations.push(annotation);
                    AnnotationEvent::Added(uid)
                }
            }
        };
        self.events.emit(&event);
    }

    pub fn remove(&self, annotation_uid: &str) -> Option<Annotation> {
        let removed = {
            let mut annotations = self.annotations.borrow_mut();
            let index = annotations
                .iter()
                .position(|annotation| annotation.annotation_uid == annotation_uid)?;
            annotations.remove(index)
        };
        self.events
            .emit(&AnnotationEvent::Removed(annotation_uid.to_string()));
        Some(removed)
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn annotation(&self, annotation_uid: &str) -> Option<Annotation> {
        self.annotations
            .borrow()
            .iter()
            .find(|annotation| annotation.annotation_uid == annotation_uid)
            .cloned()
    }

    fn annotations(&self) -> Vec<Annotation> {
        self.annotations.borrow().clone()
    }

    fn on_change(&self, listener: Box<dyn Fn(&AnnotationEvent)>) -> Subscription {
        self.events.subscribe(listener)
    }
}
