//! Capture predicates and the request-level filter built from criteria.

use crate::capture::{CaptureArea, ChangeCapture, ContentMode, Operation};
use crate::context::StreamDirection;
use crate::error::{CdcError, CdcResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tessera_types::{ContainerKind, PrimaryKey};

/// Decides whether a capture is emitted.
///
/// The predicate always sees the header form of the capture; the body is
/// attached only after it accepts.
pub trait CapturePredicate {
    fn test(&self, capture: &ChangeCapture) -> bool;
}

impl<F> CapturePredicate for F
where
    F: Fn(&ChangeCapture) -> bool,
{
    fn test(&self, capture: &ChangeCapture) -> bool {
        self(capture)
    }
}

/// Accepts every capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CapturePredicate for AcceptAll {
    fn test(&self, _capture: &ChangeCapture) -> bool {
        true
    }
}

/// One alternative of a capture request. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureCriteria {
    #[serde(default)]
    pub area: Option<CaptureArea>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_primary_key: Option<PrimaryKey>,
    /// Empty means any operation.
    #[serde(default)]
    pub operations: BTreeSet<Operation>,
    /// Empty means any container.
    #[serde(default)]
    pub container_kinds: BTreeSet<ContainerKind>,
}

impl CaptureCriteria {
    #[must_use]
    pub fn area(area: CaptureArea) -> Self {
        Self {
            area: Some(area),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.entity_primary_key = Some(primary_key);
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.insert(operation);
        self
    }

    #[must_use]
    pub fn with_container_kind(mut self, kind: ContainerKind) -> Self {
        self.container_kinds.insert(kind);
        self
    }

    #[must_use]
    pub fn matches(&self, capture: &ChangeCapture) -> bool {
        self.area.is_none_or(|area| area == capture.area)
            && self
                .entity_type
                .as_deref()
                .is_none_or(|entity_type| capture.entity_type.as_deref() == Some(entity_type))
            && self
                .entity_primary_key
                .is_none_or(|primary_key| capture.entity_primary_key == Some(primary_key))
            && (self.operations.is_empty() || self.operations.contains(&capture.operation))
            && (self.container_kinds.is_empty()
                || self.container_kinds.contains(&capture.container_kind))
    }
}

/// What a change-capture consumer asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub since_version: Option<u64>,
    #[serde(default)]
    pub since_index: Option<u32>,
    /// Any of these must match; empty accepts everything.
    #[serde(default)]
    pub criteria: Vec<CaptureCriteria>,
    #[serde(default)]
    pub content: ContentMode,
}

impl CaptureRequest {
    /// Builds the filter for reading the stream in `direction`.
    pub fn filter(&self, direction: StreamDirection) -> CdcResult<CaptureFilter> {
        let since = match (self.since_version, self.since_index) {
            (Some(version), index) => Some((version, index.unwrap_or(0))),
            (None, None) => None,
            (None, Some(index)) => return Err(CdcError::IndexWithoutVersion(index)),
        };
        Ok(CaptureFilter {
            since,
            direction,
            criteria: self.criteria.clone(),
        })
    }
}

/// Position and criteria filter derived from a [`CaptureRequest`].
///
/// Reading forward accepts captures at or after `(since_version, since_index)`;
/// reading in reverse accepts captures at or before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFilter {
    since: Option<(u64, u32)>,
    direction: StreamDirection,
    criteria: Vec<CaptureCriteria>,
}

impl CaptureFilter {
    fn position_accepted(&self, capture: &ChangeCapture) -> bool {
        let Some(since) = self.since else {
            return true;
        };
        let position = (capture.version, capture.index).cmp(&since);
        match self.direction {
            StreamDirection::Forward => position != Ordering::Less,
            StreamDirection::Reverse => position != Ordering::Greater,
        }
    }
}

impl CapturePredicate for CaptureFilter {
    fn test(&self, capture: &ChangeCapture) -> bool {
        self.position_accepted(capture)
            && (self.criteria.is_empty() || self.criteria.iter().any(|it| it.matches(capture)))
    }
}
