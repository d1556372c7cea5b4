//! Arm and vocabulary blobs exchanged with the persistent store.
//!
//! Each arm blob names the genre and tag terms behind its slots, in slot
//! order. Loading maps those terms onto the current vocabulary, so an arm
//! keeps its meaning when the vocabulary grew or was rebuilt in a different
//! order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    services::{
        bandit::{Arm, Matrix, TrackedArm},
        vocabulary::{FeatureLayout, FeatureVocabulary, VocabularySnapshot},
    },
};

pub const ARM_SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArmSnapshot {
    version: u32,
    genres: Vec<String>,
    tags: Vec<String>,
    /// Row-major `d × d` design matrix
    a: Vec<f64>,
    b: Vec<f64>,
}

/// A decoded arm and the terms its genre/tag slots were trained on
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArm {
    pub arm: TrackedArm,
    pub terms: VocabularySnapshot,
}

/// Serializes an arm with the vocabulary terms behind its slots.
///
/// The arm's layout must be a prefix of `vocabulary`, which holds for any arm
/// aligned to it.
pub fn encode_arm(arm: &TrackedArm, vocabulary: &FeatureVocabulary) -> AppResult<String> {
    let layout = arm.layout();
    let (Some(genres), Some(tags)) = (
        vocabulary.genres().get(..layout.genres),
        vocabulary.tags().get(..layout.tags),
    ) else {
        return Err(AppError::Internal(format!(
            "Arm layout {layout:?} is larger than the vocabulary {:?}",
            vocabulary.layout()
        )));
    };

    let snapshot = ArmSnapshot {
        version: ARM_SNAPSHOT_VERSION,
        genres: genres.to_vec(),
        tags: tags.to_vec(),
        a: arm.arm().design_matrix().as_row_major().to_vec(),
        b: arm.arm().reward_vector().to_vec(),
    };
    Ok(serde_json::to_string(&snapshot)?)
}

/// Parses an arm blob, checking version, sizes and term uniqueness.
pub fn decode_arm(blob: &str) -> AppResult<DecodedArm> {
    let snapshot: ArmSnapshot = serde_json::from_str(blob)?;
    if snapshot.version != ARM_SNAPSHOT_VERSION {
        return Err(AppError::Internal(format!(
            "Unsupported arm snapshot version {}",
            snapshot.version
        )));
    }
    if has_duplicates(&snapshot.genres) || has_duplicates(&snapshot.tags) {
        return Err(AppError::Internal(
            "Arm snapshot lists a term twice".to_string(),
        ));
    }

    let layout = FeatureLayout::new(snapshot.genres.len(), snapshot.tags.len());
    let dimension = layout.dimension();
    let invalid = || {
        AppError::Internal(format!(
            "Arm snapshot does not match its terms (expected dimension {dimension})"
        ))
    };

    let a = Matrix::from_row_major(dimension, snapshot.a).ok_or_else(invalid)?;
    let arm = Arm::from_parts(a, snapshot.b).ok_or_else(invalid)?;
    Ok(DecodedArm {
        arm: TrackedArm::from_parts(layout, arm).ok_or_else(invalid)?,
        terms: VocabularySnapshot {
            genres: snapshot.genres,
            tags: snapshot.tags,
        },
    })
}

fn has_duplicates(terms: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(terms.len());
    !terms.iter().all(|t| seen.insert(t.as_str()))
}

/// How a stored arm relates to the current vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Every term sits where it was stored, used as is
    Current(TrackedArm),
    /// Terms moved or the vocabulary grew; statistics follow their terms
    Remapped(TrackedArm),
    /// A stored term is unknown to the vocabulary; must be retrained
    Rejected { unknown_term: String },
}

/// Fits a stored arm to `vocabulary` by term.
pub fn reconcile(stored: DecodedArm, vocabulary: &FeatureVocabulary) -> Reconciled {
    let DecodedArm { arm, terms } = stored;

    let genre_slots = match slots(&terms.genres, |t| vocabulary.genre_index(t)) {
        Ok(slots) => slots,
        Err(unknown_term) => return Reconciled::Rejected { unknown_term },
    };
    let tag_slots = match slots(&terms.tags, |t| vocabulary.tag_index(t)) {
        Ok(slots) => slots,
        Err(unknown_term) => return Reconciled::Rejected { unknown_term },
    };

    let from = arm.layout();
    let target = vocabulary.layout();
    let in_place = |slots: &[usize]| slots.iter().enumerate().all(|(i, &slot)| i == slot);
    if from == target && in_place(&genre_slots) && in_place(&tag_slots) {
        return Reconciled::Current(arm);
    }

    Reconciled::Remapped(arm.remapped(target, |i| {
        if i < from.genre_offset() {
            i
        } else if i < from.tag_offset() {
            target.genre_offset() + genre_slots[i - from.genre_offset()]
        } else if i < from.bucket_offset() {
            target.tag_offset() + tag_slots[i - from.tag_offset()]
        } else {
            target.bucket_offset() + (i - from.bucket_offset())
        }
    }))
}

/// Current positions of `terms`, or the first term with no position.
fn slots(terms: &[String], index: impl Fn(&str) -> Option<usize>) -> Result<Vec<usize>, String> {
    terms
        .iter()
        .map(|term| index(term).ok_or_else(|| term.clone()))
        .collect()
}

pub fn encode_vocabulary(snapshot: &VocabularySnapshot) -> AppResult<String> {
    Ok(serde_json::to_string(snapshot)?)
}

pub fn decode_vocabulary(blob: &str) -> AppResult<VocabularySnapshot> {
    Ok(serde_json::from_str(blob)?)
}
