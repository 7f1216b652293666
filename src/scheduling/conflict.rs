// Conflict detection - pairwise half-open overlap tests over an event's bookings
//
// `[a, b)` and `[c, d)` collide iff `a < d && c < b`. A set ending at T and
// another starting at T do not collide.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{truncate_to_millis, ArtistId, AssignmentId, StageId};
use crate::error::{AppError, AppResult};
use crate::models::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    /// Both bounds are cut to whole milliseconds before they are compared, so
    /// a slot that is valid here is still valid once stored.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<Self> {
        let (start, end) = (truncate_to_millis(start), truncate_to_millis(end));
        if start >= end {
            return Err(AppError::Validation(format!(
                "invalid interval: set start {} must be before set end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl From<&Assignment> for TimeSlot {
    fn from(a: &Assignment) -> Self {
        TimeSlot {
            start: a.set_start,
            end: a.set_end,
        }
    }
}

/// A booking about to be written.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub stage_id: StageId,
    pub artist_id: ArtistId,
    pub slot: TimeSlot,
    /// The assignment being moved, when checking an update.
    pub exclude: Option<AssignmentId>,
}

/// Ids of bookings that collide with `candidate`, either on the same stage or
/// for the same artist on any stage.
///
/// `existing` must hold every booking of one event sorted by `set_start`; the
/// scan stops at the first booking starting at or after the candidate's end.
pub fn find_conflicts(candidate: &Candidate, existing: &[Assignment]) -> Vec<AssignmentId> {
    debug_assert!(
        existing.windows(2).all(|w| w[0].set_start <= w[1].set_start),
        "bookings must be sorted by set_start"
    );

    let mut conflicting = Vec::new();
    for booking in existing {
        if booking.set_start >= candidate.slot.end {
            break;
        }
        if Some(booking.id) == candidate.exclude {
            continue;
        }
        let shares_resource =
            booking.stage_id == candidate.stage_id || booking.artist_id == candidate.artist_id;
        if shares_resource && candidate.slot.overlaps(&TimeSlot::from(booking)) {
            conflicting.push(booking.id);
        }
    }
    conflicting
}

/// `find_conflicts`, as an error when anything collides.
pub fn ensure_no_conflicts(candidate: &Candidate, existing: &[Assignment]) -> AppResult<()> {
    let conflicting = find_conflicts(candidate, existing);
    if conflicting.is_empty() {
        Ok(())
    } else {
        Err(AppError::SchedulingConflict { conflicting })
    }
}

/// Why two stored bookings collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    SameStage,
    SameArtist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictPair {
    pub first: AssignmentId,
    pub second: AssignmentId,
    pub reason: ConflictReason,
}

/// Sweep an event's sorted bookings for pairs that already overlap. Rows
/// written through the services never produce any; this audits data loaded
/// from elsewhere.
pub fn overlapping_pairs(sorted: &[Assignment]) -> Vec<ConflictPair> {
    let mut pairs = Vec::new();
    for (i, a) in sorted.iter().enumerate() {
        for b in &sorted[i + 1..] {
            if b.set_start >= a.set_end {
                break;
            }
            let reason = if a.stage_id == b.stage_id {
                ConflictReason::SameStage
            } else if a.artist_id == b.artist_id {
                ConflictReason::SameArtist
            } else {
                continue;
            };
            pairs.push(ConflictPair {
                first: a.id,
                second: b.id,
                reason,
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventId;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 17, hour, minute, 0).unwrap()
    }

    fn booking(id: i64, stage: i64, artist: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Assignment {
        Assignment {
            id: AssignmentId::new(id),
            event_id: EventId::new(1),
            stage_id: StageId::new(stage),
            artist_id: ArtistId::new(artist),
            set_start: start,
            set_end: end,
        }
    }

    fn candidate(stage: i64, artist: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Candidate {
        Candidate {
            stage_id: StageId::new(stage),
            artist_id: ArtistId::new(artist),
            slot: TimeSlot::new(start, end).unwrap(),
            exclude: None,
        }
    }

    #[test]
    fn test_time_slot_rejects_empty_and_reversed() {
        assert!(matches!(TimeSlot::new(at(20, 0), at(20, 0)), Err(AppError::Validation(_))));
        assert!(matches!(TimeSlot::new(at(21, 0), at(20, 0)), Err(AppError::Validation(_))));
        assert_eq!(TimeSlot::new(at(20, 0), at(21, 30)).unwrap().duration_minutes(), 90);
    }

    #[test]
    fn test_time_slot_works_in_whole_milliseconds() {
        let micros = |n| at(20, 0) + chrono::Duration::microseconds(n);

        // both bounds fall inside the same millisecond
        assert!(matches!(TimeSlot::new(micros(100), micros(900)), Err(AppError::Validation(_))));

        let slot = TimeSlot::new(micros(100), micros(1_900)).unwrap();
        assert_eq!(slot.start, at(20, 0));
        assert_eq!(slot.end, micros(1_000));
    }

    #[test]
    fn test_touching_boundary_is_not_a_conflict() {
        let existing = vec![booking(1, 10, 100, at(20, 0), at(21, 0))];
        let c = candidate(10, 200, at(21, 0), at(22, 0));
        assert!(find_conflicts(&c, &existing).is_empty());

        let before = candidate(10, 200, at(19, 0), at(20, 0));
        assert!(find_conflicts(&before, &existing).is_empty());
    }

    #[test]
    fn test_same_stage_overlap() {
        let existing = vec![booking(1, 10, 100, at(20, 0), at(21, 0))];
        let c = candidate(10, 200, at(20, 59), at(22, 0));
        assert_eq!(find_conflicts(&c, &existing), vec![AssignmentId::new(1)]);
    }

    #[test]
    fn test_same_artist_on_another_stage() {
        let existing = vec![booking(1, 10, 100, at(20, 0), at(21, 0))];
        let c = candidate(11, 100, at(20, 30), at(21, 30));
        assert_eq!(find_conflicts(&c, &existing), vec![AssignmentId::new(1)]);
    }

    #[test]
    fn test_unrelated_stage_and_artist_may_overlap() {
        let existing = vec![booking(1, 10, 100, at(20, 0), at(21, 0))];
        let c = candidate(11, 200, at(20, 0), at(21, 0));
        assert!(find_conflicts(&c, &existing).is_empty());
    }

    #[test]
    fn test_containment_reports_every_collision() {
        let existing = vec![
            booking(1, 10, 100, at(18, 0), at(19, 0)),
            booking(2, 10, 101, at(19, 0), at(20, 0)),
            booking(3, 11, 300, at(19, 30), at(20, 30)),
            booking(4, 10, 102, at(20, 0), at(21, 0)),
        ];
        let c = candidate(10, 300, at(18, 30), at(20, 30));
        assert_eq!(
            find_conflicts(&c, &existing),
            vec![AssignmentId::new(1), AssignmentId::new(2), AssignmentId::new(3), AssignmentId::new(4)]
        );
    }

    #[test]
    fn test_update_excludes_itself() {
        let existing = vec![booking(1, 10, 100, at(20, 0), at(21, 0))];
        let mut c = candidate(10, 100, at(20, 15), at(21, 15));
        c.exclude = Some(AssignmentId::new(1));
        assert!(find_conflicts(&c, &existing).is_empty());
    }

    #[test]
    fn test_ensure_no_conflicts_carries_ids() {
        let existing = vec![booking(7, 10, 100, at(20, 0), at(21, 0))];
        let c = candidate(10, 200, at(20, 30), at(21, 30));
        match ensure_no_conflicts(&c, &existing) {
            Err(AppError::SchedulingConflict { conflicting }) => {
                assert_eq!(conflicting, vec![AssignmentId::new(7)])
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_pairs_sweep() {
        let sorted = vec![
            booking(1, 10, 100, at(20, 0), at(21, 0)),
            booking(2, 10, 101, at(20, 30), at(21, 30)),
            booking(3, 11, 100, at(20, 45), at(21, 45)),
            booking(4, 11, 102, at(22, 0), at(23, 0)),
        ];
        let pairs = overlapping_pairs(&sorted);
        assert_eq!(
            pairs,
            vec![
                ConflictPair {
                    first: AssignmentId::new(1),
                    second: AssignmentId::new(2),
                    reason: ConflictReason::SameStage
                },
                ConflictPair {
                    first: AssignmentId::new(1),
                    second: AssignmentId::new(3),
                    reason: ConflictReason::SameArtist
                },
            ]
        );
    }
}
