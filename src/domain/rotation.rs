use crate::domain::models::SessionKind;

pub const ROTATION: [SessionKind; 8] = [
    SessionKind::Work,
    SessionKind::ShortBreak,
    SessionKind::Work,
    SessionKind::ShortBreak,
    SessionKind::Work,
    SessionKind::ShortBreak,
    SessionKind::Work,
    SessionKind::LongBreak,
];

pub const ROTATION_LEN: u8 = ROTATION.len() as u8;

pub fn kind_at(slot: u8) -> SessionKind {
    ROTATION[usize::from(slot % ROTATION_LEN)]
}

pub fn next_slot(slot: u8) -> u8 {
    (slot % ROTATION_LEN + 1) % ROTATION_LEN
}

pub fn first_slot_of(kind: SessionKind) -> u8 {
    ROTATION
        .iter()
        .position(|candidate| *candidate == kind)
        .map(|index| index as u8)
        .unwrap_or(0)
}

pub fn slot_for(kind: SessionKind, from: u8) -> u8 {
    (0..ROTATION_LEN)
        .map(|offset| (from % ROTATION_LEN + offset) % ROTATION_LEN)
        .find(|slot| kind_at(*slot) == kind)
        .unwrap_or_else(|| first_slot_of(kind))
}

pub fn next_kind(current: SessionKind) -> SessionKind {
    kind_at(next_slot(first_slot_of(current)))
}

/// Repairs a slot that does not agree with `kind`, e.g. from an older
/// snapshot, placing it by the number of completed work sessions.
pub fn reconcile_slot(kind: SessionKind, slot: Option<u8>, completed_work_count: u32) -> u8 {
    match slot {
        Some(slot) if slot < ROTATION_LEN && kind_at(slot) == kind => slot,
        _ => inferred_slot(kind, completed_work_count),
    }
}

fn inferred_slot(kind: SessionKind, completed_work_count: u32) -> u8 {
    let position = (completed_work_count % 4) as u8;
    match kind {
        SessionKind::Work => 2 * position,
        SessionKind::ShortBreak if position > 0 => 2 * position - 1,
        _ => first_slot_of(kind),
    }
}
