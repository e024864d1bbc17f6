//! Doubly-linked-list ordering shared by every `prev_id`/`next_id`
//! collection.
//!
//! A chain is either empty, a single isolated "default" row (delta rows are
//! allowed to stay outside the user chain), or one fully connected list
//! with exactly one head and one tail. Violations surface as
//! [`RepoError::Corruption`] with a repair hint; no auto-repair happens
//! here.

use std::collections::HashMap;

use crate::error::RepoError;
use crate::ident::Id;

/// Access to the linkage fields of a chain row.
pub trait Linked {
    fn link_id(&self) -> Id;
    fn prev(&self) -> Option<Id>;
    fn next(&self) -> Option<Id>;
    fn set_prev(&mut self, prev: Option<Id>);
    fn set_next(&mut self, next: Option<Id>);
    /// Rows outside the user chain (delta overrides) stay self-isolated.
    fn is_isolated_row(&self) -> bool {
        false
    }
}

/// Append `new_id` as the new tail of the chain formed by `rows`.
/// Auto-linking on create prevents silently-isolated rows that the ordered
/// walk would never visit.
pub fn append_tail<T: Linked>(rows: &mut HashMap<Id, T>, new_id: Id) -> Result<(), RepoError> {
    let tail = rows
        .values()
        .filter(|row| !row.is_isolated_row() && row.link_id() != new_id)
        .find(|row| row.next().is_none())
        .map(|row| row.link_id());

    if let Some(tail_id) = tail {
        if let Some(tail_row) = rows.get_mut(&tail_id) {
            tail_row.set_next(Some(new_id));
        }
        if let Some(new_row) = rows.get_mut(&new_id) {
            new_row.set_prev(Some(tail_id));
            new_row.set_next(None);
        }
    } else if let Some(new_row) = rows.get_mut(&new_id) {
        new_row.set_prev(None);
        new_row.set_next(None);
    }
    Ok(())
}

/// Detach a row from the chain, relinking its neighbours.
pub fn unlink<T: Linked>(rows: &mut HashMap<Id, T>, id: Id) -> Result<(), RepoError> {
    let (prev, next) = {
        let row = rows
            .get(&id)
            .ok_or_else(|| RepoError::NotFound(format!("chain row {id}")))?;
        (row.prev(), row.next())
    };
    if let Some(prev_id) = prev {
        if let Some(prev_row) = rows.get_mut(&prev_id) {
            prev_row.set_next(next);
        }
    }
    if let Some(next_id) = next {
        if let Some(next_row) = rows.get_mut(&next_id) {
            next_row.set_prev(prev);
        }
    }
    if let Some(row) = rows.get_mut(&id) {
        row.set_prev(None);
        row.set_next(None);
    }
    Ok(())
}

/// Move `id` immediately before `anchor`. Moving to the current relative
/// position is a no-op.
pub fn move_before<T: Linked>(
    rows: &mut HashMap<Id, T>,
    id: Id,
    anchor: Id,
) -> Result<(), RepoError> {
    if id == anchor {
        return Err(RepoError::Conflict(format!("cannot move {id} before itself")));
    }
    {
        let anchor_row = rows
            .get(&anchor)
            .ok_or_else(|| RepoError::NotFound(format!("chain row {anchor}")))?;
        if anchor_row.prev() == Some(id) {
            return Ok(());
        }
    }
    unlink(rows, id)?;
    let anchor_prev = rows
        .get(&anchor)
        .ok_or_else(|| RepoError::NotFound(format!("chain row {anchor}")))?
        .prev();
    if let Some(prev_id) = anchor_prev {
        if let Some(prev_row) = rows.get_mut(&prev_id) {
            prev_row.set_next(Some(id));
        }
    }
    if let Some(row) = rows.get_mut(&id) {
        row.set_prev(anchor_prev);
        row.set_next(Some(anchor));
    }
    if let Some(anchor_row) = rows.get_mut(&anchor) {
        anchor_row.set_prev(Some(id));
    }
    Ok(())
}

/// Move `id` immediately after `anchor`. Moving to the current relative
/// position is a no-op.
pub fn move_after<T: Linked>(
    rows: &mut HashMap<Id, T>,
    id: Id,
    anchor: Id,
) -> Result<(), RepoError> {
    if id == anchor {
        return Err(RepoError::Conflict(format!("cannot move {id} after itself")));
    }
    {
        let anchor_row = rows
            .get(&anchor)
            .ok_or_else(|| RepoError::NotFound(format!("chain row {anchor}")))?;
        if anchor_row.next() == Some(id) {
            return Ok(());
        }
    }
    unlink(rows, id)?;
    let anchor_next = rows
        .get(&anchor)
        .ok_or_else(|| RepoError::NotFound(format!("chain row {anchor}")))?
        .next();
    if let Some(next_id) = anchor_next {
        if let Some(next_row) = rows.get_mut(&next_id) {
            next_row.set_prev(Some(id));
        }
    }
    if let Some(row) = rows.get_mut(&id) {
        row.set_prev(Some(anchor));
        row.set_next(anchor_next);
    }
    if let Some(anchor_row) = rows.get_mut(&anchor) {
        anchor_row.set_next(Some(id));
    }
    Ok(())
}

/// Walk the chain head → tail, verifying integrity as it goes. Isolated
/// delta rows are not visited.
pub fn ordered_walk<T: Linked + Clone>(rows: &HashMap<Id, T>) -> Result<Vec<T>, RepoError> {
    let chain_rows: Vec<&T> = rows.values().filter(|r| !r.is_isolated_row()).collect();
    if chain_rows.is_empty() {
        return Ok(Vec::new());
    }

    let heads: Vec<Id> = chain_rows
        .iter()
        .filter(|r| r.prev().is_none())
        .map(|r| r.link_id())
        .collect();
    if heads.len() != 1 {
        return Err(RepoError::corruption(
            format!("chain has {} heads, expected exactly one", heads.len()),
            "relink prev_id pointers so a single row has prev = NULL",
        ));
    }

    let mut out = Vec::with_capacity(chain_rows.len());
    let mut cursor = Some(heads[0]);
    let mut prev: Option<Id> = None;
    while let Some(id) = cursor {
        let row = rows.get(&id).ok_or_else(|| {
            RepoError::corruption(
                format!("next_id points at missing row {id}"),
                "remove the dangling next_id pointer",
            )
        })?;
        if row.prev() != prev {
            return Err(RepoError::corruption(
                format!("row {id} prev pointer does not match walk order"),
                "relink prev_id to the preceding row",
            ));
        }
        if out.len() == chain_rows.len() {
            return Err(RepoError::corruption(
                "chain walk exceeded row count (next_id loop)".to_string(),
                "break the next_id cycle",
            ));
        }
        out.push(row.clone());
        prev = Some(id);
        cursor = row.next();
    }

    if out.len() != chain_rows.len() {
        return Err(RepoError::corruption(
            format!(
                "chain walk visited {} of {} rows",
                out.len(),
                chain_rows.len()
            ),
            "append the unreachable rows to the tail",
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Id,
        prev: Option<Id>,
        next: Option<Id>,
        isolated: bool,
    }

    impl Linked for Row {
        fn link_id(&self) -> Id {
            self.id
        }
        fn prev(&self) -> Option<Id> {
            self.prev
        }
        fn next(&self) -> Option<Id> {
            self.next
        }
        fn set_prev(&mut self, prev: Option<Id>) {
            self.prev = prev;
        }
        fn set_next(&mut self, next: Option<Id>) {
            self.next = next;
        }
        fn is_isolated_row(&self) -> bool {
            self.isolated
        }
    }

    struct Fixture {
        ids: crate::ident::FakeIdSource,
        rows: HashMap<Id, Row>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ids: crate::ident::FakeIdSource::new(),
                rows: HashMap::new(),
            }
        }

        fn push(&mut self) -> Id {
            use crate::ident::IdSource;
            let id = self.ids.next_id();
            self.rows.insert(
                id,
                Row {
                    id,
                    prev: None,
                    next: None,
                    isolated: false,
                },
            );
            append_tail(&mut self.rows, id).unwrap();
            id
        }

        fn order(&self) -> Vec<Id> {
            ordered_walk(&self.rows)
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect()
        }

        fn assert_integrity(&self) {
            let rows = ordered_walk(&self.rows).unwrap();
            for window in rows.windows(2) {
                assert_eq!(window[0].next, Some(window[1].id));
                assert_eq!(window[1].prev, Some(window[0].id));
            }
            if let Some(first) = rows.first() {
                assert_eq!(first.prev, None);
            }
            if let Some(last) = rows.last() {
                assert_eq!(last.next, None);
            }
        }
    }

    #[test]
    fn test_append_builds_chain_in_order() {
        let mut fx = Fixture::new();
        let a = fx.push();
        let b = fx.push();
        let c = fx.push();
        assert_eq!(fx.order(), vec![a, b, c]);
        fx.assert_integrity();
    }

    #[test]
    fn test_unlink_middle_and_ends() {
        let mut fx = Fixture::new();
        let a = fx.push();
        let b = fx.push();
        let c = fx.push();

        unlink(&mut fx.rows, b).unwrap();
        fx.rows.remove(&b);
        assert_eq!(fx.order(), vec![a, c]);
        fx.assert_integrity();

        unlink(&mut fx.rows, a).unwrap();
        fx.rows.remove(&a);
        assert_eq!(fx.order(), vec![c]);
        fx.assert_integrity();
    }

    #[test]
    fn test_move_before() {
        let mut fx = Fixture::new();
        let a = fx.push();
        let b = fx.push();
        let c = fx.push();

        move_before(&mut fx.rows, c, a).unwrap();
        assert_eq!(fx.order(), vec![c, a, b]);
        fx.assert_integrity();
    }

    #[test]
    fn test_move_after() {
        let mut fx = Fixture::new();
        let a = fx.push();
        let b = fx.push();
        let c = fx.push();

        move_after(&mut fx.rows, a, c).unwrap();
        assert_eq!(fx.order(), vec![b, c, a]);
        fx.assert_integrity();
    }

    #[test]
    fn test_move_to_current_position_is_noop() {
        let mut fx = Fixture::new();
        let a = fx.push();
        let b = fx.push();
        let c = fx.push();
        let before = fx.rows.clone();

        move_before(&mut fx.rows, a, b).unwrap();
        assert_eq!(fx.rows, before);
        move_after(&mut fx.rows, b, a).unwrap();
        assert_eq!(fx.rows, before);
        let _ = c;
    }

    #[test]
    fn test_random_op_sequence_keeps_invariants() {
        let mut fx = Fixture::new();
        let mut ids: Vec<Id> = (0..8).map(|_| fx.push()).collect();

        // deterministic pseudo-random walk over the op space
        let mut seed: u64 = 0x5eed;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pick = (seed >> 33) as usize;
            let x = ids[pick % ids.len()];
            let y = ids[(pick / 7) % ids.len()];
            match pick % 3 {
                0 if x != y => move_before(&mut fx.rows, x, y).unwrap(),
                1 if x != y => move_after(&mut fx.rows, x, y).unwrap(),
                2 if ids.len() > 2 => {
                    unlink(&mut fx.rows, x).unwrap();
                    fx.rows.remove(&x);
                    ids.retain(|&i| i != x);
                }
                _ => {}
            }
            fx.assert_integrity();
            assert_eq!(fx.order().len(), ids.len());
        }
    }

    #[test]
    fn test_isolated_rows_excluded_from_walk() {
        use crate::ident::IdSource;
        let mut fx = Fixture::new();
        let a = fx.push();
        let iso = fx.ids.next_id();
        fx.rows.insert(
            iso,
            Row {
                id: iso,
                prev: None,
                next: None,
                isolated: true,
            },
        );
        assert_eq!(fx.order(), vec![a]);
    }

    #[test]
    fn test_two_heads_is_corruption() {
        use crate::ident::IdSource;
        let mut fx = Fixture::new();
        fx.push();
        let stray = fx.ids.next_id();
        fx.rows.insert(
            stray,
            Row {
                id: stray,
                prev: None,
                next: None,
                isolated: false,
            },
        );
        // two rows with prev = None and no linkage
        assert!(matches!(
            ordered_walk(&fx.rows),
            Err(RepoError::Corruption { .. })
        ));
    }
}
