//! Scan algebra: turns each logical query in spec.md §4.E into one
//! [`ScanArgs`] against a single index family.
//!
//! Every builder here is pure key-component arithmetic; none of them touch
//! a backend. `crate::multistore`/`crate::triplestore` run the resulting
//! [`ScanArgs`] through [`crate::engine::OrderedEngine::scan`] and decode
//! the results with `crate::codec`.

use factstore_core::{attribute_key_component, Attribute, KeyComponent, StoreError, Timestamp, Value};

use crate::codec::IndexFamily;
use crate::engine::ScanArgs;

/// Scan direction. `Asc` walks a range low-to-high; `Desc` reverses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

fn tag(family: IndexFamily) -> KeyComponent {
    KeyComponent::String(family.tag().to_string())
}

fn lower_string(opt: Option<&str>) -> KeyComponent {
    opt.map_or(KeyComponent::Min, |s| KeyComponent::String(s.to_string()))
}

fn upper_string(opt: Option<&str>) -> KeyComponent {
    opt.map_or(KeyComponent::Max, |s| KeyComponent::String(s.to_string()))
}

fn lower_attr(opt: Option<&Attribute>) -> KeyComponent {
    opt.map_or(KeyComponent::Min, attribute_key_component)
}

/// `a‖[MAX]`: the attribute itself if given, else a one-element array
/// holding `Max` — which sorts above every real attribute array regardless
/// of length, since a real attribute's first component is always a
/// concrete string or number, never `Max` (spec.md §4.E).
fn upper_attr_or_max_wrapped(opt: Option<&Attribute>) -> KeyComponent {
    opt.map_or_else(
        || KeyComponent::Array(vec![KeyComponent::Max]),
        attribute_key_component,
    )
}

fn lower_value(opt: Option<&Value>) -> KeyComponent {
    opt.map_or(KeyComponent::Min, |v| KeyComponent::from(v))
}

/// `findByCollection(c, dir)`.
///
/// Scoped to the `AVE` family rather than `EAV` (spec.md's table labels it
/// `EAV` but its own rationale — "relies on the first component of
/// `attribute` being the collection name" — only holds for a scan ordered
/// by attribute first; `EAV` is ordered by entity first and cannot serve a
/// collection-prefix scan. `AVE` realizes exactly what the rationale
/// describes. See `DESIGN.md`'s Open Question resolution 5.
#[must_use]
pub fn find_by_collection(collection: &str, dir: Direction) -> ScanArgs {
    let t = tag(IndexFamily::Ave);
    let lo_attr = KeyComponent::Array(vec![KeyComponent::String(collection.to_string())]);
    let hi_attr = KeyComponent::Array(vec![
        KeyComponent::String(collection.to_string()),
        KeyComponent::Max,
    ]);
    let mut args = ScanArgs {
        prefix: vec![t.clone()],
        gte: Some(vec![t.clone(), lo_attr]),
        lt: Some(vec![t, hi_attr]),
        ..ScanArgs::default()
    };
    if dir == Direction::Desc {
        args = args.reversed();
    }
    args
}

/// `findByEAV([e?, a?, v?], dir)`.
#[must_use]
pub fn find_by_eav(e: Option<&str>, a: Option<&Attribute>, v: Option<&Value>, dir: Direction) -> ScanArgs {
    let t = tag(IndexFamily::Eav);
    let gte = vec![t.clone(), lower_string(e), lower_attr(a), lower_value(v)];
    let lt = vec![
        t.clone(),
        upper_string(e),
        upper_attr_or_max_wrapped(a),
        KeyComponent::Max,
    ];
    let mut args = ScanArgs {
        prefix: vec![t],
        gte: Some(gte),
        lt: Some(lt),
        ..ScanArgs::default()
    };
    if dir == Direction::Desc {
        args = args.reversed();
    }
    args
}

/// `findByEntity(e)` = `findByEAV([e])`.
#[must_use]
pub fn find_by_entity(e: &str) -> ScanArgs {
    find_by_eav(Some(e), None, None, Direction::Asc)
}

/// `findByEntityAttribute(e, a)` = `findByEAV([e, a])`.
#[must_use]
pub fn find_by_entity_attribute(e: &str, a: &Attribute) -> ScanArgs {
    find_by_eav(Some(e), Some(a), None, Direction::Asc)
}

/// `findByAVE([a?, v?, e?], dir)`.
#[must_use]
pub fn find_by_ave(a: Option<&Attribute>, v: Option<&Value>, e: Option<&str>, dir: Direction) -> ScanArgs {
    let t = tag(IndexFamily::Ave);
    let gte = vec![t.clone(), lower_attr(a), lower_value(v), lower_string(e)];
    let lt = vec![
        t.clone(),
        upper_attr_or_max_wrapped(a),
        v.map_or(KeyComponent::Max, |v| KeyComponent::from(v)),
        KeyComponent::Max,
    ];
    let mut args = ScanArgs {
        prefix: vec![t],
        gte: Some(gte),
        lt: Some(lt),
        ..ScanArgs::default()
    };
    if dir == Direction::Desc {
        args = args.reversed();
    }
    args
}

/// `findByAttribute(a)` = `findByAVE([a])`.
#[must_use]
pub fn find_by_attribute(a: &Attribute) -> ScanArgs {
    find_by_ave(Some(a), None, None, Direction::Asc)
}

/// A prefix-list `(value, entity-id?)` used to resume a ranged scan over
/// one attribute's values, as returned by a previous page of
/// [`find_values_in_range`].
pub type ValueCursor = Vec<KeyComponent>;

#[must_use]
pub fn value_cursor(value: &Value, entity_id: Option<&str>) -> ValueCursor {
    let mut cursor = vec![KeyComponent::from(value)];
    if let Some(e) = entity_id {
        cursor.push(KeyComponent::String(e.to_string()));
    }
    cursor
}

/// Options for [`find_values_in_range`]: `gt`/`lt` are [`ValueCursor`]s
/// bounding the scan, `dir` its direction.
#[derive(Debug, Clone, Default)]
pub struct RangeOpts {
    pub gt: Option<ValueCursor>,
    pub lt: Option<ValueCursor>,
    pub dir: Option<Direction>,
}

/// The full key length every fact key in the `AVE` family has
/// (`[AVE, a, v, e, t]`); cursors are padded out to this length so a
/// partial `(value[, entity])` cursor becomes an exact bound.
const AVE_KEY_ARITY: usize = 5;

/// `findValuesInRange(a, {gt?, lt?, dir?})`.
#[must_use]
pub fn find_values_in_range(a: &Attribute, opts: &RangeOpts) -> ScanArgs {
    let t = tag(IndexFamily::Ave);
    let prefix = vec![t.clone(), attribute_key_component(a)];

    let mut args = ScanArgs {
        prefix: prefix.clone(),
        ..ScanArgs::default()
    };

    if let Some(cursor) = &opts.gt {
        let mut bound = prefix.clone();
        bound.extend(cursor.iter().cloned());
        while bound.len() < AVE_KEY_ARITY {
            bound.push(KeyComponent::Max);
        }
        args.gt = Some(bound);
    }
    if let Some(cursor) = &opts.lt {
        let mut bound = prefix.clone();
        bound.extend(cursor.iter().cloned());
        while bound.len() < AVE_KEY_ARITY {
            bound.push(KeyComponent::Min);
        }
        args.lt = Some(bound);
    }
    if opts.dir == Some(Direction::Desc) {
        args = args.reversed();
    }
    args
}

/// Comparison operator for a client-timestamp scan (spec.md §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl TimestampOp {
    /// Parses an operator name, failing the way spec.md §4.E's "any other"
    /// branch requires: with [`StoreError::InvalidTimestampIndexScan`].
    ///
    /// # Errors
    /// Returns that error for anything other than `lt|lte|gt|gte|eq`.
    pub fn parse(op: &str) -> Result<Self, StoreError> {
        Ok(match op {
            "lt" => TimestampOp::Lt,
            "lte" => TimestampOp::Lte,
            "gt" => TimestampOp::Gt,
            "gte" => TimestampOp::Gte,
            "eq" => TimestampOp::Eq,
            other => return Err(StoreError::InvalidTimestampIndexScan(other.to_string())),
        })
    }
}

/// `findByClientTimestamp(client, op, t)`.
///
/// `t` absent behaves as spec.md §4.E describes for `lt`/`gt`/`gte` (an
/// empty timestamp suffix, i.e. the bound degenerates to just the
/// `[clientTimestamp, client]` prefix); `lte`/`eq` need a concrete bound
/// to build an inclusive/equal range around, so a missing `t` there simply
/// leaves that side of the range unconstrained rather than erroring —
/// there is no well-defined "less than or equal to nothing".
#[must_use]
pub fn find_by_client_timestamp(client: &str, op: TimestampOp, t: Option<&Timestamp>) -> ScanArgs {
    let tag_c = tag(IndexFamily::ClientTimestamp);
    let prefix = vec![tag_c, KeyComponent::String(client.to_string())];
    let ts_component = t.map(KeyComponent::from);

    let mut args = ScanArgs {
        prefix: prefix.clone(),
        ..ScanArgs::default()
    };

    match op {
        TimestampOp::Lt => {
            let mut bound = prefix.clone();
            if let Some(tc) = &ts_component {
                bound.push(tc.clone());
            }
            args.lt = Some(bound);
        }
        TimestampOp::Lte => {
            if let Some(tc) = ts_component {
                let mut bound = prefix.clone();
                bound.push(tc);
                bound.push(KeyComponent::Max);
                args.lte = Some(bound);
            }
        }
        TimestampOp::Gt => {
            let mut bound = prefix.clone();
            if let Some(tc) = &ts_component {
                bound.push(tc.clone());
            }
            bound.push(KeyComponent::Min);
            args.gt = Some(bound);
        }
        TimestampOp::Gte => {
            let mut bound = prefix.clone();
            if let Some(tc) = &ts_component {
                bound.push(tc.clone());
            }
            args.gte = Some(bound);
        }
        TimestampOp::Eq => {
            if let Some(tc) = ts_component {
                let mut gte_bound = prefix.clone();
                gte_bound.push(tc.clone());
                args.gte = Some(gte_bound);

                let mut lt_bound = prefix;
                lt_bound.push(tc);
                lt_bound.push(KeyComponent::Max);
                args.lt = Some(lt_bound);
            }
        }
    }
    args
}

/// `findMaxTimestamp(client)`: reverse scan of the client's own
/// `clientTimestamp` prefix; the caller takes the first result.
#[must_use]
pub fn find_max_timestamp(client: &str) -> ScanArgs {
    let tag_c = tag(IndexFamily::ClientTimestamp);
    ScanArgs {
        prefix: vec![tag_c, KeyComponent::String(client.to_string())],
        reverse: true,
        ..ScanArgs::default()
    }
}

/// The bare `[metadata, entity-id]` prefix used by `readMetadataTuples`.
#[must_use]
pub fn find_metadata_by_entity(entity_id: &str) -> ScanArgs {
    ScanArgs::with_prefix(vec![
        tag(IndexFamily::Metadata),
        KeyComponent::String(entity_id.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use factstore_core::attr;

    #[test]
    fn find_by_entity_matches_any_attribute_for_that_entity() {
        let args = find_by_entity("e1");
        assert_eq!(args.prefix, vec![tag(IndexFamily::Eav)]);
        assert!(args.gte.is_some());
        assert!(args.lt.is_some());
    }

    #[test]
    fn find_by_collection_bounds_cover_only_that_collection() {
        let args = find_by_collection("users", Direction::Asc);
        let lo = args.gte.unwrap();
        let hi = args.lt.unwrap();
        assert!(lo < hi);
    }

    #[test]
    fn desc_direction_sets_reverse_flag() {
        let args = find_by_entity_attribute("e1", &attr(&["users", "name"]));
        assert!(!args.reverse);
        let args = find_by_ave(Some(&attr(&["users", "name"])), None, None, Direction::Desc);
        assert!(args.reverse);
    }

    #[test]
    fn timestamp_op_parse_rejects_unknown_operator() {
        let err = TimestampOp::parse("between").unwrap_err();
        assert!(matches!(err, StoreError::InvalidTimestampIndexScan(op) if op == "between"));
    }

    #[test]
    fn timestamp_op_parse_accepts_known_operators() {
        for op in ["lt", "lte", "gt", "gte", "eq"] {
            assert!(TimestampOp::parse(op).is_ok());
        }
    }

    #[test]
    fn eq_scan_brackets_exactly_one_timestamp() {
        let ts = Timestamp::new(5, "c1");
        let args = find_by_client_timestamp("c1", TimestampOp::Eq, Some(&ts));
        assert!(args.gte.is_some());
        assert!(args.lt.is_some());
        assert!(args.gte.unwrap() < args.lt.unwrap());
    }

    #[test]
    fn gt_without_timestamp_degenerates_to_prefix_only_bound() {
        let args = find_by_client_timestamp("c1", TimestampOp::Gt, None);
        assert_eq!(args.gt, Some(vec![
            tag(IndexFamily::ClientTimestamp),
            KeyComponent::String("c1".to_string()),
            KeyComponent::Min,
        ]));
    }

    #[test]
    fn find_max_timestamp_scans_in_reverse() {
        let args = find_max_timestamp("c1");
        assert!(args.reverse);
    }

    #[test]
    fn value_cursor_with_and_without_entity() {
        let v = Value::String("x".to_string());
        assert_eq!(value_cursor(&v, None).len(), 1);
        assert_eq!(value_cursor(&v, Some("e1")).len(), 2);
    }
}
