//! Integration Tests for Sequences, Maps and Sets
//!
//! Index, length and iteration tracking for sequences; size, key and entry
//! tracking for maps and sets.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::{Handle, Runtime, RuntimeConfig, Target, Value};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// Register an effect that runs `read` and counts its runs.
fn spy(rt: &Runtime, handle: &Handle, read: impl Fn(&Handle) + 'static) -> Rc<Cell<usize>> {
    let runs = counter();
    let (h, r) = (handle.clone(), runs.clone());
    rt.effect(move || {
        read(&h);
        r.set(r.get() + 1);
    });
    runs
}

fn empty_map() -> Target {
    Target::map(Vec::<(Value, Value)>::new())
}

// ----------------------------------------------------------------------------
// Sequences
// ----------------------------------------------------------------------------

#[test]
fn sequence_elements_are_observed_by_index() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["foo"]));
    let runs = spy(&rt, &list, |l| {
        l.get(0);
    });

    list.set(0, "bar");
    assert_eq!(runs.get(), 2);
}

#[test]
fn appending_an_index_notifies_length_readers() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["foo"]));
    let runs = spy(&rt, &list, |l| {
        l.len();
    });

    list.set(0, "bar");
    assert_eq!(runs.get(), 1);

    list.set(1, "bar");
    assert_eq!(runs.get(), 2);
}

#[test]
fn deleting_an_element_keeps_the_length() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["foo", "bar"]));
    let runs = spy(&rt, &list, |l| {
        l.len();
    });

    assert!(list.delete(1));
    assert_eq!(runs.get(), 1);
    assert_eq!(list.len(), 2);
    assert!(list.get(1).is_undefined());
}

/// Truncation notifies exactly the readers of removed indices, once each.
#[test]
fn truncation_notifies_truncated_indices_only() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["foo", "bar", "baz"]));
    let head = spy(&rt, &list, |l| {
        l.get(0);
    });
    let tail = spy(&rt, &list, |l| {
        l.get(1);
        l.get(2);
    });

    list.set("length", 1);
    assert_eq!(head.get(), 1);
    assert_eq!(tail.get(), 2);

    assert!(list.set_len(1));
    assert_eq!(tail.get(), 2);
}

#[test]
fn key_enumeration_follows_length() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["bar"]));
    let result = Rc::new(RefCell::new(String::new()));

    let (l, out) = (list.clone(), result.clone());
    rt.effect(move || {
        let mut text = String::new();
        for key in l.keys() {
            text.push_str(&l.get(key).to_string());
        }
        *out.borrow_mut() = text;
    });
    assert_eq!(*result.borrow(), "bar");

    list.set(1, "foo");
    assert_eq!(*result.borrow(), "barfoo");

    list.set_len(0);
    assert_eq!(*result.borrow(), "");
}

#[test]
fn value_iteration_follows_elements_and_length() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["bar"]));
    let result = Rc::new(RefCell::new(String::new()));
    let runs = counter();

    let (l, out, r) = (list.clone(), result.clone(), runs.clone());
    rt.effect(move || {
        r.set(r.get() + 1);
        *out.borrow_mut() = l.values().iter().map(Value::to_string).collect();
    });

    list.set(0, "bbr");
    assert_eq!((result.borrow().as_str(), runs.get()), ("bbr", 2));

    list.set(1, "foo");
    assert_eq!((result.borrow().as_str(), runs.get()), ("bbrfoo", 3));

    list.set_len(1);
    assert_eq!((result.borrow().as_str(), runs.get()), ("bbr", 4));
}

#[test]
fn includes_is_reactive() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(["bar", "foo"]));
    let runs = spy(&rt, &list, |l| {
        l.includes("bar");
    });

    list.set(0, "wow");
    assert_eq!(runs.get(), 2);
    assert!(!list.includes("bar"));
}

#[test]
fn includes_matches_wrapped_and_raw_elements() {
    let rt = Runtime::new();
    let obj = Target::empty_record();
    let list = rt.reactive(Target::sequence([Value::from(obj.clone()), Value::from("bar")]));
    let found = Rc::new(Cell::new(false));

    let (l, f) = (list.clone(), found.clone());
    rt.effect(move || f.set(l.includes(l.get(0))));
    assert!(found.get());

    assert!(list.includes(obj.clone()));
    assert_eq!(list.index_of(obj), Some(0));
}

#[test]
fn push_inside_effects_does_not_track_length() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence([1]));
    let first = spy(&rt, &list, |l| {
        l.push([2]);
    });
    let second = spy(&rt, &list, |l| {
        l.push([2]);
    });
    assert_eq!((first.get(), second.get()), (1, 1));

    let l = list.clone();
    rt.effect(move || {
        l.set_len(0);
    });
    assert_eq!((first.get(), second.get()), (1, 1));
    assert!(list.is_empty());
}

#[test]
fn shift_and_splice_notify_moved_slots() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence([1, 2, 3]));
    let first = Rc::new(RefCell::new(Value::Undefined));

    let (l, out) = (list.clone(), first.clone());
    rt.effect(move || *out.borrow_mut() = l.get(0));

    assert_eq!(list.shift(), Value::from(1));
    assert_eq!(*first.borrow(), Value::from(2));

    list.unshift([0]);
    assert_eq!(*first.borrow(), Value::from(0));

    list.splice(0, 1, [9, 8]);
    assert_eq!(*first.borrow(), Value::from(9));
    assert_eq!(list.len(), 4);
}

#[test]
fn oversized_lengths_and_gaps_are_refused() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence([1]));
    let runs = spy(&rt, &list, |l| {
        l.len();
    });

    assert!(!list.set("length", 1e19));
    assert!(!list.set("length", 4_294_967_296_u64));
    assert!(!list.set_len(usize::MAX));
    assert!(!list.set(4_294_967_295_u64, 2));
    assert!(!list.set(1_000_000_000, 2));
    assert_eq!(list.len(), 1);
    assert_eq!(runs.get(), 1);
}

#[test]
fn sequence_gap_limit_comes_from_config() {
    let rt = Runtime::with_config(RuntimeConfig {
        max_sequence_gap: 4,
        ..RuntimeConfig::default()
    });
    let list = rt.reactive(Target::sequence([1]));

    assert!(list.set(5, "x"));
    assert_eq!(list.len(), 6);
    assert!(!list.set(11, "y"));
    assert!(!list.set_len(11));
    assert!(list.set_len(10));
    assert_eq!(list.len(), 10);
}

// ----------------------------------------------------------------------------
// Maps
// ----------------------------------------------------------------------------

#[test]
fn map_size_and_delete() {
    let rt = Runtime::new();
    let map = rt.reactive(Target::map([("bar1", 1), ("bar2", 1), ("bar3", 1)]));
    assert_eq!(map.len(), 3);

    assert!(map.delete("bar1"));
    assert_eq!(map.len(), 2);
}

#[test]
fn map_size_follows_additions_and_removals() {
    let rt = Runtime::new();
    let map = rt.reactive(empty_map());
    let runs = spy(&rt, &map, |m| {
        m.len();
    });

    map.set("bar1", 1);
    assert_eq!(runs.get(), 2);

    map.set("bar1", 1);
    assert_eq!(runs.get(), 2);

    map.delete("bar1");
    assert_eq!(runs.get(), 3);

    map.delete("bar1");
    assert_eq!(runs.get(), 3);
}

#[test]
fn raw_writes_are_not_observed() {
    let rt = Runtime::new();
    let original = empty_map();
    let outer = rt.reactive(original.clone());
    let inner = rt.reactive(empty_map());
    outer.set("o2", inner);

    let runs = spy(&rt, &outer, |m| {
        if let Some(inner) = m.get("o2").as_handle() {
            inner.len();
        }
    });

    if let Some(raw_inner) = original.get(&Value::from("o2")).as_target() {
        raw_inner.set("foo", 1);
    }
    assert_eq!(runs.get(), 1);
}

#[test]
fn for_each_follows_keys_and_values() {
    let rt = Runtime::new();
    let map = rt.reactive(Target::map([("bar", 1)]));
    let runs = spy(&rt, &map, |m| m.for_each(|_, _| {}));

    map.set("foo", 2);
    assert_eq!(runs.get(), 2);

    map.set("bar", 2);
    assert_eq!(runs.get(), 3);
}

#[test]
fn nested_values_in_iteration_are_observed() {
    let rt = Runtime::new();
    let key = Target::empty_record();
    let map = rt.reactive(Target::map([
        (Value::from("set"), Value::from(Target::set_of([1, 2, 3]))),
        (Value::from(key.clone()), Value::from(Target::record([("foo", 1)]))),
    ]));

    let sizes = spy(&rt, &map, |m| {
        m.for_each(|_, value| {
            if let Some(inner) = value.as_handle() {
                inner.len();
            }
        });
    });
    let fields = spy(&rt, &map, |m| {
        for value in m.values() {
            if let Some(inner) = value.as_handle() {
                inner.get("foo");
            }
        }
    });

    if let Some(set) = map.get("set").as_handle() {
        set.delete(1);
    }
    assert_eq!(sizes.get(), 2);

    if let Some(record) = map.get(key).as_handle() {
        record.set("foo", 2);
    }
    assert_eq!(fields.get(), 2);
}

#[test]
fn map_keys_follow_key_set_only() {
    let rt = Runtime::new();
    let map = rt.reactive(Target::map([("key1", "value1"), ("key2", "value2")]));
    let runs = spy(&rt, &map, |m| {
        m.keys();
    });

    map.set("key2", "value3");
    assert_eq!(runs.get(), 1);

    map.delete("key1");
    assert_eq!(runs.get(), 2);

    map.set("key3", "value3");
    assert_eq!(runs.get(), 3);
}

#[test]
fn deleted_keys_release_their_dependency_sets() {
    let rt = Runtime::new();
    let map = rt.reactive(empty_map());
    let current = rt.reactive(Target::record([("key", "k0")]));

    let (m, c) = (map.clone(), current.clone());
    rt.effect(move || {
        m.has(c.get("key"));
    });

    for i in 1..=20 {
        let old = format!("k{}", i - 1);
        map.set(old.as_str(), i);
        current.set("key", format!("k{i}"));
        map.delete(old.as_str());
    }
    assert_eq!(rt.tracked_key_count(map.raw()), 1);

    map.set("k20", 0);
    assert!(map.clear());
    assert_eq!(rt.tracked_key_count(map.raw()), 1);
    assert!(!map.has("k20"));
}

// ----------------------------------------------------------------------------
// Sets
// ----------------------------------------------------------------------------

#[test]
fn set_size_follows_membership() {
    let rt = Runtime::new();
    let set = rt.reactive(Target::set_of([1, 2, 3]));
    assert_eq!(set.len(), 3);
    let runs = spy(&rt, &set, |s| {
        s.len();
    });

    set.add(4);
    assert_eq!(runs.get(), 2);

    set.add(3);
    assert_eq!(runs.get(), 2);

    set.delete(3);
    assert_eq!(runs.get(), 3);

    set.delete(9);
    assert_eq!(runs.get(), 3);
}

#[test]
fn set_for_each_follows_additions() {
    let rt = Runtime::new();
    let set = rt.reactive(Target::set_of(["bar"]));
    let runs = spy(&rt, &set, |s| s.for_each(|_, _| {}));

    set.add("foo");
    assert_eq!(runs.get(), 2);
}

#[test]
fn clearing_notifies_every_reader() {
    let rt = Runtime::new();
    let set = rt.reactive(Target::set_of(["a", "b"]));
    let member = spy(&rt, &set, |s| {
        s.has("a");
    });
    let size = spy(&rt, &set, |s| {
        s.len();
    });

    assert!(set.clear());
    assert_eq!((member.get(), size.get()), (2, 2));
    assert!(set.is_empty());
}
