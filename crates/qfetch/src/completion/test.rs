use crate::{
    completion::CompletionMap,
    request::{Batch, Request},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key(u32);

impl Request for Key {
    type Value = u32;
    type Error = &'static str;
}

#[test]
fn insert_never_overwrites() {
    let mut map = CompletionMap::<Key>::new();

    assert!(map.succeed(Key(1), 10));
    assert!(!map.fail(Key(1), "late failure"));
    assert!(!map.succeed(Key(1), 20));

    assert_eq!(map.get(&Key(1)), Some(&Ok(10)));
    assert_eq!(map.len(), 1);
}

#[test]
fn merge_keeps_existing_outcomes() {
    let mut left = CompletionMap::<Key>::new();
    left.succeed(Key(1), 1);

    let mut right = CompletionMap::<Key>::new();
    right.succeed(Key(1), 100);
    right.fail(Key(2), "boom");

    left.merge(right);

    assert_eq!(left.get(&Key(1)), Some(&Ok(1)));
    assert_eq!(left.get(&Key(2)), Some(&Err("boom")));
    assert_eq!(left.len(), 2);
}

#[test]
fn restrict_returns_only_the_submitters_requests() {
    let map = [(Key(1), Ok(1)), (Key(2), Ok(2)), (Key(3), Err("nope"))]
        .into_iter()
        .collect::<CompletionMap<Key>>();

    let batches = vec![Batch::single(Key(3)), Batch::new(vec![Key(1)])];
    let slice = map.restrict(&batches);

    assert_eq!(slice.len(), 2);
    assert_eq!(slice.get(&Key(1)), Some(&Ok(1)));
    assert_eq!(slice.get(&Key(3)), Some(&Err("nope")));
    assert!(!slice.contains(&Key(2)));
}

#[test]
fn fail_missing_fills_only_unanswered_requests() {
    let mut map = CompletionMap::<Key>::new();
    map.succeed(Key(1), 1);

    let batches = vec![Batch::new(vec![Key(1), Key(2)]), Batch::single(Key(3))];

    assert_eq!(map.missing(&batches), vec![&Key(2), &Key(3)]);

    map.fail_missing(&batches, &"transport");

    assert!(map.missing(&batches).is_empty());
    assert_eq!(map.get(&Key(1)), Some(&Ok(1)));
    assert_eq!(map.get(&Key(2)), Some(&Err("transport")));
    assert_eq!(map.get(&Key(3)), Some(&Err("transport")));
}
