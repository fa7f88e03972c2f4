use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::NaiveDate;
use proptest::prelude::*;
use structval_core::{
    ClassificationKind, Declaration, Reflect, Structural, TypeHandle, ValueObject, ValueObjectError, describe, equals,
    hash_of,
};
use uuid::Uuid;

structval_core::value_object! {
    /// A postal address.
    pub struct Address {
        pub street: String,
        pub city: String,
        pub lines: Vec<String>,
    }
}

structval_core::value_object! {
    pub struct Customer {
        pub id: Uuid,
        pub name: String,
        pub address: Option<Address>,
        pub scores: Vec<i64>,
        pub since: NaiveDate,
    }
}

structval_core::value_object! {
    pub struct Triple {
        pub value1: String,
        pub value2: String,
        pub value3: String,
    }
}

structval_core::value_object! {
    pub struct Marker {}
}

structval_core::value_object! {
    pub struct Sample {
        pub count: i64,
        pub values: Vec<i32>,
        pub note: Option<String>,
    }
}

structval_core::value_object! {
    /// A delivery route: a grid of leg durations and an ordered list of stops.
    pub struct Route {
        pub legs: Vec<Vec<i32>>,
        pub stops: Vec<Address>,
    }
}

#[derive(Debug, Clone)]
struct Connection {
    port: u16,
}

impl Reflect for Connection {
    fn type_handle() -> TypeHandle {
        TypeHandle::opaque::<Self>()
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: String,
    connection: Connection,
}

impl Structural for Session {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new()
            .field::<String>("User", |s| &s.user)
            .field::<Connection>("Connection", |s| &s.connection)
            .constructor(&["user", "connection"], |args| {
                Ok(Session {
                    user: args.next()?,
                    connection: args.next()?,
                })
            })
    }
}

static FLAKY_READY: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone)]
struct Flaky {
    value: u8,
}

impl Structural for Flaky {
    fn declare() -> Declaration<Self> {
        let declaration = Declaration::<Self>::new().field::<u8>("value", |f| &f.value);
        if FLAKY_READY.load(Ordering::SeqCst) {
            declaration.constructor(&["value"], |args| Ok(Flaky { value: args.next()? }))
        } else {
            declaration
        }
    }
}

#[derive(Debug, Clone)]
struct Contended {
    a: String,
    b: Vec<u32>,
}

impl Structural for Contended {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new()
            .field::<String>("a", |c| &c.a)
            .field::<Vec<u32>>("b", |c| &c.b)
            .constructor(&["a", "b"], |args| {
                Ok(Contended {
                    a: args.next()?,
                    b: args.next()?,
                })
            })
    }
}

fn init_tracing() {
    structval_observability::init();
}

fn address() -> Address {
    Address::new("1 Main St".into(), "Springfield".into(), vec!["Apt 4".into()])
}

fn customer() -> Customer {
    Customer::new(
        Uuid::nil(),
        "Ada".into(),
        Some(address()),
        vec![3, 1, 2],
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
    )
}

#[test]
fn separately_built_customers_are_equal_and_hash_alike() {
    init_tracing();
    let a = customer();
    let b = customer();
    assert_eq!(a, b);
    assert_eq!(a.try_hash().unwrap(), b.try_hash().unwrap());

    let mut set = HashSet::new();
    set.insert(a);
    assert!(set.contains(&b));
}

#[test]
fn nested_difference_is_detected() {
    init_tracing();
    let moved = customer()
        .evolve("address", Some(Address::new("2 Elm St".into(), "Springfield".into(), vec![])))
        .unwrap();
    assert_ne!(customer(), moved);
    assert_ne!(customer(), customer().evolve("address", None::<Address>).unwrap());
}

#[test]
fn score_order_matters() {
    init_tracing();
    let reordered = customer().evolve("scores", vec![1i64, 2, 3]).unwrap();
    assert_ne!(customer(), reordered);
    assert_ne!(customer().try_hash().unwrap(), reordered.try_hash().unwrap());
}

#[test]
fn evolve_builds_a_new_instance() {
    init_tracing();
    let p = Triple::new("first".into(), "second".into(), "third".into());
    let q = p.evolve("value2", "two".to_string()).unwrap();

    assert_eq!(q, Triple::new("first".into(), "two".into(), "third".into()));
    assert_eq!(p, Triple::new("first".into(), "second".into(), "third".into()));
}

#[test]
fn evolve_rejects_unknown_field_and_wrong_type() {
    init_tracing();
    let p = Triple::new("a".into(), "b".into(), "c".into());

    let err = p.evolve("value4", "d".to_string()).unwrap_err();
    assert!(matches!(err, ValueObjectError::UnknownField { ref field, .. } if field == "value4"));
    assert!(err.is_usage());

    let err = p.evolve("value1", 1u32).unwrap_err();
    assert!(matches!(err, ValueObjectError::TypeMismatch { name: "value1", .. }));
}

#[test]
fn field_less_values_are_interchangeable() {
    init_tracing();
    assert_eq!(Marker::new(), Marker::new());
    assert_eq!(hash_of(&Marker::new()).unwrap(), hash_of(&Marker::new()).unwrap());
}

#[test]
fn equals_dyn_never_crosses_types() {
    init_tracing();
    let triple = Triple::new("a".into(), "b".into(), "c".into());
    assert!(triple.equals_dyn(&triple.clone()));
    assert!(!triple.equals_dyn(&Marker::new()));
    assert!(!triple.equals_dyn(&address()));
}

#[test]
fn descriptor_reports_classifications() {
    init_tracing();
    let descriptor = describe::<Customer>().unwrap();
    let summary = descriptor.summary();
    let kinds: Vec<_> = summary.fields.iter().map(|f| (f.name, f.classification)).collect();
    assert_eq!(
        kinds,
        vec![
            ("id", ClassificationKind::ValueEquatable),
            ("name", ClassificationKind::ValueEquatable),
            ("address", ClassificationKind::CustomEquatable),
            ("scores", ClassificationKind::OrderedSequence),
            ("since", ClassificationKind::ValueEquatable),
        ]
    );
    assert_eq!(summary.constructor_parameters, vec!["id", "name", "address", "scores", "since"]);
}

#[test]
fn unsupported_field_blocks_equality_but_not_evolve() {
    init_tracing();
    let session = Session {
        user: "ada".into(),
        connection: Connection { port: 5432 },
    };

    let err = equals(&session, &session.clone()).unwrap_err();
    match err {
        ValueObjectError::UnsupportedField { field, field_type, .. } => {
            assert_eq!(field, "Connection");
            assert!(field_type.ends_with("Connection"));
        }
        other => panic!("expected unsupported field, got {other:?}"),
    }
    assert!(hash_of(&session).is_err());

    let evolved = structval_core::evolve(&session, "User", "bob".to_string()).unwrap();
    assert_eq!(evolved.user, "bob");
    assert_eq!(evolved.connection.port, 5432);
}

#[test]
fn failed_synthesis_is_retried_not_cached() {
    init_tracing();
    let flaky = Flaky { value: 7 };

    let err = equals(&flaky, &flaky.clone()).unwrap_err();
    assert!(matches!(err, ValueObjectError::MissingConstructor { .. }));
    assert!(err.is_configuration());

    FLAKY_READY.store(true, Ordering::SeqCst);
    assert!(equals(&flaky, &flaky.clone()).unwrap());
    assert_eq!(structval_core::evolve(&flaky, "value", 9u8).unwrap().value, 9);
}

#[test]
fn concurrent_first_use_publishes_one_descriptor() {
    init_tracing();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let descriptor = describe::<Contended>().unwrap();
                let value = Contended {
                    a: "x".into(),
                    b: vec![i as u32],
                };
                assert!(equals(&value, &value.clone()).unwrap());
                descriptor
            })
        })
        .collect();

    let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for descriptor in &descriptors[1..] {
        assert!(Arc::ptr_eq(&descriptors[0], descriptor));
    }
}

#[test]
fn reordered_inner_sequences_change_route_hash() {
    init_tracing();
    let stop = |street: &str| Address::new(street.into(), "Springfield".into(), vec![]);
    let route = Route::new(vec![vec![1, 2], vec![3]], vec![stop("a"), stop("b")]);

    let regrouped = route.evolve("legs", vec![vec![2, 1], vec![3]]).unwrap();
    let reversed_stops = route.evolve("stops", vec![stop("b"), stop("a")]).unwrap();

    assert_ne!(route, regrouped);
    assert_ne!(route.try_hash().unwrap(), regrouped.try_hash().unwrap());
    assert_ne!(route, reversed_stops);
    assert_ne!(route.try_hash().unwrap(), reversed_stops.try_hash().unwrap());
}

fn address_strategy() -> impl Strategy<Value = Address> {
    ("[ab]{0,1}", "[xy]{0,1}", prop::collection::vec("[a-c]", 0..2))
        .prop_map(|(street, city, lines)| Address::new(street, city, lines))
}

fn route_strategy() -> impl Strategy<Value = Route> {
    (
        prop::collection::vec(prop::collection::vec(-2i32..2, 0..3), 0..3),
        prop::collection::vec(address_strategy(), 0..3),
    )
        .prop_map(|(legs, stops)| Route::new(legs, stops))
}

fn sample_strategy() -> impl Strategy<Value = Sample> {
    (
        -5i64..5,
        prop::collection::vec(-3i32..3, 0..4),
        prop::option::of("[ab]{0,2}"),
    )
        .prop_map(|(count, values, note)| Sample::new(count, values, note))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Equality is reflexive, symmetric, and agrees with field-wise comparison.
    #[test]
    fn equality_is_reflexive_and_symmetric(a in sample_strategy(), b in sample_strategy()) {
        prop_assert!(equals(&a, &a.clone()).unwrap());
        prop_assert_eq!(equals(&a, &b).unwrap(), equals(&b, &a).unwrap());

        let field_wise = a.count == b.count && a.values == b.values && a.note == b.note;
        prop_assert_eq!(equals(&a, &b).unwrap(), field_wise);
    }

    /// Equal values always hash alike.
    #[test]
    fn equal_values_hash_alike(a in sample_strategy(), b in sample_strategy()) {
        if a == b {
            prop_assert_eq!(hash_of(&a).unwrap(), hash_of(&b).unwrap());
        }
        prop_assert_eq!(hash_of(&a).unwrap(), hash_of(&a.clone()).unwrap());
    }

    /// Equality is transitive across three draws.
    #[test]
    fn equality_is_transitive(a in sample_strategy(), b in sample_strategy(), c in sample_strategy()) {
        if a == b && b == c {
            prop_assert_eq!(&a, &c);
        }
    }

    /// Evolving a field to its current value yields an equal instance.
    #[test]
    fn evolve_with_current_value_is_identity(a in sample_strategy()) {
        let same = a.evolve("values", a.values.clone()).unwrap();
        prop_assert_eq!(&a, &same);
        prop_assert_eq!(a.try_hash().unwrap(), same.try_hash().unwrap());
    }

    /// Sequence equality is positional.
    #[test]
    fn reversed_sequences_equal_only_when_palindromic(values in prop::collection::vec(-3i32..3, 0..5)) {
        let forward = Sample::new(0, values.clone(), None);
        let mut reversed_values = values.clone();
        reversed_values.reverse();
        let reversed = Sample::new(0, reversed_values.clone(), None);
        prop_assert_eq!(forward == reversed, values == reversed_values);
    }

    /// Nested sequences and sequences of value objects hash consistently
    /// with equality.
    #[test]
    fn nested_sequence_hash_follows_equality(a in route_strategy(), b in route_strategy()) {
        let rebuilt = Route::new(a.legs.clone(), a.stops.clone());
        prop_assert_eq!(&a, &rebuilt);
        prop_assert_eq!(hash_of(&a).unwrap(), hash_of(&rebuilt).unwrap());

        if a == b {
            prop_assert_eq!(hash_of(&a).unwrap(), hash_of(&b).unwrap());
        }
    }

    /// Reversing one inner sequence changes both the value and the hash.
    #[test]
    fn reversed_inner_leg_changes_hash(a in route_strategy(), first in -2i32..2, step in 1i32..3) {
        let mut legs = a.legs.clone();
        legs.insert(0, vec![first, first + step]);
        let route = Route::new(legs.clone(), a.stops.clone());

        legs[0].reverse();
        let reversed = route.evolve("legs", legs).unwrap();
        prop_assert_ne!(&route, &reversed);
        prop_assert_ne!(hash_of(&route).unwrap(), hash_of(&reversed).unwrap());
    }
}
