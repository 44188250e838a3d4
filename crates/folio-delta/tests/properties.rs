//! Property-based tests for the delta algebra
//!
//! These tests verify the laws the sync engine relies on:
//!  - Convergence: a ∘ T(a, b, true) = b ∘ T(b, a, false)
//!  - Invert identity: (D ∘ x) ∘ invert(x, D) = D
//!  - Compose associativity: (a ∘ b) ∘ c = a ∘ (b ∘ c)
//!  - Empty delta is the identity for compose

use folio_delta::{AttributeMap, Delta, Op, TextRange};
use proptest::prelude::*;
use serde_json::Value;

/// One step of a generated change, interpreted against a document length.
#[derive(Clone, Debug)]
enum Step {
    Insert(String, AttributeMap),
    Retain(usize, AttributeMap),
    Delete(usize),
}

fn document_attrs_strategy() -> impl Strategy<Value = AttributeMap> {
    prop_oneof![
        4 => Just(AttributeMap::new()),
        1 => Just(AttributeMap::new().with("bold", true)),
        1 => Just(AttributeMap::new().with("italic", true)),
        1 => Just(AttributeMap::new().with("color", "red")),
    ]
}

fn retain_attrs_strategy() -> impl Strategy<Value = AttributeMap> {
    prop_oneof![
        4 => Just(AttributeMap::new()),
        1 => Just(AttributeMap::new().with("bold", true)),
        1 => Just(AttributeMap::new().with("bold", Value::Null)),
        1 => Just(AttributeMap::new().with("color", "blue")),
    ]
}

fn document_strategy() -> impl Strategy<Value = Delta> {
    prop::collection::vec(("[a-zé ]{1,6}", document_attrs_strategy()), 0..6).prop_map(
        |chunks| {
            let mut doc = Delta::new();
            for (text, attrs) in chunks {
                doc.insert_with(&text, attrs);
            }
            doc.insert("\n");
            doc
        },
    )
}

fn steps_strategy() -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        ("[a-zé]{1,4}", document_attrs_strategy()).prop_map(|(t, a)| Step::Insert(t, a)),
        (1usize..6, retain_attrs_strategy()).prop_map(|(n, a)| Step::Retain(n, a)),
        (1usize..4).prop_map(Step::Delete),
    ];
    prop::collection::vec(step, 0..8)
}

/// Build a change valid for a document of `length` characters.
fn build_change(length: usize, steps: &[Step]) -> Delta {
    let mut remaining = length;
    let mut delta = Delta::new();
    for step in steps {
        match step {
            Step::Insert(text, attrs) => {
                delta.insert_with(text, attrs.clone());
            }
            Step::Retain(n, attrs) => {
                let n = (*n).min(remaining);
                delta.retain_with(n, attrs.clone());
                remaining -= n;
            }
            Step::Delete(n) => {
                let n = (*n).min(remaining);
                delta.delete(n);
                remaining -= n;
            }
        }
    }
    delta
}

fn apply(doc: &Delta, change: &Delta) -> Delta {
    change.apply_to(doc).expect("generated change fits its document")
}

proptest! {
    #[test]
    fn transform_converges(
        doc in document_strategy(),
        a_steps in steps_strategy(),
        b_steps in steps_strategy()
    ) {
        let a = build_change(doc.length(), &a_steps);
        let b = build_change(doc.length(), &b_steps);

        let left = apply(&apply(&doc, &a), &a.transform(&b, true));
        let right = apply(&apply(&doc, &b), &b.transform(&a, false));
        prop_assert_eq!(left, right);

        let left = apply(&apply(&doc, &a), &a.transform(&b, false));
        let right = apply(&apply(&doc, &b), &b.transform(&a, true));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn invert_restores_document(doc in document_strategy(), steps in steps_strategy()) {
        let change = build_change(doc.length(), &steps);
        let applied = apply(&doc, &change);
        let inverse = change.invert(&doc).unwrap();

        prop_assert_eq!(apply(&applied, &inverse), doc);
    }

    #[test]
    fn compose_is_associative(
        doc in document_strategy(),
        a_steps in steps_strategy(),
        b_steps in steps_strategy(),
        c_steps in steps_strategy()
    ) {
        let a = build_change(doc.length(), &a_steps);
        let after_a = apply(&doc, &a);
        let b = build_change(after_a.length(), &b_steps);
        let after_b = apply(&after_a, &b);
        let c = build_change(after_b.length(), &c_steps);
        let sequential = apply(&after_b, &c);

        let left = a.compose(&b).compose(&c);
        let right = a.compose(&b.compose(&c));
        prop_assert_eq!(apply(&doc, &left), sequential.clone());
        prop_assert_eq!(apply(&doc, &right), sequential);
    }

    #[test]
    fn compose_with_empty_is_identity(doc in document_strategy(), steps in steps_strategy()) {
        // Composition chops the implied trailing retain.
        let change = build_change(doc.length(), &steps).chop();

        prop_assert_eq!(change.compose(&Delta::new()), change.clone());
        prop_assert_eq!(Delta::new().compose(&change), change.clone());
        prop_assert_eq!(apply(&doc, &Delta::new()), doc);
    }

    #[test]
    fn transform_preserves_change_length(
        doc in document_strategy(),
        a_steps in steps_strategy(),
        b_steps in steps_strategy()
    ) {
        let a = build_change(doc.length(), &a_steps);
        let b = build_change(doc.length(), &b_steps);
        let rebased = a.transform(&b, true);

        // Rebased inserts are never dropped; deletes may shrink where `a` already deleted.
        let inserted = |d: &Delta| d.ops().iter().filter(|op| op.is_insert()).map(Op::len).sum::<usize>();
        prop_assert_eq!(inserted(&rebased), inserted(&b));
        prop_assert!(rebased.base_length() <= apply(&doc, &a).length());
    }

    #[test]
    fn formatting_never_moves_positions(
        doc in document_strategy(),
        position in 0usize..40,
        attrs in retain_attrs_strategy()
    ) {
        let mut format = Delta::new();
        format.retain_with(doc.length(), attrs);

        prop_assert_eq!(format.transform_position(position, false), position);
        prop_assert_eq!(format.transform_position(position, true), position);
    }

    #[test]
    fn range_stays_inside_document(
        doc in document_strategy(),
        steps in steps_strategy(),
        index in 0usize..20,
        length in 0usize..20
    ) {
        let index = index.min(doc.length());
        let length = length.min(doc.length() - index);
        let change = build_change(doc.length(), &steps);
        let moved = TextRange::new(index, length).transform(&change);

        prop_assert!(moved.end() <= apply(&doc, &change).length());
    }
}

#[test]
fn cursor_moves_as_documented() {
    let mut insert = Delta::new();
    insert.insert("xyz");
    assert_eq!(insert.transform_position(5, false), 8);

    let mut delete = Delta::new();
    delete.retain(1).delete(3);
    assert_eq!(delete.transform_position(5, false), 2);

    let mut tag = Delta::new();
    tag.retain_with(1, AttributeMap::new().with("highlight", "T1"));
    assert_eq!(tag.transform_position(5, false), 5);
}
