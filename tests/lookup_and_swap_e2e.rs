use std::collections::HashSet;

use ndarray::array;
use pointfix::coords::{sample_coords, swap, swap_buggy};
use pointfix::fruits::{id_to_fruit, id_to_fruit_unordered, sample_fruits};
use pointfix::Error;

#[test]
fn fruit_ids_rank_the_sorted_set() {
    let fruits = sample_fruits();
    let got: Vec<String> = (0..5).map(|i| id_to_fruit(i, &fruits).unwrap()).collect();
    assert_eq!(got, ["apple", "kiwi", "melon", "orange", "strawberry"]);
    assert_eq!(id_to_fruit(1, &fruits).unwrap(), "kiwi");
    assert_eq!(id_to_fruit(4, &fruits).unwrap(), "strawberry");
}

#[test]
fn fruit_ids_out_of_range_are_errors_in_both_variants() {
    let fruits = sample_fruits();
    for id in [-1, 5, i64::MAX] {
        assert!(matches!(
            id_to_fruit(id, &fruits),
            Err(Error::OutOfRange { len: 5, .. })
        ));
        assert!(matches!(
            id_to_fruit_unordered(id, &fruits),
            Err(Error::OutOfRange { len: 5, .. })
        ));
    }
    let empty = HashSet::new();
    assert!(id_to_fruit(0, &empty).is_err());
}

#[test]
fn unordered_lookup_still_returns_members() {
    let fruits = sample_fruits();
    let picked: HashSet<String> = (0..5)
        .map(|i| id_to_fruit_unordered(i, &fruits).unwrap())
        .collect();
    assert_eq!(picked, fruits);
}

#[test]
fn coords_swap_pairs_and_keeps_the_class_id() {
    let original = sample_coords();
    let swapped = swap(&original.view()).unwrap();

    assert_eq!(swapped.row(0).to_vec(), vec![5, 10, 6, 15, 0]);
    assert_eq!(swapped.column(4), original.column(4));
    assert_eq!(swap(&swapped.view()).unwrap(), original);
    // Input untouched.
    assert_eq!(original, sample_coords());
}

#[test]
fn buggy_swap_loses_x1_and_x2() {
    let mut m = array![[10i64, 5, 15, 6, 0]];
    swap_buggy(&mut m).unwrap();
    assert_eq!(m, array![[5i64, 5, 6, 6, 0]]);
}

#[test]
fn coords_with_wrong_width_are_rejected() {
    let m = array![[1.0f32, 2.0, 3.0, 4.0]];
    assert!(matches!(swap(&m.view()), Err(Error::Shape(_))));
    let mut m = m;
    assert!(swap_buggy(&mut m).is_err());
}
