//! Property-based tests for gentrace
//!
//! Uses proptest to verify the weight and score identities of the
//! generative function interface.

use gentrace::prelude::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Two-address model: `x ~ Normal(prior_mean, prior_std)`,
/// `z ~ Normal(x, noise_std)`.
fn two_level(prior_mean: f64, prior_std: f64, noise_std: f64) -> DynGenFn<(), f64> {
    DynGenFn::new(move |ctx, _| {
        let x: f64 = ctx.sample("x", &Normal::new(prior_mean, prior_std)?)?;
        let z: f64 = ctx.sample("z", &Normal::new(x, noise_std)?)?;
        Ok(z)
    })
}

proptest! {
    // ==================== Score and weight identities ====================

    #[test]
    fn score_is_sum_of_choice_logpdfs(
        seed in any::<u64>(),
        prior_mean in -5.0f64..5.0,
        prior_std in 0.1f64..3.0,
        noise_std in 0.1f64..3.0,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = two_level(prior_mean, prior_std, noise_std);
        let trace = model.simulate(&mut rng, ()).unwrap();

        let x: f64 = trace.value(&addr!("x")).unwrap();
        let z: f64 = trace.value(&addr!("z")).unwrap();
        let expected = Normal::new(prior_mean, prior_std).unwrap().logpdf(&x)
            + Normal::new(x, noise_std).unwrap().logpdf(&z);
        prop_assert!((trace.score() - expected).abs() < 1e-10);
    }

    #[test]
    fn generate_weight_is_constrained_logpdf_sum(
        seed in any::<u64>(),
        noise_std in 0.05f64..2.0,
        observed in -5.0f64..5.0,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = two_level(0.0, 1.0, noise_std);
        let constraints =
            ChoiceMap::from_pairs(vec![(addr!("z"), ChoiceValue::F64(observed))]).unwrap();

        let (trace, weight) = model.generate(&mut rng, (), &constraints).unwrap();
        let x: f64 = trace.value(&addr!("x")).unwrap();
        let expected = Normal::new(x, noise_std).unwrap().logpdf(&observed);
        prop_assert!((weight - expected).abs() < 1e-10);
    }

    #[test]
    fn fully_constrained_generate_weight_equals_score(
        seed in any::<u64>(),
        x in -3.0f64..3.0,
        z in -3.0f64..3.0,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = two_level(0.0, 1.0, 0.5);
        let constraints = ChoiceMap::from_pairs(vec![
            (addr!("x"), ChoiceValue::F64(x)),
            (addr!("z"), ChoiceValue::F64(z)),
        ]).unwrap();

        let (trace, weight) = model.generate(&mut rng, (), &constraints).unwrap();
        prop_assert!((weight - trace.score()).abs() < 1e-10);
    }

    // ==================== Update reversibility ====================

    #[test]
    fn update_round_trip_restores_trace(
        seed in any::<u64>(),
        new_x in -4.0f64..4.0,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = two_level(0.0, 1.0, 0.5);
        let trace = model.simulate(&mut rng, ()).unwrap();

        let constraints =
            ChoiceMap::from_pairs(vec![(addr!("x"), ChoiceValue::F64(new_x))]).unwrap();
        let out = model
            .update(&mut rng, &trace, (), ArgDiff::NoChange, &constraints)
            .unwrap();
        let back = model
            .update(&mut rng, &out.trace, (), ArgDiff::NoChange, &out.discard)
            .unwrap();

        prop_assert_eq!(back.trace.choices(), trace.choices());
        prop_assert!((back.weight + out.weight).abs() < 1e-10);
        prop_assert_eq!(back.discard, constraints);
    }

    #[test]
    fn update_weight_matches_score_delta(
        seed in any::<u64>(),
        new_x in -4.0f64..4.0,
        new_z in -4.0f64..4.0,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = two_level(0.0, 1.0, 0.5);
        let trace = model.simulate(&mut rng, ()).unwrap();

        let constraints = ChoiceMap::from_pairs(vec![
            (addr!("x"), ChoiceValue::F64(new_x)),
            (addr!("z"), ChoiceValue::F64(new_z)),
        ]).unwrap();
        let out = model
            .update(&mut rng, &trace, (), ArgDiff::NoChange, &constraints)
            .unwrap();

        // same address set before and after, so the weight is the score delta
        prop_assert!((out.weight - (out.trace.score() - trace.score())).abs() < 1e-10);
    }

    // ==================== Choice map laws ====================

    #[test]
    fn merge_of_disjoint_maps_keeps_all_leaves(
        left in prop::collection::vec(-10.0f64..10.0, 1..8),
        right in prop::collection::vec(-10.0f64..10.0, 1..8),
    ) {
        let a = ChoiceMap::from_pairs(
            left.iter()
                .enumerate()
                .map(|(i, v)| (addr!(format!("a{i}")), ChoiceValue::F64(*v))),
        )
        .unwrap();
        let b = ChoiceMap::from_pairs(
            right.iter()
                .enumerate()
                .map(|(i, v)| (addr!(format!("b{i}")), ChoiceValue::F64(*v))),
        )
        .unwrap();

        let merged = a.merge(&b).unwrap();
        prop_assert_eq!(merged.len(), a.len() + b.len());
    }

    #[test]
    fn merge_with_self_conflicts(
        values in prop::collection::vec(-10.0f64..10.0, 1..8),
    ) {
        let map = ChoiceMap::from_pairs(
            values.iter()
                .enumerate()
                .map(|(i, v)| (addr!(format!("k{i}")), ChoiceValue::F64(*v))),
        )
        .unwrap();
        prop_assert!(map.merge(&map).is_err());
    }

    #[test]
    fn choice_map_round_trips_through_iter(
        values in prop::collection::vec(-10.0f64..10.0, 1..10),
    ) {
        let map = ChoiceMap::from_pairs(
            values.iter()
                .enumerate()
                .map(|(i, v)| (addr!(i), ChoiceValue::F64(*v))),
        )
        .unwrap();

        let rebuilt =
            ChoiceMap::from_pairs(map.iter().map(|(a, v)| (a, v.clone()))).unwrap();
        prop_assert_eq!(rebuilt, map);
    }
}
