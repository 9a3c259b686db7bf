//! Property-based tests for curve lookup, resolution, scoring, ingestion and
//! sampling.

use memstress::curve::{Curve, LatencyEstimate};
use memstress::sample::Sample;
use memstress::trace::{IngestOptions, TraceIngestor};
use memstress::{CurveSet, StressSampler, StressScorer};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;

/// Curve points with strictly increasing bandwidth and non-decreasing latency
fn monotone_points() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((1u32..500, 0u32..50), 2..12).prop_map(|steps| {
        let mut bw = 500.0;
        let mut lat = 80.0;
        steps
            .into_iter()
            .map(|(dbw, dlat)| {
                bw += f64::from(dbw);
                lat += f64::from(dlat);
                (bw, lat)
            })
            .collect()
    })
}

fn curve_from(ratio: u32, points: &[(f64, f64)]) -> Curve {
    let (bws, lats): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
    Curve::new(ratio, bws, lats).unwrap().with_warnings(false)
}

fn sample(node: u32, socket: u32, ts: u64, stress: f64) -> Sample {
    Sample {
        node,
        node_name: format!("n{}", node),
        socket,
        memory_channel: 0,
        timestamp_ns: ts,
        write_ratio: 50.0,
        bandwidth_gbs: 1.0,
        latency_ns: 100.0,
        max_bandwidth_gbs: None,
        min_latency_ns: None,
        max_latency_ns: None,
        stress_score: Some(stress),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_bandwidths_sorted_regardless_of_input_order(
        points in monotone_points(),
        reverse in any::<bool>(),
    ) {
        let mut input = points.clone();
        if reverse {
            input.reverse();
        }
        let curve = curve_from(50, &input);
        prop_assert!(curve.bandwidths().windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(curve.bandwidths().len(), points.len());
    }

    #[test]
    fn prop_zero_bandwidth_is_undefined(points in monotone_points()) {
        let curve = curve_from(50, &points);
        prop_assert_eq!(curve.latency(0.0), LatencyEstimate::Undefined);
    }

    #[test]
    fn prop_interpolation_hits_recorded_points(points in monotone_points()) {
        let curve = curve_from(50, &points);
        // The last recorded point is the overshoot boundary
        for &(bw, lat) in &points[..points.len() - 1] {
            let estimate = curve.latency(bw / 1000.0).value().unwrap();
            prop_assert!((estimate - lat).abs() < 1e-6, "{} vs {}", estimate, lat);
        }
        prop_assert!(curve.latency((points[points.len() - 1].0 + 1.0) / 1000.0).is_overshoot());
    }

    #[test]
    fn prop_latency_monotone_inside_range(points in monotone_points(), a in 0.0f64..1.0, b in 0.0f64..1.0) {
        let curve = curve_from(50, &points);
        let lo = points[0].0;
        let hi = points[points.len() - 1].0;
        let (x, y) = if a <= b { (a, b) } else { (b, a) };
        let bw_x = (lo + x * (hi - lo)) / 1000.0;
        let bw_y = (lo + y * (hi - lo)) / 1000.0;
        if let (Some(lx), Some(ly)) = (curve.latency(bw_x).value(), curve.latency(bw_y).value()) {
            prop_assert!(lx <= ly + 1e-9);
        }
    }

    #[test]
    fn prop_resolve_picks_closest_smaller_on_tie(
        ratios in prop::collection::btree_set(0u32..=100, 1..8),
        query in 0u32..=100,
    ) {
        let points = vec![(1000.0, 100.0), (2000.0, 150.0)];
        let set = CurveSet::from_curves(ratios.iter().map(|&r| curve_from(r, &points)))
            .unwrap()
            .with_warnings(false);

        let resolved = set.resolve(f64::from(query)).unwrap().read_ratio();
        if ratios.contains(&query) {
            prop_assert_eq!(resolved, query);
        }
        let best = ratios
            .iter()
            .copied()
            .min_by_key(|&r| (r.abs_diff(query), r))
            .unwrap();
        prop_assert_eq!(resolved, best);
    }

    #[test]
    fn prop_on_curve_score_within_unit_interval(points in monotone_points(), t in 0.0f64..1.0) {
        let curve = curve_from(50, &points);
        let scorer = StressScorer::default();
        let lo = points[0].0;
        let hi = points[points.len() - 1].0;
        let bw = (lo + t * (hi - lo)) / 1000.0;

        match curve.latency(bw).value() {
            Some(lat) => {
                let score = scorer.score(&curve, bw, lat).unwrap();
                prop_assert!((-1e-9..=1.0 + 1e-9).contains(&score), "score {}", score);
            }
            None => prop_assert_eq!(scorer.score(&curve, bw, 0.0), None),
        }
        prop_assert_eq!(scorer.score(&curve, 0.0, 12345.0), Some(0.0));
    }

    #[test]
    fn prop_forward_fill_and_idle_rows(
        rows in prop::collection::vec((0i64..50, 0i64..50, any::<bool>()), 1..40),
    ) {
        let mut text = String::from("#Paraver header\n");
        for (i, (bw, lat, omit_bw)) in rows.iter().enumerate() {
            if *omit_bw && i > 0 {
                text.push_str(&format!("2:0:2:0:0:{}:1:50:4:{}\n", i, lat));
            } else {
                text.push_str(&format!("2:0:2:0:0:{}:1:50:2:{}:4:{}\n", i, bw, lat));
            }
        }

        let ingestor = TraceIngestor::new(IngestOptions::new(0));
        let names = vec!["orig".to_string(), "node-a".to_string()];
        let samples: Vec<Sample> = ingestor
            .stream(Cursor::new(text), Path::new("p.prv"), names, None)
            .collect::<memstress::Result<_>>()
            .unwrap();

        // Expected bandwidth per row after fill
        let mut last_bw = 0i64;
        let mut expected = Vec::new();
        for (i, (bw, lat, omit_bw)) in rows.iter().enumerate() {
            if !(*omit_bw && i > 0) {
                last_bw = *bw;
            }
            if !(last_bw == 0 && *lat == 0) {
                expected.push((i as u64, last_bw as f64));
            }
        }

        prop_assert!(samples.iter().all(|s| !(s.bandwidth_gbs == 0.0 && s.latency_ns == 0.0)));
        let got: Vec<(u64, f64)> = samples.iter().map(|s| (s.timestamp_ns, s.bandwidth_gbs)).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_sampler_budget_and_partition_guarantees(
        sizes in prop::collection::vec(1usize..60, 1..6),
        budget in 1usize..80,
    ) {
        let mut samples = Vec::new();
        for (p, &size) in sizes.iter().enumerate() {
            for i in 0..size {
                samples.push(sample(2, p as u32, (p * 1000 + i) as u64, i as f64 / size as f64));
            }
        }

        let sampler = StressSampler::with_budget(budget);
        let kept = sampler.select(&samples);
        let per_partition = sampler.per_partition_budget(sizes.len());

        // Ascending, unique indices
        prop_assert!(kept.windows(2).all(|w| w[0] < w[1]));
        if samples.len() > budget && budget >= sizes.len() {
            prop_assert!(kept.len() <= budget);
        }

        let mut per_socket: BTreeMap<u32, usize> = BTreeMap::new();
        for &i in &kept {
            *per_socket.entry(samples[i].socket).or_default() += 1;
        }
        for (p, &size) in sizes.iter().enumerate() {
            let got = per_socket.get(&(p as u32)).copied().unwrap_or(0);
            if samples.len() <= budget || size < per_partition {
                prop_assert_eq!(got, size);
            } else {
                prop_assert!(got >= 1);
            }
        }

        let partitions: BTreeSet<u32> = kept.iter().map(|&i| samples[i].socket).collect();
        prop_assert_eq!(partitions.len(), sizes.len());
    }
}
