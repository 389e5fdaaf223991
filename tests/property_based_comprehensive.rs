//! Property-based tests for the moment pipeline
//!
//! Core properties:
//! 1. Leave-one-out counts and sums agree with the group aggregates
//! 2. Composed SQL is well formed for arbitrary column names
//! 3. Assembled covariance matrices are symmetric
//! 4. Treatment effects never pair an arm with itself
//! 5. Noiseless linear data is recovered exactly by the solver

mod utils;

use jive::executor::execute;
use jive::{
    harmonic_weight, ols_from_covariance, query_moments, AugmentedCovariance, EffectSpec,
    MomentQuery, SolverConfig, SqlValue, TreatmentEffectTable,
};
use nalgebra::DMatrix;
use proptest::prelude::*;
use utils::db_from_sql;

/// Rows of (group, arm, x, y) with small integer values
fn grouped_rows() -> impl Strategy<Value = Vec<(u8, u8, i32, i32)>> {
    prop::collection::vec((0u8..4, 0u8..3, -50i32..50, -50i32..50), 1..40)
}

fn load(rows: &[(u8, u8, i32, i32)]) -> jive::SqliteExecutor {
    let values: Vec<String> = rows
        .iter()
        .map(|(g, a, x, y)| format!("('g{}', {}, {}, {})", g, a, x, y))
        .collect();
    db_from_sql(&format!(
        "CREATE TABLE obs (g TEXT, arm INTEGER, x INTEGER, y INTEGER);
         INSERT INTO obs VALUES {};",
        values.join(", ")
    ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_loo_count_and_sum_match_group(rows in grouped_rows()) {
        let db = load(&rows);
        let query = MomentQuery::new("obs", &["g"], &["x"]).unwrap();
        let records = execute(&query.joined_query(), &db).unwrap();
        prop_assert_eq!(records.len(), rows.len());

        let g = records.column_index("g").unwrap();
        let x = records.column_index("x").unwrap();
        let loo_sum = records.column_index("x|loo_sum").unwrap();
        let loo_count = records.column_index("x|loo_count").unwrap();

        for row in &records.rows {
            let name = row[g].to_string();
            let members: Vec<i64> = rows
                .iter()
                .filter(|(group, ..)| format!("g{}", group) == name)
                .map(|(_, _, value, _)| *value as i64)
                .collect();
            let total: i64 = members.iter().sum();

            prop_assert_eq!(row[loo_count].clone(), SqlValue::Integer(members.len() as i64 - 1));
            prop_assert_eq!(row[loo_sum].as_f64().unwrap() + row[x].as_f64().unwrap(), total as f64);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_composed_sql_executes_for_odd_names(name in "[a-zA-Z_][a-zA-Z0-9_ \"]{0,12}") {
        // Quoted identifiers survive spaces and embedded quotes
        prop_assume!(!name.eq_ignore_ascii_case("g") && !name.eq_ignore_ascii_case("row_count"));
        let quoted = name.replace('"', "\"\"");
        let db = db_from_sql(&format!(
            "CREATE TABLE \"t\" (g TEXT, \"{q}\" REAL);
             INSERT INTO \"t\" VALUES ('a', 1.0), ('a', 2.0);",
            q = quoted
        ));

        let table = query_moments(&db, "t", &["g"], &[name.as_str()]).unwrap();
        prop_assert_eq!(table.len(), 1);
        prop_assert_eq!(table.rows()[0].loo_cov(&name, &name).unwrap(), 2.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_summary_covariance_symmetric(rows in grouped_rows()) {
        let db = load(&rows);
        let moments = query_moments(&db, "obs", &["g", "arm"], &["x", "y"]).unwrap();
        let finite: Vec<_> = moments
            .rows()
            .iter()
            .filter(|row| row.row_count() >= 2)
            .cloned()
            .collect();
        prop_assume!(!finite.is_empty());

        let metrics = vec!["x".to_string(), "y".to_string()];
        let cov = AugmentedCovariance::accumulate(&finite, &metrics, None).unwrap();
        prop_assert!(cov.is_symmetric(1e-9));
        prop_assert_eq!(cov.total_weight(), finite.len() as f64);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_effects_pair_distinct_arms_against_minimum(rows in grouped_rows()) {
        let db = load(&rows);
        let moments = query_moments(&db, "obs", &["g", "arm"], &["x"]).unwrap();
        let spec = EffectSpec::new(vec!["g".to_string()], "arm");
        let effects = TreatmentEffectTable::from_moments(&moments, &spec).unwrap();

        for effect in effects.rows() {
            prop_assert!(effect.treatment_arm() > effect.reference_arm());
            let minimum = moments
                .rows()
                .iter()
                .filter(|row| row.group()[0] == effect.test()[0])
                .map(|row| row.group()[1].clone())
                .min()
                .unwrap();
            prop_assert_eq!(effect.reference_arm(), &minimum);
        }

        // One row per non-minimum arm
        let expected: usize = {
            let mut arms: Vec<(u8, u8)> = rows.iter().map(|(g, a, ..)| (*g, *a)).collect();
            arms.sort_unstable();
            arms.dedup();
            let tests = {
                let mut t: Vec<u8> = arms.iter().map(|(g, _)| *g).collect();
                t.dedup();
                t.len()
            };
            arms.len() - tests
        };
        prop_assert_eq!(effects.len(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_harmonic_weight_between_min_and_double_max(
        a in 1.0f64..1e6,
        b in 1.0f64..1e6,
    ) {
        let w = harmonic_weight(a, b);
        prop_assert!((w - harmonic_weight(b, a)).abs() <= 1e-9 * w);
        prop_assert!(w >= 2.0 * a.min(b) - 1e-9);
        prop_assert!(w <= 4.0 * a.max(b) + 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_noiseless_line_recovered(
        slope in -10.0f64..10.0,
        intercept in -10.0f64..10.0,
        xs in prop::collection::btree_set(-20i32..20, 3..8),
    ) {
        let mut cov = DMatrix::<f64>::zeros(3, 3);
        for x in xs {
            let x = x as f64;
            let z = [1.0, x, intercept + slope * x];
            for i in 0..3 {
                for j in 0..3 {
                    cov[(i, j)] += z[i] * z[j];
                }
            }
        }
        let beta = ols_from_covariance(&cov, &SolverConfig::default()).unwrap();
        prop_assert!((beta[0] - intercept).abs() < 1e-6, "intercept {}", beta[0]);
        prop_assert!((beta[1] - slope).abs() < 1e-6, "slope {}", beta[1]);
    }
}
