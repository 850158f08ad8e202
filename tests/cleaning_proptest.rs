use proptest::prelude::*;
use sales_etl::dataset::{ColumnType, Dataset, Value};
use sales_etl::pipeline::clean::{
    normalize_name, remove_duplicates, remove_outliers, standardize_column_names,
};
use sales_etl::pipeline::report::RecordingReporter;

fn dataset(rows: Vec<(u8, Option<i16>)>) -> Dataset {
    let rows = rows
        .into_iter()
        .map(|(region, sales)| {
            vec![
                Value::from(["North", "South", "East"][usize::from(region % 3)]),
                sales.map_or(Value::Missing, |s| Value::Float(f64::from(s))),
            ]
        })
        .collect();
    Dataset::new(
        vec![
            ("region".to_string(), ColumnType::Text),
            ("sales".to_string(), ColumnType::Float),
        ],
        rows,
    )
    .expect("rows are two wide")
}

fn rows_strategy() -> impl Strategy<Value = Vec<(u8, Option<i16>)>> {
    // Small domains so duplicates actually occur
    prop::collection::vec((0_u8..3, prop::option::of(-2_i16..3)), 0..40)
}

proptest! {
    #[test]
    fn name_normalization_is_idempotent(name in "[A-Za-z _]{0,24}") {
        let once = normalize_name(&name);
        prop_assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn standardizing_a_dataset_twice_changes_nothing(
        names in prop::collection::vec("[A-Za-z ]{1,12}", 1..6)
    ) {
        let columns = names.iter().map(|n| (n.clone(), ColumnType::Text)).collect();
        let ds = Dataset::new(columns, Vec::new()).unwrap();
        let reporter = RecordingReporter::new();
        let once = standardize_column_names(ds, &reporter);
        let twice = standardize_column_names(once.clone(), &reporter);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_removal_is_idempotent_and_never_grows(rows in rows_strategy()) {
        let ds = dataset(rows);
        let before = ds.len();
        let reporter = RecordingReporter::new();

        let once = remove_duplicates(ds, &reporter);
        prop_assert!(once.len() <= before);

        let twice = remove_duplicates(once.clone(), &reporter);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn outlier_filter_keeps_exactly_the_rows_at_or_below_max(
        rows in rows_strategy(),
        max in -3_i16..4
    ) {
        let ds = dataset(rows);
        let expected: Vec<Vec<Value>> = ds
            .rows()
            .iter()
            .filter(|row| row[1].as_f64().map_or(true, |v| v <= f64::from(max)))
            .cloned()
            .collect();

        let out = remove_outliers(ds, "sales", f64::from(max), &RecordingReporter::new()).unwrap();
        prop_assert_eq!(out.rows(), expected.as_slice());
    }
}
