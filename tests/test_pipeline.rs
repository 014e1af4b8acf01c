//! Integration test: pipeline replay and feature extraction

use kolosal_workbench::data::{Cell, DataLoader, Subset, Table};
use kolosal_workbench::error::WorkbenchError;
use kolosal_workbench::features::{FeatureExtractor, LabelSelection};
use kolosal_workbench::preprocessing::{PipelineInterpreter, Step, StepType};
use serde_json::json;

fn csv_table(csv: &str) -> Table {
    DataLoader::new().parse_csv(csv.as_bytes()).unwrap()
}

fn numbers(table: &Table, column: &str) -> Vec<f64> {
    table
        .column(column)
        .unwrap()
        .values
        .iter()
        .map(|c| c.as_number().unwrap())
        .collect()
}

fn mixed_csv(n: usize) -> String {
    let cities = ["oslo", "lima", "pune"];
    let mut csv = String::from("age,income,city,score\n");
    for i in 0..n {
        let age = if i % 9 == 4 { String::new() } else { (20 + i % 40).to_string() };
        let income = 1000.0 + (i * 37 % 500) as f64 * 3.5;
        csv.push_str(&format!(
            "{},{},{},{}\n",
            age,
            income,
            cities[i % 3],
            (i % 5) as f64 * 0.5
        ));
    }
    csv
}

fn full_pipeline() -> Vec<Step> {
    vec![
        Step::new(StepType::HandleMissing, json!({"strategy": "median"})).with_order(1),
        Step::new(StepType::EncodeCategorical, json!({"method": "onehot"})).with_order(2),
        Step::new(StepType::ClipOutliers, json!({"method": "iqr", "target_columns": ["income"]}))
            .with_order(3),
        Step::new(StepType::Normalize, json!({"method": "zscore", "target_columns": ["age", "income"]}))
            .with_order(4),
        Step::new(StepType::Split, json!({"train": 0.7, "validation": 0.15, "test": 0.15, "seed": 11}))
            .with_order(5),
        Step::new(StepType::ReorderColumns, json!({"columns": ["score"]})).with_order(6),
    ]
}

#[test]
fn test_replay_is_bit_identical() {
    let csv = mixed_csv(60);
    let interpreter = PipelineInterpreter::new();

    let first = interpreter.apply(csv_table(&csv), &full_pipeline()).unwrap();
    let second = interpreter.apply(csv_table(&csv), &full_pipeline()).unwrap();
    assert_eq!(first.table, second.table);

    // Replaying the resolved steps (through JSON) reuses every fitted value
    let stored = serde_json::to_string(&first.preprocessing_steps).unwrap();
    let resolved: Vec<Step> = serde_json::from_str(&stored).unwrap();
    let third = interpreter.apply(csv_table(&csv), &resolved).unwrap();
    for (a, b) in first.table.columns().iter().zip(third.table.columns()) {
        assert_eq!(a.name, b.name);
        for (x, y) in a.values.iter().zip(&b.values) {
            match (x, y) {
                (Cell::Number(x), Cell::Number(y)) => assert_eq!(x.to_bits(), y.to_bits()),
                _ => assert_eq!(x, y),
            }
        }
    }
    assert_eq!(first.table.subsets(), third.table.subsets());
}

#[test]
fn test_minmax_extraction_example() {
    let table = csv_table("x1,x2,y\n1,2,10\n2,3,20\n3,4,30\n");
    let steps = vec![Step::new(
        StepType::Normalize,
        json!({"method": "minmax", "target_columns": ["x1", "x2"]}),
    )];
    let out = PipelineInterpreter::new().apply(table, &steps).unwrap();
    assert_eq!(numbers(&out.table, "x1"), vec![0.0, 0.5, 1.0]);

    let tensors = FeatureExtractor::new(LabelSelection::LastNumeric)
        .extract(&out.table)
        .unwrap();
    assert_eq!(tensors.feature_names, vec!["x1", "x2"]);
    assert_eq!(tensors.label_name, "y");
    assert_eq!(tensors.labels, vec![10.0, 20.0, 30.0]);
    let x1: Vec<f64> = (0..tensors.row_count).map(|i| tensors.row(i)[0]).collect();
    assert_eq!(x1, vec![0.0, 0.5, 1.0]);
}

#[test]
fn test_minmax_hits_exact_bounds() {
    let table = csv_table("v,w\n-3.7,1\n12.25,2\n0.1,3\n7.3,4\n");
    let steps = vec![Step::new(StepType::Normalize, json!({"method": "minmax", "target_columns": ["v"]}))];
    let out = PipelineInterpreter::new().apply(table, &steps).unwrap();
    let v = numbers(&out.table, "v");
    assert_eq!(v[0], 0.0);
    assert_eq!(v[1], 1.0);
}

#[test]
fn test_tensor_shape_invariant() {
    let csv = mixed_csv(45);
    let out = PipelineInterpreter::new()
        .apply(csv_table(&csv), &full_pipeline())
        .unwrap();
    let tensors = FeatureExtractor::new(LabelSelection::Column("score".into()))
        .extract(&out.table)
        .unwrap();
    assert_eq!(
        tensors.features.len(),
        tensors.feature_names.len() * tensors.labels.len()
    );
    assert_eq!(tensors.labels.len(), tensors.row_count);
    assert!(tensors.feature_names.contains(&"city_oslo".to_string()));
    assert!(!tensors.feature_names.contains(&"score".to_string()));
}

#[test]
fn test_drop_rows_removes_missing() {
    let table = csv_table("a,b\n1,2\n,3\n4,5\n");
    let steps = vec![Step::new(StepType::HandleMissing, json!({"strategy": "drop_rows"}))];
    let out = PipelineInterpreter::new().apply(table, &steps).unwrap();
    assert_eq!(out.table.n_rows(), 2);
    assert_eq!(numbers(&out.table, "a"), vec![1.0, 4.0]);
}

#[test]
fn test_split_partitions_rows() {
    let csv = mixed_csv(100);
    let steps = vec![Step::new(
        StepType::Split,
        json!({"train": 0.7, "validation": 0.15, "test": 0.15}),
    )];
    let out = PipelineInterpreter::new().apply(csv_table(&csv), &steps).unwrap();
    let subsets = out.table.subsets().unwrap();
    let count = |s: Subset| subsets.iter().filter(|x| **x == s).count();

    assert_eq!(subsets.len(), 100);
    assert_eq!(count(Subset::Train) + count(Subset::Validation) + count(Subset::Test), 100);
    assert!((count(Subset::Train) as i64 - 70).abs() <= 1);
    assert!((count(Subset::Validation) as i64 - 15).abs() <= 1);
    assert!((count(Subset::Test) as i64 - 15).abs() <= 1);
    assert_eq!(out.preprocessing_steps[0].parameters["seed"], 42);
}

#[test]
fn test_percentile_clip_stays_in_bounds() {
    let mut csv = String::from("x,y\n");
    for i in 0..200 {
        let x = if i % 50 == 0 { 10_000.0 } else { (i as f64).sin() * 10.0 };
        csv.push_str(&format!("{},{}\n", x, i));
    }
    let steps = vec![Step::new(
        StepType::ClipOutliers,
        json!({"method": "percentile", "lower_percentile": 1, "upper_percentile": 99, "target_columns": ["x"]}),
    )];
    let out = PipelineInterpreter::new().apply(csv_table(&csv), &steps).unwrap();
    let bounds = &out.preprocessing_steps[0].parameters["bounds"]["x"];
    let (lower, upper) = (bounds["lower"].as_f64().unwrap(), bounds["upper"].as_f64().unwrap());
    assert!(upper < 10_000.0);
    for v in numbers(&out.table, "x") {
        assert!(v >= lower && v <= upper, "{} outside [{}, {}]", v, lower, upper);
    }
}

#[test]
fn test_failing_step_names_column_and_stops() {
    let table = csv_table("name,age\nann,30\nbob,40\n");
    let steps = vec![
        Step::new(StepType::Normalize, json!({"method": "minmax", "target_columns": ["name"]})).with_order(1),
        Step::new(StepType::DropColumns, json!({"columns": ["age"]})).with_order(2),
    ];
    match PipelineInterpreter::new().apply(table, &steps) {
        Err(WorkbenchError::PipelineStep { step, column, .. }) => {
            assert_eq!(step, "normalize");
            assert_eq!(column.as_deref(), Some("name"));
        }
        other => panic!("expected a pipeline step error, got {:?}", other.map(|o| o.table)),
    }
}

#[test]
fn test_too_few_numeric_columns() {
    let table = csv_table("name,age\nann,30\nbob,40\n");
    let err = FeatureExtractor::new(LabelSelection::LastNumeric)
        .extract(&table)
        .unwrap_err();
    assert!(matches!(err, WorkbenchError::InsufficientFeatures { found: 1 }));
}
