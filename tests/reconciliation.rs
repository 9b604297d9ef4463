use engraft::config::{PipelineConfig, SourceConfig};
use engraft::data::loader::read_canonical_csv;
use engraft::data::preprocessing::{ContractConfig, PreprocessingContract};
use engraft::vocabulary::fields;
use engraft::{SourceKind, Value, Vocabulary};
use std::fs;
use tempfile::TempDir;

fn write_sources(dir: &TempDir) -> PipelineConfig {
    let uae = dir.path().join("uae.csv");
    fs::write(
        &uae,
        "R_Age at BMT,R_Sex,Diagnosis,Diagnosis to BMT time months,HLA match,GVHD,Comments\n\
         7,Male,AML,2,10/10,yes,first\n\
         15,Female,Thalassemia,Unknown,9,no,second\n\
         11,Female,ALL,6,8,yes,third\n",
    )
    .unwrap();

    let p5303 = dir.path().join("p5303.csv");
    fs::write(
        &p5303,
        "sex,age,disease,anc,intxanc\n\
         1,99,10,1,18\n\
         2,42,20,0,\n\
         1,35,10,1,21\n",
    )
    .unwrap();

    PipelineConfig {
        output: dir.path().join("processed/transplant_data.csv"),
        report: Some(dir.path().join("processed/report.json")),
        sources: vec![
            SourceConfig::new("UAE", SourceKind::Uae, &uae),
            SourceConfig::new("P5191", SourceKind::P5191, dir.path().join("p5191.csv")),
            SourceConfig::new("P5303", SourceKind::P5303, &p5303),
        ],
    }
}

#[test]
fn test_raw_sources_to_contract() {
    let dir = TempDir::new().unwrap();
    let config = write_sources(&dir);

    let run = engraft::pipeline::run(&config).unwrap();
    assert_eq!(run.report.skipped(), vec!["P5191"]);
    assert_eq!(run.dataset.len(), 6);
    assert_eq!(run.dataset.columns(), Vocabulary::standard().field_names().as_slice());

    let records = run.dataset.records();
    assert_eq!(records[0].get(fields::PATIENT_SEX), Some(&Value::Text("M".into())));
    assert_eq!(
        records[0].get(fields::DAYS_FROM_DIAGNOSIS_TO_HCT),
        Some(&Value::Float(60.875))
    );
    assert!(records[1].is_absent(fields::DAYS_FROM_DIAGNOSIS_TO_HCT));
    assert_eq!(records[0].get(fields::ENGRAFTMENT_SUCCESS), Some(&Value::Integer(1)));

    // P5303 rows follow the UAE rows; study codes resolve per source
    assert_eq!(records[3].get(fields::DIAGNOSIS), Some(&Value::Text("AML".into())));
    assert_eq!(records[4].get(fields::DIAGNOSIS), Some(&Value::Text("ALL".into())));
    assert!(records[3].is_absent(fields::PATIENT_AGE));
    assert!(records[4].is_absent(fields::ENGRAFTMENT_DAYS));

    let reread = read_canonical_csv(&config.output).unwrap();
    assert_eq!(reread.records(), records);
    assert!(dir.path().join("processed/report.json").exists());

    let contract = PreprocessingContract::fit(&reread, &ContractConfig::default()).unwrap();
    assert!(!contract.feature_names().iter().any(|f| f == fields::ENGRAFTMENT_DAYS));
    assert!(!contract.feature_names().iter().any(|f| f == fields::ENGRAFTMENT_SUCCESS));

    let matrix = contract.apply(reread.records());
    assert_eq!(matrix.n_rows(), 6);
    assert!(matrix
        .rows
        .iter()
        .all(|row| row.len() == contract.n_features() && row.iter().all(|v| v.is_finite())));

    let path = dir.path().join("preprocessing.json");
    contract.save(&path).unwrap();
    let restored = PreprocessingContract::load(&path).unwrap();
    assert_eq!(restored.apply(reread.records()).rows, matrix.rows);
}

#[test]
fn test_adapters_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = write_sources(&dir);

    let first = engraft::pipeline::reconcile(&config.sources).unwrap();
    let second = engraft::pipeline::reconcile(&config.sources).unwrap();
    assert_eq!(first.dataset, second.dataset);
}
