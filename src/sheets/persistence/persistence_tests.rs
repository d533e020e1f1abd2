// src/sheets/persistence/persistence_tests.rs
use super::*;
use crate::sheets::column_registry::TransformationBinding;
use crate::sheets::definitions::{CellMap, ColumnRole};
use crate::transformations::testing::StubTransformation;

fn scrape_sheet() -> Sheet {
    let mut sheet = Sheet::with_columns(["CompanyName", "JobURL", "ScrapedText"]).unwrap();
    let scrape = StubTransformation::new("scrape", &["JobURL"], &["ScrapedText"]);
    sheet
        .bind_transformation(
            &scrape,
            TransformationBinding::identity(&["JobURL".to_string()], &["ScrapedText".to_string()]),
        )
        .unwrap();
    sheet
        .add_row(CellMap::from([
            ("CompanyName".to_string(), CellValue::from("Acme")),
            ("JobURL".to_string(), CellValue::from("http://x")),
        ]))
        .unwrap();
    sheet
}

#[test]
fn round_trip_keeps_roles_order_and_unset_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.csv");
    let sheet = scrape_sheet();

    CsvPersistence.save(&path, &sheet).unwrap();
    let loaded = CsvPersistence.load(&path).unwrap();

    assert_eq!(loaded.columns(), sheet.columns());
    let names: Vec<&str> = loaded.columns().names().collect();
    assert_eq!(names, vec!["CompanyName", "JobURL", "ScrapedText"]);
    assert_eq!(loaded.columns().get("JobURL").unwrap().role, ColumnRole::Input);
    assert_eq!(loaded.columns().producer_of("ScrapedText"), Some("scrape"));
    assert_eq!(loaded.get_cell(0, "ScrapedText"), Ok(&CellValue::Unset));
    assert_eq!(loaded.get_cell(0, "JobURL"), Ok(&CellValue::from("http://x")));
    assert_eq!(loaded.grid(), sheet.grid());
}

#[test]
fn round_trip_preserves_types_and_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.csv");
    let mut sheet = Sheet::with_columns(["JobID", "Salary", "Notes"]).unwrap();
    sheet.set_column_type("Salary", ColumnDataType::Number).unwrap();
    sheet
        .add_row(CellMap::from([
            ("JobID".to_string(), CellValue::from("007")),
            ("Salary".to_string(), CellValue::Number(0.1)),
            ("Notes".to_string(), CellValue::from("line one\nline \"two\", with comma")),
        ]))
        .unwrap();
    sheet.set_signature(0, "llm", "deadbeef".into());

    CsvPersistence.save(&path, &sheet).unwrap();
    let loaded = CsvPersistence.load(&path).unwrap();

    assert_eq!(loaded.grid(), sheet.grid());
    assert_eq!(loaded.get_cell(0, "JobID"), Ok(&CellValue::from("007")));
    assert_eq!(loaded.rows().get(0).unwrap().signature("llm"), Some("deadbeef"));
}

#[test]
fn plain_csv_without_sidecar_infers_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.csv");
    fs::write(&path, "Company,Score,Zip\nAcme,4.5,02139\nGlobex,,x1\nInitech,3\n").unwrap();

    let sheet = CsvPersistence.load(&path).unwrap();
    assert_eq!(sheet.columns().data_type("Score"), Some(ColumnDataType::Number));
    assert_eq!(sheet.columns().data_type("Zip"), Some(ColumnDataType::Text));
    assert_eq!(sheet.get_cell(0, "Score"), Ok(&CellValue::Number(4.5)));
    // short record is padded
    assert_eq!(sheet.get_cell(2, "Zip"), Ok(&CellValue::Unset));
    assert!(sheet
        .columns()
        .columns()
        .iter()
        .all(|c| c.role == ColumnRole::Plain));
}

#[test]
fn inferred_columns_keep_identifier_text_on_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids.csv");
    let original = "Company,Job_ID,Phone,Rank,Exp\n\
                    Acme,00123,+15551234567,1,1e3\n\
                    Globex,12345678901234567891,0044,2.5,2\n";
    fs::write(&path, original).unwrap();

    let sheet = CsvPersistence.load(&path).unwrap();
    for column in ["Job_ID", "Phone", "Exp"] {
        assert_eq!(sheet.columns().data_type(column), Some(ColumnDataType::Text), "{}", column);
    }
    assert_eq!(sheet.columns().data_type("Rank"), Some(ColumnDataType::Number));
    assert_eq!(sheet.get_cell(0, "Job_ID"), Ok(&CellValue::from("00123")));

    CsvPersistence.save(&path, &sheet).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn load_errors_are_typed() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.csv");
    assert!(matches!(
        CsvPersistence.load(&missing),
        Err(PersistenceError::UnreadableFile { .. })
    ));

    let dup = dir.path().join("dup.csv");
    fs::write(&dup, "A,B,A\n1,2,3\n").unwrap();
    assert!(matches!(CsvPersistence.load(&dup), Err(PersistenceError::Format { .. })));

    let excel = dir.path().join("jobs.xlsx");
    fs::write(&excel, b"PK").unwrap();
    assert!(matches!(CsvPersistence.load(&excel), Err(PersistenceError::Format { .. })));

    let text = dir.path().join("notes.txt");
    fs::write(&text, "A\n1\n").unwrap();
    assert!(matches!(CsvPersistence.load(&text), Err(PersistenceError::Format { .. })));
}

#[test]
fn save_into_missing_directory_is_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("jobs.csv");
    assert!(matches!(
        CsvPersistence.save(&path, &scrape_sheet()),
        Err(PersistenceError::Write { .. })
    ));
}

#[test]
fn stale_sidecar_columns_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.csv");
    CsvPersistence.save(&path, &scrape_sheet()).unwrap();
    // external edit drops the ScrapedText column
    fs::write(&path, "CompanyName,JobURL\nAcme,http://x\n").unwrap();

    let loaded = CsvPersistence.load(&path).unwrap();
    let names: Vec<&str> = loaded.columns().names().collect();
    assert_eq!(names, vec!["CompanyName", "JobURL"]);
    assert_eq!(loaded.columns().producer_of("ScrapedText"), None);
}

#[test]
fn create_new_sheet_has_two_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new.csv");
    create_new_sheet(&CsvPersistence, &path).unwrap();
    let loaded = CsvPersistence.load(&path).unwrap();
    let names: Vec<&str> = loaded.columns().names().collect();
    assert_eq!(names, vec!["Column1", "Column2"]);
    assert_eq!(loaded.row_count(), 0);
}

#[test]
fn excel_export_writes_a_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.xlsx");
    CsvPersistence.save(&path, &scrape_sheet()).unwrap();
    let bytes = fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert!(!tmp_path(&path).exists());
}
