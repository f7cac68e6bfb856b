use std::sync::{Arc, Mutex};

use tablecast::observe::ReadObserver;
use tablecast::reader::{ReadOptions, read_bytes};
use tablecast::types::{Column, DataType};
use tablecast::{Format, ReadError};

#[derive(Default)]
struct RecordingObserver {
    formats: Mutex<Vec<Format>>,
    invalid_rows: Mutex<Vec<(u64, String)>>,
    suppressions: Mutex<Vec<usize>>,
    casts: Mutex<Vec<(String, String)>>,
}

impl ReadObserver for RecordingObserver {
    fn on_format(&self, format: &Format) {
        self.formats.lock().unwrap().push(format.clone());
    }

    fn on_invalid_row(&self, line: u64, diagnostic: &str) {
        self.invalid_rows
            .lock()
            .unwrap()
            .push((line, diagnostic.to_string()));
    }

    fn on_invalid_rows_suppressed(&self, skipped_so_far: usize) {
        self.suppressions.lock().unwrap().push(skipped_so_far);
    }

    fn on_column_cast(&self, name: &str, semantic: &str) {
        self.casts
            .lock()
            .unwrap()
            .push((name.to_string(), semantic.to_string()));
    }
}

#[test]
fn messy_export_reads_end_to_end() {
    // Banner lines, semicolon dialect, quoted field with an embedded
    // delimiter, missing values.
    let csv = "\
Messy Export v2\n\
generated for testing\n\
id;label;price;when\n\
1;\"a;b\";1.234,5;17/06/2022\n\
2;plain;2.000,0;03/05/2022\n\
3;NA;NA;NA\n";

    let table = read_bytes(csv.as_bytes(), &ReadOptions::default()).unwrap();

    assert_eq!(table.n_rows(), 3);
    assert_eq!(
        table.column_names().collect::<Vec<_>>(),
        vec!["id", "label", "price", "when"]
    );

    assert_eq!(table.column(0).data_type(), DataType::UInt8);

    // Comma decimal, period thousands.
    assert_eq!(
        table.column_by_name("price").unwrap(),
        &Column::Float64(vec![Some(1234.5), Some(2000.0), None])
    );

    assert!(matches!(
        table.column_by_name("when").unwrap().data_type(),
        DataType::Timestamp(_, _)
    ));
}

#[test]
fn encoded_exports_decode_via_detection() {
    let text = "prénom,ville\nrené,nîmes\nandré,orléans\n";
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(text);

    let options = ReadOptions {
        autocast: false,
        ..ReadOptions::default()
    };
    let table = read_bytes(&bytes, &options).unwrap();

    assert_eq!(
        table.column_names().collect::<Vec<_>>(),
        vec!["prénom", "ville"]
    );
    assert_eq!(
        table.column(0),
        &Column::Utf8(vec![Some("rené".to_string()), Some("andré".to_string())])
    );
}

#[test]
fn campaign_footer_rows_are_excluded() {
    let csv = "Informe de campañas\nCampaña,Clicks\nbrand,10\nsearch,20\nTotal,30\nTotal general,30\n";
    let table = read_bytes(csv.as_bytes(), &ReadOptions::default()).unwrap();

    assert_eq!(table.n_rows(), 2);
    let clicks = table.column_by_name("Clicks").unwrap();
    assert_eq!(clicks, &Column::UInt8(vec![Some(10), Some(20)]));
}

#[test]
fn invalid_rows_skip_with_capped_diagnostics() {
    let mut csv = String::from("a,b\n");
    for i in 0..3 {
        csv.push_str(&format!("{i},{i}\n"));
        csv.push_str("one-field-only\n");
        csv.push_str("too,many,fields,here\n");
    }

    let observer = Arc::new(RecordingObserver::default());
    let options = ReadOptions {
        autocast: false,
        max_row_messages: 2,
        observer: Some(observer.clone()),
        ..ReadOptions::default()
    };
    let table = read_bytes(csv.as_bytes(), &options).unwrap();

    // Valid rows survive, 6 invalid ones don't.
    assert_eq!(table.n_rows(), 3);

    let invalid = observer.invalid_rows.lock().unwrap();
    assert_eq!(invalid.len(), 2, "messages stop at the cap");
    assert!(invalid.iter().all(|(_, d)| d.chars().count() <= 150));

    let suppressions = observer.suppressions.lock().unwrap();
    assert_eq!(suppressions.as_slice(), &[2]);
}

#[test]
fn diagnostics_are_truncated() {
    let long_field = "x".repeat(500);
    let csv = format!("a,b\n1,2\n{long_field},{long_field},{long_field}\n");

    let observer = Arc::new(RecordingObserver::default());
    let options = ReadOptions {
        autocast: false,
        observer: Some(observer.clone()),
        ..ReadOptions::default()
    };
    read_bytes(csv.as_bytes(), &options).unwrap();

    let invalid = observer.invalid_rows.lock().unwrap();
    assert_eq!(invalid.len(), 1);
    let (_, diagnostic) = &invalid[0];
    assert!(diagnostic.chars().count() <= 150);
}

#[test]
fn observer_sees_format_and_casts() {
    let observer = Arc::new(RecordingObserver::default());
    let options = ReadOptions {
        observer: Some(observer.clone()),
        ..ReadOptions::default()
    };
    read_bytes(b"n,s\n1,hello\n2,world\n", &options).unwrap();

    let formats = observer.formats.lock().unwrap();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].columns, vec!["n", "s"]);

    let casts = observer.casts.lock().unwrap();
    assert!(casts.iter().any(|(name, semantic)| name == "n" && semantic == "number[uint8]"));
}

#[test]
fn empty_bytes_yield_no_table(){
    let err = read_bytes(b"", &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, ReadError::EmptyInput));
}

#[test]
fn overrides_skip_detection() {
    use tablecast::Dialect;

    let options = ReadOptions {
        encoding: Some("utf-8".to_string()),
        dialect: Some(Dialect {
            delimiter: '|',
            ..Dialect::default()
        }),
        preamble: Some(1),
        autocast: false,
        ..ReadOptions::default()
    };

    let table = read_bytes(b"ignored banner\na|b\n1|2\n", &options).unwrap();
    assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(table.n_rows(), 1);
}
