//! 学生名单解析
//!
//! Maps Spanish/English header aliases onto student fields, normalizes CI
//! numbers and splits full names.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::reader::{self, RawSheet, SheetFormat};
use crate::api::services::school::TS_EXPORT_PATH;
use crate::config::ImportConfig;
use crate::errors::{Result, SchoolError};
use crate::utils::{digits_only, title_case};

const CI_HEADERS: &[&str] = &["ci", "carnet", "cedula", "documento", "c.i.", "c.i", "ci_number"];
const PATERNAL_HEADERS: &[&str] = &["paterno", "apellido paterno", "apellido_paterno", "apellido 1"];
const MATERNAL_HEADERS: &[&str] = &["materno", "apellido materno", "apellido_materno", "apellido 2"];
const FIRST_NAME_HEADERS: &[&str] = &["nombres", "nombre"];
const FULL_NAME_HEADERS: &[&str] = &[
    "nombre completo",
    "nombres y apellidos",
    "estudiante",
    "apellidos y nombres",
];
const EMAIL_HEADERS: &[&str] = &["email", "correo", "correo electronico"];
const PHONE_HEADERS: &[&str] = &["celular", "telefono", "phone", "cel"];

/// Headers that mark the header row when scanning a spreadsheet
pub fn known_headers() -> Vec<&'static str> {
    CI_HEADERS
        .iter()
        .chain(PATERNAL_HEADERS)
        .chain(FIRST_NAME_HEADERS)
        .chain(FULL_NAME_HEADERS)
        .copied()
        .collect()
}

/// One student parsed from an uploaded roster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RosterEntry {
    pub ci_number: String,
    #[serde(default)]
    pub paternal_surname: String,
    #[serde(default)]
    pub maternal_surname: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Default)]
struct ColumnMap {
    ci: Option<usize>,
    paternal: Option<usize>,
    maternal: Option<usize>,
    first_name: Option<usize>,
    full_name: Option<usize>,
    email: Option<usize>,
    phone: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Self {
        let mut map = ColumnMap::default();
        for (idx, header) in headers.iter().enumerate() {
            let h = header.as_str();
            let slot = if CI_HEADERS.contains(&h) {
                &mut map.ci
            } else if PATERNAL_HEADERS.contains(&h) {
                &mut map.paternal
            } else if MATERNAL_HEADERS.contains(&h) {
                &mut map.maternal
            } else if FIRST_NAME_HEADERS.contains(&h) {
                &mut map.first_name
            } else if FULL_NAME_HEADERS.contains(&h) {
                &mut map.full_name
            } else if EMAIL_HEADERS.contains(&h) {
                &mut map.email
            } else if PHONE_HEADERS.contains(&h) {
                &mut map.phone
            } else {
                continue;
            };
            slot.get_or_insert(idx);
        }
        map
    }
}

/// Split "RIVERA CHAVEZ JUAN CARLOS" into (paternal, maternal, first names)
pub fn split_full_name(full_name: &str) -> (String, String, String) {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    let (paternal, maternal, first) = match parts.as_slice() {
        [] => ("".to_string(), "".to_string(), "".to_string()),
        [paternal] => (paternal.to_string(), String::new(), String::new()),
        [paternal, first] => (paternal.to_string(), String::new(), first.to_string()),
        [paternal, maternal, rest @ ..] => {
            (paternal.to_string(), maternal.to_string(), rest.join(" "))
        }
    };
    (title_case(&paternal), title_case(&maternal), title_case(&first))
}

/// Turn a raw sheet into roster entries.
///
/// Rows without a CI are skipped; a repeated CI keeps its first occurrence.
pub fn parse_roster(sheet: &RawSheet) -> Result<Vec<RosterEntry>> {
    let columns = ColumnMap::from_headers(&sheet.headers);
    let Some(ci_idx) = columns.ci else {
        return Err(SchoolError::import(format!(
            "Missing CI column. Found: {:?}",
            sheet.headers
        )));
    };

    let cell = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for row in &sheet.rows {
        let row = row.as_slice();
        let ci = digits_only(&cell(row, Some(ci_idx)));
        if ci.is_empty() || !seen.insert(ci.clone()) {
            continue;
        }

        let mut paternal = cell(row, columns.paternal);
        let mut maternal = cell(row, columns.maternal);
        let mut first_name = cell(row, columns.first_name);

        // 只有一列全名时拆分
        let full_name_idx = columns.full_name.or(match columns.paternal {
            None => columns.first_name,
            Some(_) => None,
        });
        if paternal.is_empty() || first_name.is_empty() {
            let full_name = cell(row, full_name_idx);
            if !full_name.is_empty() {
                (paternal, maternal, first_name) = split_full_name(&full_name);
            }
        }

        let optional = |value: String| (!value.is_empty()).then_some(value);
        entries.push(RosterEntry {
            ci_number: ci,
            paternal_surname: title_case(&paternal),
            maternal_surname: title_case(&maternal),
            first_name: title_case(&first_name),
            email: optional(cell(row, columns.email).to_lowercase()),
            phone: optional(cell(row, columns.phone)),
        });
    }

    Ok(entries)
}

/// Parse an uploaded CSV/XLSX roster
pub fn parse_upload(filename: &str, bytes: &[u8], config: &ImportConfig) -> Result<Vec<RosterEntry>> {
    let sheet = match SheetFormat::from_filename(filename)? {
        SheetFormat::Csv => reader::read_csv(bytes)?,
        SheetFormat::Xlsx => {
            reader::read_xlsx(bytes, config.header_scan_rows, &known_headers())?
        }
    };
    let entries = parse_roster(&sheet)?;
    tracing::info!(
        "Parsed roster {}: {} rows, {} students",
        filename,
        sheet.rows.len(),
        entries.len()
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> RawSheet {
        RawSheet {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("RIVERA CHAVEZ JUAN CARLOS"),
            ("Rivera".into(), "Chavez".into(), "Juan Carlos".into())
        );
        assert_eq!(
            split_full_name("rivera juan"),
            ("Rivera".into(), "".into(), "Juan".into())
        );
        assert_eq!(
            split_full_name("RIVERA"),
            ("Rivera".into(), "".into(), "".into())
        );
    }

    #[test]
    fn test_separate_name_columns() {
        let roster = parse_roster(&sheet(
            &["c.i.", "apellido paterno", "apellido materno", "nombres", "correo", "celular"],
            &[&["1234567 LP", "PEREZ", "GOMEZ", "ANA MARIA", "Ana@Mail.com", "70000000"]],
        ))
        .expect("valid roster");

        assert_eq!(
            roster,
            vec![RosterEntry {
                ci_number: "1234567".into(),
                paternal_surname: "Perez".into(),
                maternal_surname: "Gomez".into(),
                first_name: "Ana Maria".into(),
                email: Some("ana@mail.com".into()),
                phone: Some("70000000".into()),
            }]
        );
    }

    #[test]
    fn test_full_name_column_is_split() {
        let roster = parse_roster(&sheet(
            &["ci", "estudiante"],
            &[&["111", "RIVERA CHAVEZ JUAN"], &["222", "LOPEZ ANA"]],
        ))
        .expect("valid roster");

        assert_eq!(roster[0].paternal_surname, "Rivera");
        assert_eq!(roster[0].maternal_surname, "Chavez");
        assert_eq!(roster[0].first_name, "Juan");
        assert_eq!(roster[1].paternal_surname, "Lopez");
        assert_eq!(roster[1].first_name, "Ana");
        assert_eq!(roster[1].email, None);
    }

    #[test]
    fn test_nombres_alone_holds_full_name() {
        let roster = parse_roster(&sheet(&["carnet", "nombres"], &[&["9", "QUISPE MAMANI LUIS"]]))
            .expect("valid roster");
        assert_eq!(roster[0].paternal_surname, "Quispe");
        assert_eq!(roster[0].maternal_surname, "Mamani");
        assert_eq!(roster[0].first_name, "Luis");
    }

    #[test]
    fn test_skips_missing_and_duplicate_ci() {
        let roster = parse_roster(&sheet(
            &["ci", "paterno", "nombres"],
            &[
                &["", "Sin", "Carnet"],
                &["abc", "Sin", "Digitos"],
                &["555", "Primero", "Uno"],
                &["5-5-5", "Repetido", "Dos"],
                &["777"],
            ],
        ))
        .expect("valid roster");

        let cis: Vec<_> = roster.iter().map(|e| e.ci_number.as_str()).collect();
        assert_eq!(cis, vec!["555", "777"]);
        assert_eq!(roster[0].paternal_surname, "Primero");
        assert_eq!(roster[1].paternal_surname, "");
    }

    #[test]
    fn test_missing_ci_column() {
        let err = parse_roster(&sheet(&["nombre", "email"], &[])).expect_err("no ci column");
        assert!(err.message().contains("Missing CI column"));
    }

    #[test]
    fn test_parse_csv_upload() {
        let config = ImportConfig::default();
        let csv = "CI;Apellido Paterno;Apellido Materno;Nombres\n123;ROJAS;VACA;PEDRO\n";
        let roster = parse_upload("lista.csv", csv.as_bytes(), &config).expect("valid csv");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].first_name, "Pedro");
        assert_eq!(roster[0].maternal_surname, "Vaca");
    }
}
