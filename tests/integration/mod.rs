//! Integration tests for sqldocx.

pub mod mssql_test;
pub mod pipeline_test;

use std::io::{Cursor, Read};

/// Reads `word/document.xml` out of a `.docx` package.
pub fn document_xml(docx: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}
