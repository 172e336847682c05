//! WordprocessingML rendering.
//!
//! Writes a minimal `.docx` package: content types, package relationships,
//! a style sheet and `word/document.xml` generated with quick-xml. Existing
//! reports can be read back so appended runs keep earlier sections.

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, SqlDocxError};
use crate::report::{Report, ReportMode, ReportSection, RowSummary, SectionOutcome};

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const ERROR_COLOR: &str = "DC143C";
const SUCCESS_COLOR: &str = "228B22";
const MUTED_COLOR: &str = "666666";
const HEADER_FILL: &str = "4472C4";
const HEADER_TEXT: &str = "FFFFFF";
const STRIPE_FILL: &str = "F2F2F2";
const PLAIN_FILL: &str = "FFFFFF";
const OUTER_BORDER: &str = "000000";
const INNER_BORDER: &str = "CCCCCC";

/// Usable text width of a Letter page with 1" margins, in twentieths of a point.
const TEXT_WIDTH_TWIPS: usize = 9360;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="0" w:line="259" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:rPr><w:sz w:val="56"/><w:szCs w:val="56"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:color w:val="2F5496"/><w:sz w:val="32"/><w:szCs w:val="32"/></w:rPr></w:style><w:style w:type="table" w:default="1" w:styleId="TableNormal"><w:name w:val="Normal Table"/><w:tblPr><w:tblCellMar><w:left w:w="108" w:type="dxa"/><w:right w:w="108" w:type="dxa"/></w:tblCellMar></w:tblPr></w:style></w:styles>"#;

/// Body content recovered from an existing report.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousBody {
    /// Attributes of the old `w:document` element (namespace declarations etc.).
    pub root_attributes: Vec<(String, String)>,
    /// Serialized children of `w:body`, without the trailing section properties.
    pub content: Vec<u8>,
}

/// A run of text with character formatting.
#[derive(Debug, Default, Clone, Copy)]
struct Run<'a> {
    text: &'a str,
    bold: bool,
    italic: bool,
    color: Option<&'a str>,
    font: Option<&'a str>,
    half_points: Option<u32>,
}

impl<'a> Run<'a> {
    fn plain(text: &'a str) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

/// Paragraph-level formatting.
#[derive(Debug, Default, Clone, Copy)]
struct ParagraphProps<'a> {
    style: Option<&'a str>,
    before: Option<u32>,
    after: Option<u32>,
    align: Option<&'a str>,
}

impl<'a> ParagraphProps<'a> {
    fn spaced(before: Option<u32>, after: Option<u32>) -> Self {
        Self {
            before,
            after,
            ..Default::default()
        }
    }
}

/// Renders a report into `.docx` bytes, after `previous` content when given.
pub fn render_docx(report: &Report, previous: Option<&PreviousBody>) -> Result<Vec<u8>> {
    let document = document_xml(report, previous)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &[u8]); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", PACKAGE_RELS.as_bytes()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
        ("word/styles.xml", STYLES.as_bytes()),
        ("word/document.xml", &document),
    ];

    for (name, data) in parts {
        zip.start_file(name, options).map_err(doc_err)?;
        zip.write_all(data)?;
    }

    let cursor = zip.finish().map_err(doc_err)?;
    Ok(cursor.into_inner())
}

/// Extracts the body of an existing report so new sections can follow it.
///
/// Returns `None` when the body references package parts (images, links)
/// that would dangle in a regenerated package.
pub fn extract_body(docx: &[u8]) -> Result<Option<PreviousBody>> {
    let mut archive = ZipArchive::new(Cursor::new(docx)).map_err(doc_err)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(doc_err)?
        .read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut writer = Writer::new(Vec::new());
    let mut root_attributes = Vec::new();
    let mut in_body = false;
    let mut depth = 0usize;
    let mut skipping = false;

    loop {
        let event = reader.read_event().map_err(doc_err)?;

        if !in_body {
            match &event {
                Event::Start(e) if e.name().as_ref() == b"w:document" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(doc_err)?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr.unescape_value().map_err(doc_err)?.into_owned();
                        root_attributes.push((key, value));
                    }
                }
                Event::Start(e) if e.name().as_ref() == b"w:body" => in_body = true,
                Event::Empty(e) if e.name().as_ref() == b"w:body" => break,
                Event::Eof => {
                    return Err(SqlDocxError::document("word/document.xml has no body"));
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                if depth == 0 && e.name().as_ref() == b"w:sectPr" {
                    skipping = true;
                }
                depth += 1;
                if !skipping {
                    if references_package_part(&e)? {
                        return Ok(None);
                    }
                    writer.write_event(Event::Start(e)).map_err(doc_err)?;
                }
            }
            Event::End(e) => {
                if depth == 0 {
                    // </w:body>
                    break;
                }
                depth -= 1;
                if skipping {
                    if depth == 0 {
                        skipping = false;
                    }
                    continue;
                }
                writer.write_event(Event::End(e)).map_err(doc_err)?;
            }
            Event::Empty(e) => {
                if skipping || (depth == 0 && e.name().as_ref() == b"w:sectPr") {
                    continue;
                }
                if references_package_part(&e)? {
                    return Ok(None);
                }
                writer.write_event(Event::Empty(e)).map_err(doc_err)?;
            }
            Event::Eof => {
                return Err(SqlDocxError::document("word/document.xml ends inside the body"));
            }
            other => {
                if !skipping {
                    writer.write_event(other).map_err(doc_err)?;
                }
            }
        }
    }

    Ok(Some(PreviousBody {
        root_attributes,
        content: writer.into_inner(),
    }))
}

fn references_package_part(element: &BytesStart<'_>) -> Result<bool> {
    for attr in element.attributes() {
        let attr = attr.map_err(doc_err)?;
        if attr.key.as_ref().starts_with(b"r:") {
            return Ok(true);
        }
    }
    Ok(false)
}

fn document_xml(report: &Report, previous: Option<&PreviousBody>) -> Result<Vec<u8>> {
    let mut doc = DocWriter::new();
    doc.declaration()?;

    let mut root = BytesStart::new("w:document");
    root.push_attribute(("xmlns:w", WORD_NS));
    root.push_attribute(("xmlns:r", REL_NS));
    if let Some(previous) = previous {
        for (key, value) in &previous.root_attributes {
            if key != "xmlns:w" && key != "xmlns:r" {
                root.push_attribute((key.as_str(), value.as_str()));
            }
        }
    }
    doc.write(Event::Start(root))?;
    doc.start("w:body")?;

    if let Some(previous) = previous {
        doc.raw(&previous.content)?;
    }

    write_report(&mut doc, report)?;

    doc.start("w:sectPr")?;
    doc.empty("w:pgSz", &[("w:w", "12240"), ("w:h", "15840")])?;
    doc.empty(
        "w:pgMar",
        &[
            ("w:top", "1440"),
            ("w:right", "1440"),
            ("w:bottom", "1440"),
            ("w:left", "1440"),
            ("w:header", "708"),
            ("w:footer", "708"),
            ("w:gutter", "0"),
        ],
    )?;
    doc.end("w:sectPr")?;

    doc.end("w:body")?;
    doc.end("w:document")?;
    Ok(doc.into_inner())
}

fn write_report(doc: &mut DocWriter, report: &Report) -> Result<()> {
    let stamp = report.timestamp_label();

    match report.mode {
        ReportMode::Fresh => {
            doc.paragraph(
                ParagraphProps {
                    style: Some("Title"),
                    after: Some(200),
                    ..Default::default()
                },
                &[Run::plain("SQL Query Results")],
            )?;
            let generated = format!("Generated on: {stamp}");
            doc.paragraph(
                ParagraphProps::spaced(None, Some(400)),
                &[Run::plain(&generated)],
            )?;
        }
        ReportMode::Appended => {
            let rule = "═".repeat(100);
            doc.paragraph(
                ParagraphProps::spaced(Some(400), Some(200)),
                &[Run::plain(&rule)],
            )?;
            let heading = format!("Appended Results - {stamp}");
            doc.paragraph(
                ParagraphProps {
                    style: Some("Heading1"),
                    after: Some(400),
                    ..Default::default()
                },
                &[Run::plain(&heading)],
            )?;
        }
    }

    for section in &report.sections {
        write_section(doc, section)?;
    }
    Ok(())
}

fn write_section(doc: &mut DocWriter, section: &ReportSection) -> Result<()> {
    let heading = format!("Query {}", section.index);
    doc.paragraph(
        ParagraphProps {
            style: Some("Heading1"),
            before: Some(400),
            after: Some(200),
            ..Default::default()
        },
        &[Run::plain(&heading)],
    )?;

    for line in section.statement_lines() {
        doc.paragraph(
            ParagraphProps::spaced(None, Some(0)),
            &[Run {
                text: line,
                font: Some("Consolas"),
                half_points: Some(20),
                ..Default::default()
            }],
        )?;
    }
    doc.paragraph(ParagraphProps::spaced(None, Some(200)), &[])?;

    match &section.outcome {
        SectionOutcome::Error { message } => {
            doc.paragraph(
                ParagraphProps::spaced(None, Some(400)),
                &[
                    Run {
                        text: "❌ Error: ",
                        bold: true,
                        color: Some(ERROR_COLOR),
                        ..Default::default()
                    },
                    Run {
                        text: message,
                        color: Some(ERROR_COLOR),
                        ..Default::default()
                    },
                ],
            )?;
        }
        SectionOutcome::AffectedRows { count } => {
            let affected = format!("Rows affected: {count}");
            doc.paragraph(
                ParagraphProps::spaced(None, Some(400)),
                &[
                    Run {
                        text: "✓ Query executed successfully. ",
                        bold: true,
                        color: Some(SUCCESS_COLOR),
                        ..Default::default()
                    },
                    Run {
                        text: &affected,
                        italic: true,
                        ..Default::default()
                    },
                ],
            )?;
        }
        SectionOutcome::Table {
            columns,
            rows,
            summary,
        } => {
            write_table(doc, columns, rows)?;
            let (text, run) = match summary {
                RowSummary::Truncated { displayed, total } => (
                    format!("... showing {displayed} of {total} results"),
                    Run {
                        italic: true,
                        color: Some(MUTED_COLOR),
                        ..Default::default()
                    },
                ),
                RowSummary::Complete { total } => (
                    format!("✓ Total results: {total}"),
                    Run {
                        bold: true,
                        color: Some(SUCCESS_COLOR),
                        ..Default::default()
                    },
                ),
            };
            doc.paragraph(
                ParagraphProps::spaced(Some(100), Some(400)),
                &[Run { text: &text, ..run }],
            )?;
        }
    }

    let separator = "─".repeat(100);
    doc.paragraph(
        ParagraphProps::spaced(Some(200), Some(200)),
        &[Run::plain(&separator)],
    )
}

fn write_table(doc: &mut DocWriter, columns: &[String], rows: &[Vec<String>]) -> Result<()> {
    doc.start("w:tbl")?;

    doc.start("w:tblPr")?;
    doc.empty("w:tblW", &[("w:w", "5000"), ("w:type", "pct")])?;
    doc.start("w:tblBorders")?;
    for (edge, color) in [
        ("w:top", OUTER_BORDER),
        ("w:left", OUTER_BORDER),
        ("w:bottom", OUTER_BORDER),
        ("w:right", OUTER_BORDER),
        ("w:insideH", INNER_BORDER),
        ("w:insideV", INNER_BORDER),
    ] {
        doc.empty(
            edge,
            &[
                ("w:val", "single"),
                ("w:sz", "4"),
                ("w:space", "0"),
                ("w:color", color),
            ],
        )?;
    }
    doc.end("w:tblBorders")?;
    doc.end("w:tblPr")?;

    let col_width = (TEXT_WIDTH_TWIPS / columns.len().max(1)).to_string();
    doc.start("w:tblGrid")?;
    for _ in columns {
        doc.empty("w:gridCol", &[("w:w", col_width.as_str())])?;
    }
    doc.end("w:tblGrid")?;

    doc.start("w:tr")?;
    doc.start("w:trPr")?;
    doc.empty("w:tblHeader", &[])?;
    doc.end("w:trPr")?;
    for column in columns {
        doc.cell(
            HEADER_FILL,
            100,
            ParagraphProps {
                align: Some("center"),
                ..Default::default()
            },
            Run {
                text: column,
                bold: true,
                color: Some(HEADER_TEXT),
                ..Default::default()
            },
        )?;
    }
    doc.end("w:tr")?;

    for (row_index, row) in rows.iter().enumerate() {
        let fill = if row_index % 2 == 0 {
            STRIPE_FILL
        } else {
            PLAIN_FILL
        };
        doc.start("w:tr")?;
        for value in row {
            doc.cell(
                fill,
                80,
                ParagraphProps {
                    align: Some("left"),
                    ..Default::default()
                },
                Run::plain(value),
            )?;
        }
        doc.end("w:tr")?;
    }

    doc.end("w:tbl")
}

/// Thin wrapper over the quick-xml writer with WordprocessingML helpers.
struct DocWriter {
    writer: Writer<Vec<u8>>,
}

impl DocWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(doc_err)?;
        Ok(())
    }

    fn declaration(&mut self) -> Result<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
    }

    fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.get_mut().write_all(bytes)?;
        Ok(())
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut element = BytesStart::new(name);
        for &(key, value) in attributes {
            element.push_attribute((key, value));
        }
        self.write(Event::Empty(element))
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let mut element = BytesStart::new("w:t");
        element.push_attribute(("xml:space", "preserve"));
        self.write(Event::Start(element))?;
        self.write(Event::Text(BytesText::new(&xml_safe(text))))?;
        self.end("w:t")
    }

    fn paragraph(&mut self, props: ParagraphProps<'_>, runs: &[Run<'_>]) -> Result<()> {
        self.start("w:p")?;

        if props.style.is_some()
            || props.before.is_some()
            || props.after.is_some()
            || props.align.is_some()
        {
            self.start("w:pPr")?;
            if let Some(style) = props.style {
                self.empty("w:pStyle", &[("w:val", style)])?;
            }
            if props.before.is_some() || props.after.is_some() {
                let before = props.before.map(|v| v.to_string());
                let after = props.after.map(|v| v.to_string());
                let mut spacing: Vec<(&str, &str)> = Vec::with_capacity(2);
                if let Some(before) = &before {
                    spacing.push(("w:before", before.as_str()));
                }
                if let Some(after) = &after {
                    spacing.push(("w:after", after.as_str()));
                }
                self.empty("w:spacing", &spacing)?;
            }
            if let Some(align) = props.align {
                self.empty("w:jc", &[("w:val", align)])?;
            }
            self.end("w:pPr")?;
        }

        for run in runs {
            self.run(run)?;
        }

        self.end("w:p")
    }

    fn run(&mut self, run: &Run<'_>) -> Result<()> {
        self.start("w:r")?;

        if run.bold
            || run.italic
            || run.color.is_some()
            || run.font.is_some()
            || run.half_points.is_some()
        {
            self.start("w:rPr")?;
            if let Some(font) = run.font {
                self.empty(
                    "w:rFonts",
                    &[("w:ascii", font), ("w:hAnsi", font), ("w:cs", font)],
                )?;
            }
            if run.bold {
                self.empty("w:b", &[])?;
            }
            if run.italic {
                self.empty("w:i", &[])?;
            }
            if let Some(color) = run.color {
                self.empty("w:color", &[("w:val", color)])?;
            }
            if let Some(size) = run.half_points {
                let size = size.to_string();
                self.empty("w:sz", &[("w:val", size.as_str())])?;
                self.empty("w:szCs", &[("w:val", size.as_str())])?;
            }
            self.end("w:rPr")?;
        }

        self.text(run.text)?;
        self.end("w:r")
    }

    fn cell(
        &mut self,
        fill: &str,
        vertical_margin: u32,
        props: ParagraphProps<'_>,
        run: Run<'_>,
    ) -> Result<()> {
        let vertical = vertical_margin.to_string();
        self.start("w:tc")?;
        self.start("w:tcPr")?;
        self.empty(
            "w:shd",
            &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", fill)],
        )?;
        self.start("w:tcMar")?;
        for (edge, width) in [
            ("w:top", vertical.as_str()),
            ("w:left", "100"),
            ("w:bottom", vertical.as_str()),
            ("w:right", "100"),
        ] {
            self.empty(edge, &[("w:w", width), ("w:type", "dxa")])?;
        }
        self.end("w:tcMar")?;
        self.end("w:tcPr")?;
        self.paragraph(props, &[run])?;
        self.end("w:tc")
    }
}

/// Whether `c` matches the XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Drops characters that XML 1.0 cannot carry.
fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn doc_err<E: std::fmt::Display>(error: E) -> SqlDocxError {
    SqlDocxError::document(error.to_string())
}
