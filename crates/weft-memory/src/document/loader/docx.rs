use std::io::Read;

use quick_xml::events::Event;

use crate::document::DocumentError;

const MAX_XML_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

fn docx_error(reason: impl ToString) -> DocumentError {
    DocumentError::Extraction {
        format: "docx",
        reason: reason.to_string(),
    }
}

/// Extract paragraph text from `word/document.xml`, one paragraph per line.
///
/// # Errors
///
/// Returns [`DocumentError::Extraction`] if the archive or XML is malformed.
pub fn extract_docx(bytes: &[u8]) -> Result<String, DocumentError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(docx_error)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| docx_error("word/document.xml not found"))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(docx_error)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(docx_error("word/document.xml exceeds size limit"));
    }
    paragraphs_from_xml(&xml)
}

fn paragraphs_from_xml(xml: &[u8]) -> Result<String, DocumentError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                current.push_str(&te.unescape().map_err(docx_error)?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(docx_error(e)),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>First </w:t></w:r><w:r><w:t xml:space="preserve">paragraph &amp; more</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Second</w:t><w:tab/><w:t>tabbed</w:t></w:r></w:p>
</w:body>
</w:document>"#;

    fn docx_with(entry: &str, body: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(entry, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn paragraphs_are_joined_by_newlines() {
        let text = extract_docx(&docx_with("word/document.xml", BODY)).unwrap();
        assert_eq!(text, "First paragraph & more\n\nSecond\ttabbed");
    }

    #[test]
    fn missing_document_entry_is_an_error() {
        let err = extract_docx(&docx_with("word/other.xml", BODY)).unwrap_err();
        assert!(matches!(err, DocumentError::Extraction { format: "docx", .. }));
    }

    #[test]
    fn non_zip_bytes_are_rejected() {
        assert!(extract_docx(b"plain text, not a zip").is_err());
    }
}
